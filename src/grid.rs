//! Canonical row representation for every view.
//!
//! Published sheets arrive as loosely structured CSV: the first line holds
//! column labels (possibly blank or repeated), data lines may be ragged, and
//! nothing guarantees column order between polls. Everything downstream works
//! on [`RawGrid`], which keeps the ordered cells (positional heuristics rely on
//! them) and a header lookup for by-name access.

use std::collections::HashMap;

use csv::ReaderBuilder;
use serde_json::{Map, Value};

use crate::error::SheetError;

/// Value returned for cells past the end of a ragged row.
pub const MISSING_CELL: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at `idx`, or [`MISSING_CELL`] when the row is short.
    pub fn cell(&self, idx: usize) -> &str {
        self.cells.get(idx).map(String::as_str).unwrap_or(MISSING_CELL)
    }

    /// Cell under the named column.
    pub fn get<'a>(&'a self, grid: &RawGrid, column: &str) -> Option<&'a str> {
        grid.column_index(column).map(|idx| self.cell(idx))
    }

    /// First cell, the name column in every known sheet layout.
    pub fn key(&self) -> &str {
        self.cell(0)
    }
}

impl From<Vec<&str>> for Row {
    fn from(cells: Vec<&str>) -> Self {
        Row::new(cells.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawGrid {
    header: Row,
    rows: Vec<Row>,
    index: HashMap<String, usize>,
}

impl RawGrid {
    pub fn new(header: Row, rows: Vec<Row>) -> Self {
        let mut index = HashMap::new();
        for (i, label) in header.cells().iter().enumerate() {
            // duplicate labels resolve to the leftmost column
            index.entry(label.trim().to_string()).or_insert(i);
        }
        Self { header, rows, index }
    }

    pub fn header(&self) -> &Row {
        &self.header
    }

    /// Data rows, header excluded.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.index.get(label.trim()).copied()
    }

    /// Header-keyed view of every data row. Labels past the end of a short
    /// row are left out, and later duplicate labels overwrite earlier ones,
    /// like assigning into a plain object.
    pub fn keyed_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                for (label, cell) in self.header.cells().iter().zip(row.cells()) {
                    record.insert(label.clone(), Value::String(cell.clone()));
                }
                record
            })
            .collect()
    }

    /// Build a grid from an in-memory header and rows; handy in tests and for
    /// re-assembling filtered views.
    pub fn from_rows(header: &[&str], rows: &[Vec<&str>]) -> Self {
        RawGrid::new(
            Row::from(header.to_vec()),
            rows.iter().cloned().map(Row::from).collect(),
        )
    }

    pub fn with_rows(&self, rows: Vec<Row>) -> Self {
        RawGrid::new(self.header.clone(), rows)
    }
}

/// Split CSV text into a grid.
///
/// Lines split on `\n` (a trailing `\r` is dropped), cells split on every
/// comma, and one leading plus one trailing double quote are stripped from
/// each cell. Quoted fields containing commas or escaped quotes are not
/// understood. Blank lines are skipped. Text with no lines at all is an error.
pub fn parse_csv(text: &str) -> Result<RawGrid, SheetError> {
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(split_line);

    let header = lines.next().ok_or(SheetError::Empty)?;
    Ok(RawGrid::new(header, lines.collect()))
}

/// Split CSV text into a grid, honouring RFC 4180 quoting.
///
/// Published sheets quote any field holding a comma (`"₹45,000"`), so every
/// view except the report reads through this. Rows may be ragged. Lines with
/// no content are skipped and CRLF endings are accepted.
pub fn parse_quoted_csv(text: &str) -> Result<RawGrid, SheetError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() <= 1 && record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(Row::new(record.iter().map(str::to_string).collect()));
    }

    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(SheetError::Empty)?;
    Ok(RawGrid::new(header, rows.collect()))
}

fn split_line(line: &str) -> Row {
    Row::new(line.split(',').map(strip_quotes).collect())
}

fn strip_quotes(cell: &str) -> String {
    let cell = cell.strip_prefix('"').unwrap_or(cell);
    let cell = cell.strip_suffix('"').unwrap_or(cell);
    cell.to_string()
}
