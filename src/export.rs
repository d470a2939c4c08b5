//! Filtered file exports and the capped export history.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};

use crate::classify::parse_float_prefix;
use crate::error::SheetError;
use crate::grid::{RawGrid, Row};
use crate::logging::{log, log_export, obj, v_str, Domain, Level};
use crate::storage::KvStore;
use crate::table::row_matches;

pub const HISTORY_LIMIT: usize = 10;
/// Rows rendered into the HTML snapshot; the rest are summarised in a note.
pub const HTML_ROW_LIMIT: usize = 50;
pub const EXCEL_COLUMN_WIDTH: f64 = 20.0;
pub const EXCEL_SHEET_NAME: &str = "Export Data";

// =============================================================================
// Filters
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBand {
    High,
    Medium,
    Low,
}

impl StatusBand {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(StatusBand::High),
            "medium" => Some(StatusBand::Medium),
            "low" => Some(StatusBand::Low),
            _ => None,
        }
    }

    /// NaN falls in no band.
    pub fn admits(&self, pct: f64) -> bool {
        match self {
            StatusBand::High => pct >= 80.0,
            StatusBand::Medium => (60.0..80.0).contains(&pct),
            StatusBand::Low => pct < 60.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
    #[serde(default)]
    pub search_term: String,
    #[serde(default)]
    pub employee: String,
    #[serde(default)]
    pub status: Option<StatusBand>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
}

impl ExportFilters {
    /// Rows passing every active filter, in source order.
    pub fn apply<'a>(&self, rows: &'a [Row]) -> Vec<&'a Row> {
        rows.iter().filter(|row| self.admits(row)).collect()
    }

    pub fn admits(&self, row: &Row) -> bool {
        if !row_matches(row, &self.search_term) {
            return false;
        }
        if !self.employee.is_empty()
            && !row.key().to_lowercase().contains(&self.employee.to_lowercase())
        {
            return false;
        }
        if let Some(band) = self.status {
            match status_cell(row).and_then(parse_float_prefix) {
                Some(pct) if band.admits(pct) => {}
                _ => return false,
            }
        }
        if self.min_amount.is_some() || self.max_amount.is_some() {
            let (min, max) = self.amount_bounds();
            match amount_cell(row) {
                Some(amount) if amount >= min && amount <= max => {}
                _ => return false,
            }
        }
        true
    }

    /// Missing or zero minimum is 0; missing or zero maximum is unbounded.
    pub fn amount_bounds(&self) -> (f64, f64) {
        let usable = |v: Option<f64>| v.filter(|n| *n != 0.0 && !n.is_nan());
        (
            usable(self.min_amount).unwrap_or(0.0),
            usable(self.max_amount).unwrap_or(f64::INFINITY),
        )
    }
}

/// First cell containing a percent sign.
pub fn status_cell(row: &Row) -> Option<&str> {
    row.cells().iter().map(String::as_str).find(|c| c.contains('%'))
}

/// First cell made only of digits once commas are dropped, and longer than
/// three characters as written.
pub fn amount_cell(row: &Row) -> Option<f64> {
    row.cells().iter().find_map(|cell| {
        let bare: String = cell.chars().filter(|c| *c != ',').collect();
        let all_digits = !bare.is_empty() && bare.chars().all(|c| c.is_ascii_digit());
        if all_digits && cell.chars().count() > 3 {
            parse_float_prefix(&bare)
        } else {
            None
        }
    })
}

// =============================================================================
// Formats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Excel,
    Json,
    Html,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Excel,
        ExportFormat::Json,
        ExportFormat::Html,
    ];

    /// `pdf` is accepted for the HTML snapshot.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "excel" | "xlsx" => Some(ExportFormat::Excel),
            "json" => Some(ExportFormat::Json),
            "html" | "pdf" => Some(ExportFormat::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
        }
    }
}

impl From<XlsxError> for SheetError {
    fn from(err: XlsxError) -> Self {
        SheetError::Export(err.to_string())
    }
}

/// Render the header plus `grid`'s rows in `format`.
pub fn render(
    format: ExportFormat,
    grid: &RawGrid,
    title: &str,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, SheetError> {
    match format {
        ExportFormat::Csv => to_csv(grid),
        ExportFormat::Excel => to_xlsx(grid),
        ExportFormat::Json => to_json(grid),
        ExportFormat::Html => Ok(to_html(grid, title, now).into_bytes()),
    }
}

pub fn to_csv(grid: &RawGrid) -> Result<Vec<u8>, SheetError> {
    let mut wtr = WriterBuilder::new().flexible(true).from_writer(vec![]);
    let write = |wtr: &mut csv::Writer<Vec<u8>>, row: &Row| {
        wtr.write_record(row.cells())
            .map_err(|e| SheetError::Export(e.to_string()))
    };
    write(&mut wtr, grid.header())?;
    for row in grid.rows() {
        write(&mut wtr, row)?;
    }
    wtr.into_inner().map_err(|e| SheetError::Export(e.to_string()))
}

pub fn to_xlsx(grid: &RawGrid) -> Result<Vec<u8>, SheetError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(EXCEL_SHEET_NAME)?;

    for (c, _) in grid.header().cells().iter().enumerate() {
        worksheet.set_column_width(c as u16, EXCEL_COLUMN_WIDTH)?;
    }
    let all_rows = std::iter::once(grid.header()).chain(grid.rows().iter());
    for (r, row) in all_rows.enumerate() {
        for (c, cell) in row.cells().iter().enumerate() {
            worksheet.write_string(r as u32, c as u16, cell)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Array of header-keyed objects, two-space indented.
pub fn to_json(grid: &RawGrid) -> Result<Vec<u8>, SheetError> {
    Ok(serde_json::to_vec_pretty(&grid.keyed_records())?)
}

pub fn to_html(grid: &RawGrid, title: &str, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!("<h1>{} Data Export</h1>\n", escape_html(title)));
    out.push_str(&format!("<p>Exported on: {}</p>\n", now.to_rfc3339()));
    out.push_str(&format!("<p>Total Records: {}</p>\n", grid.len()));
    out.push_str("<table border=\"1\" style=\"width:100%; border-collapse:collapse;\">\n");
    out.push_str("<thead>\n<tr>");
    for head in grid.header().cells() {
        out.push_str(&format!("<th>{}</th>", escape_html(head)));
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in grid.rows().iter().take(HTML_ROW_LIMIT) {
        out.push_str("<tr>");
        for cell in row.cells() {
            out.push_str(&format!("<td>{}</td>", escape_html(cell)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    if grid.len() > HTML_ROW_LIMIT {
        out.push_str(&format!("<p>... and {} more records</p>\n", grid.len() - HTML_ROW_LIMIT));
    }
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn export_file_name(prefix: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!("{}_export_{}.{}", prefix, now.timestamp_millis(), format.extension())
}

// =============================================================================
// History
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Epoch milliseconds at export time.
    pub id: i64,
    pub date: String,
    pub format: ExportFormat,
    pub rows: usize,
    pub filters: ExportFilters,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportHistory {
    entries: Vec<ExportEntry>,
}

pub fn history_key(prefix: &str) -> String {
    format!("{}_export_history", prefix)
}

impl ExportHistory {
    /// Unreadable history is treated as empty.
    pub fn load(store: &dyn KvStore, key: &str) -> Result<Self> {
        let entries = match store.get(key)? {
            Some(raw) => match serde_json::from_str::<Vec<ExportEntry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    log(
                        Level::Warn,
                        Domain::Export,
                        "history_unreadable",
                        obj(&[("key", v_str(key)), ("error", v_str(&err.to_string()))]),
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok(Self { entries })
    }

    pub fn save(&self, store: &mut dyn KvStore, key: &str) -> Result<()> {
        store.set(key, &serde_json::to_string(&self.entries)?)
    }

    /// Newest first; the oldest beyond the cap fall off.
    pub fn record(&mut self, entry: ExportEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_LIMIT);
    }

    pub fn entries(&self) -> &[ExportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Exporter
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub bytes: usize,
    pub entry: ExportEntry,
}

/// Filter, render, write, and record one export.
pub struct Exporter<'a> {
    pub prefix: &'a str,
    pub dir: &'a Path,
}

impl Exporter<'_> {
    /// `Ok(None)` when the filters leave nothing to export.
    pub fn run(
        &self,
        grid: &RawGrid,
        filters: &ExportFilters,
        format: ExportFormat,
        store: &mut dyn KvStore,
        now: DateTime<Utc>,
    ) -> Result<Option<ExportReceipt>> {
        let selected: Vec<Row> = filters.apply(grid.rows()).into_iter().cloned().collect();
        if selected.is_empty() {
            log(
                Level::Info,
                Domain::Export,
                "export_skipped",
                obj(&[("reason", v_str("no rows after filtering"))]),
            );
            return Ok(None);
        }
        let filtered = grid.with_rows(selected);

        let body = render(format, &filtered, self.prefix, now)?;
        fs::create_dir_all(self.dir)?;
        let path = self.dir.join(export_file_name(self.prefix, format, now));
        fs::write(&path, &body)?;
        log_export(format.as_str(), filtered.len(), body.len(), &path.display().to_string());

        let entry = ExportEntry {
            id: now.timestamp_millis(),
            date: now.to_rfc3339(),
            format,
            rows: filtered.len(),
            filters: filters.clone(),
        };
        let key = history_key(self.prefix);
        let mut history = ExportHistory::load(store, &key)?;
        history.record(entry.clone());
        history.save(store, &key)?;

        Ok(Some(ExportReceipt {
            path,
            bytes: body.len(),
            entry,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn grid() -> RawGrid {
        RawGrid::from_rows(
            &["Name", "Target", "Collected"],
            &[
                vec!["Rahul R", "85%", "45,000"],
                vec!["Meera", "65%", "900"],
                vec!["Arjun", "40%", "12000"],
                vec!["Kiran", "n/a", "5,500"],
            ],
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn names(rows: &[&Row]) -> Vec<String> {
        rows.iter().map(|r| r.key().to_string()).collect()
    }

    #[test]
    fn status_bands() {
        let g = grid();
        let high = ExportFilters { status: Some(StatusBand::High), ..Default::default() };
        assert_eq!(names(&high.apply(g.rows())), vec!["Rahul R"]);
        let medium = ExportFilters { status: Some(StatusBand::Medium), ..Default::default() };
        assert_eq!(names(&medium.apply(g.rows())), vec!["Meera"]);
        // Kiran has no percent cell and is excluded from every band
        let low = ExportFilters { status: Some(StatusBand::Low), ..Default::default() };
        assert_eq!(names(&low.apply(g.rows())), vec!["Arjun"]);
    }

    #[test]
    fn amount_cell_needs_four_chars() {
        assert_eq!(amount_cell(&Row::from(vec!["x", "900", "45,000"])), Some(45000.0));
        assert_eq!(amount_cell(&Row::from(vec!["x", "900"])), None);
        assert_eq!(amount_cell(&Row::from(vec!["1,00"])), Some(100.0));
        assert_eq!(amount_cell(&Row::from(vec!["₹4500"])), None);
    }

    #[test]
    fn amount_range_is_inclusive() {
        let g = grid();
        let f = ExportFilters {
            min_amount: Some(5500.0),
            max_amount: Some(12000.0),
            ..Default::default()
        };
        assert_eq!(names(&f.apply(g.rows())), vec!["Arjun", "Kiran"]);

        // zero max means no upper bound; Meera has no qualifying amount cell
        let f = ExportFilters {
            min_amount: Some(10000.0),
            max_amount: Some(0.0),
            ..Default::default()
        };
        assert_eq!(names(&f.apply(g.rows())), vec!["Rahul R", "Arjun"]);
    }

    #[test]
    fn search_and_employee_combine() {
        let g = grid();
        let f = ExportFilters {
            search_term: "%".to_string(),
            employee: "r".to_string(),
            ..Default::default()
        };
        assert_eq!(names(&f.apply(g.rows())), vec!["Rahul R", "Meera", "Arjun"]);
    }

    #[test]
    fn csv_quotes_embedded_commas() {
        let out = String::from_utf8(to_csv(&grid()).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Name,Target,Collected");
        assert_eq!(lines[1], "Rahul R,85%,\"45,000\"");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn json_is_header_keyed_and_ordered() {
        let out = String::from_utf8(to_json(&grid()).unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["Collected"], "45,000");
        assert_eq!(parsed.as_array().unwrap().len(), 4);
        assert!(out.contains("\n  {\n    \"Name\": \"Rahul R\",\n    \"Target\""));
    }

    #[test]
    fn json_omits_cells_a_short_row_lacks() {
        let g = RawGrid::from_rows(&["Name", "Target", "Collected"], &[vec!["Sanju", "70%"]]);
        let parsed: serde_json::Value = serde_json::from_slice(&to_json(&g).unwrap()).unwrap();
        let record = parsed[0].as_object().unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record["Target"], "70%");
        assert!(!record.contains_key("Collected"));
    }

    #[test]
    fn html_truncates_and_escapes() {
        let rows: Vec<Vec<&str>> = (0..53).map(|_| vec!["<b>", "1"]).collect();
        let g = RawGrid::from_rows(&["Name", "N"], &rows);
        let html = to_html(&g, "acme", t0());
        assert!(html.contains("<p>Total Records: 53</p>"));
        assert!(html.contains("<p>... and 3 more records</p>"));
        assert_eq!(html.matches("<td>&lt;b&gt;</td>").count(), 50);
        assert!(!html.contains("<td><b>"));
    }

    #[test]
    fn xlsx_is_a_zip() {
        let bytes = to_xlsx(&grid()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn format_names() {
        assert_eq!(ExportFormat::parse("PDF"), Some(ExportFormat::Html));
        assert_eq!(ExportFormat::parse("excel").map(|f| f.extension()), Some("xlsx"));
        assert_eq!(ExportFormat::parse("yaml"), None);
        assert_eq!(
            export_file_name("acme", ExportFormat::Json, t0()),
            "acme_export_1772355600000.json"
        );
    }

    #[test]
    fn history_caps_at_ten_newest_first() {
        let mut history = ExportHistory::default();
        for i in 0..12 {
            history.record(ExportEntry {
                id: i,
                date: String::new(),
                format: ExportFormat::Csv,
                rows: 1,
                filters: ExportFilters::default(),
            });
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.entries()[0].id, 11);
        assert_eq!(history.entries()[9].id, 2);
    }

    #[test]
    fn corrupt_history_reads_empty() {
        let mut store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        assert!(ExportHistory::load(&store, "k").unwrap().is_empty());
    }

    #[test]
    fn exporter_writes_file_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        let exporter = Exporter { prefix: "acme", dir: dir.path() };
        let filters = ExportFilters { status: Some(StatusBand::High), ..Default::default() };

        let receipt = exporter
            .run(&grid(), &filters, ExportFormat::Csv, &mut store, t0())
            .unwrap()
            .unwrap();
        assert_eq!(receipt.entry.rows, 1);
        let written = std::fs::read_to_string(&receipt.path).unwrap();
        assert!(written.starts_with("Name,Target,Collected"));

        let history = ExportHistory::load(&store, &history_key("acme")).unwrap();
        assert_eq!(history.entries()[0].filters.status, Some(StatusBand::High));

        let nothing = ExportFilters { employee: "nobody".to_string(), ..Default::default() };
        assert!(exporter
            .run(&grid(), &nothing, ExportFormat::Json, &mut store, t0())
            .unwrap()
            .is_none());
        assert_eq!(ExportHistory::load(&store, &history_key("acme")).unwrap().len(), 1);
    }
}
