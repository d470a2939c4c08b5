//! Tabular views: the employee collection table and the summary cards.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::classify::parse_float_prefix;
use crate::grid::{RawGrid, Row, MISSING_CELL};

pub const DEFAULT_ROWS_PER_PAGE: usize = 10;
/// Shown for blank summary values.
pub const BLANK_PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub column: usize,
    pub direction: SortDirection,
}

impl SortState {
    /// Column-header click: same column ascending flips to descending,
    /// anything else starts ascending.
    pub fn toggle(current: Option<SortState>, column: usize) -> SortState {
        let direction = match current {
            Some(s) if s.column == column && s.direction == SortDirection::Ascending => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        SortState { column, direction }
    }
}

/// Case-insensitive substring match against any cell. Empty term matches all.
pub fn row_matches(row: &Row, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    row.cells().iter().any(|c| c.to_lowercase().contains(&needle))
}

pub fn search<'a>(rows: &'a [Row], term: &str) -> Vec<&'a Row> {
    rows.iter().filter(|r| row_matches(r, term)).collect()
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    fn of(cell: &str) -> Self {
        match parse_float_prefix(cell) {
            Some(n) if !n.is_nan() => SortKey::Number(n),
            _ => SortKey::Text(cell.to_string()),
        }
    }

    // Numbers sort before text so mixed columns still get a total order.
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
            (SortKey::Text(a), SortKey::Text(b)) => text_order(a, b),
        }
    }
}

fn text_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Stable sort on one column.
pub fn sort_rows(rows: &mut [&Row], state: SortState) {
    rows.sort_by(|a, b| {
        let ord = SortKey::of(a.cell(state.column)).compare(&SortKey::of(b.cell(state.column)));
        match state.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    /// 1-based.
    pub number: usize,
    pub per_page: usize,
    pub total_rows: usize,
    pub total_pages: usize,
    pub rows: Vec<&'a Row>,
}

pub fn page_count(total_rows: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    total_rows.div_ceil(per_page)
}

/// Slice out page `number`. Out-of-range pages come back empty.
pub fn paginate<'a>(rows: &[&'a Row], number: usize, per_page: usize) -> Page<'a> {
    let start = number.saturating_sub(1).saturating_mul(per_page);
    let end = start.saturating_add(per_page).min(rows.len());
    let slice = if start < end { rows[start..end].to_vec() } else { Vec::new() };
    Page {
        number,
        per_page,
        total_rows: rows.len(),
        total_pages: page_count(rows.len(), per_page),
        rows: slice,
    }
}

/// Search, sort, then page; the collection view's whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub search: String,
    pub sort: Option<SortState>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: None,
            page: 1,
            per_page: DEFAULT_ROWS_PER_PAGE,
        }
    }
}

impl TableQuery {
    /// Header click.
    pub fn sort_by(&mut self, column: usize) {
        self.sort = Some(SortState::toggle(self.sort, column));
    }

    /// New search or page size sends the view back to page one.
    pub fn set_search(&mut self, term: &str) {
        self.search = term.to_string();
        self.page = 1;
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.per_page = per_page;
        self.page = 1;
    }

    pub fn run<'a>(&self, grid: &'a RawGrid) -> Page<'a> {
        let mut rows = search(grid.rows(), &self.search);
        if let Some(state) = self.sort {
            sort_rows(&mut rows, state);
        }
        paginate(&rows, self.page, self.per_page)
    }
}

/// Header joined as-is; every data cell wrapped in double quotes.
/// Embedded quotes are not escaped.
pub fn quoted_csv(grid: &RawGrid) -> String {
    let mut lines = Vec::with_capacity(grid.len() + 1);
    lines.push(grid.header().cells().join(","));
    for row in grid.rows() {
        let cells: Vec<String> = row.cells().iter().map(|c| format!("\"{}\"", c)).collect();
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

/// Header-keyed cards with blank or missing values shown as a dash.
/// A repeated label shows its leftmost column.
pub fn summary_records(grid: &RawGrid) -> Vec<Map<String, Value>> {
    grid.rows()
        .iter()
        .map(|row| {
            let mut record = Map::new();
            for label in grid.header().cells() {
                if record.contains_key(label) {
                    continue;
                }
                let value = row.get(grid, label).unwrap_or(MISSING_CELL);
                let shown = if value.trim().is_empty() { BLANK_PLACEHOLDER } else { value };
                record.insert(label.clone(), Value::String(shown.to_string()));
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> RawGrid {
        RawGrid::from_rows(
            &["Name", "Collected", "City"],
            &[
                vec!["Meera", "1200", "Pune"],
                vec!["arjun", "95", "Delhi"],
                vec!["Kiran", "n/a", "pune"],
                vec!["Bala", "300", ""],
            ],
        )
    }

    #[test]
    fn search_is_case_insensitive_any_cell() {
        let g = grid();
        let hits = search(g.rows(), "PUNE");
        assert_eq!(hits.len(), 2);
        assert_eq!(search(g.rows(), "").len(), 4);
        assert!(search(g.rows(), "zzz").is_empty());
    }

    #[test]
    fn toggle_cycles_direction() {
        let s = SortState::toggle(None, 1);
        assert_eq!(s.direction, SortDirection::Ascending);
        let s = SortState::toggle(Some(s), 1);
        assert_eq!(s.direction, SortDirection::Descending);
        let s = SortState::toggle(Some(s), 1);
        assert_eq!(s.direction, SortDirection::Ascending);
        let asc = SortState { column: 1, direction: SortDirection::Ascending };
        let other = SortState::toggle(Some(asc), 2);
        assert_eq!(other, SortState { column: 2, direction: SortDirection::Ascending });
    }

    #[test]
    fn numeric_column_sorts_by_value() {
        let g = grid();
        let mut q = TableQuery::default();
        q.sort_by(1);
        let names: Vec<&str> = q.run(&g).rows.iter().map(|r| r.key()).collect();
        assert_eq!(names, vec!["arjun", "Bala", "Meera", "Kiran"]);

        q.sort_by(1);
        let names: Vec<&str> = q.run(&g).rows.iter().map(|r| r.key()).collect();
        assert_eq!(names, vec!["Kiran", "Meera", "Bala", "arjun"]);
    }

    #[test]
    fn text_column_ignores_case() {
        let g = grid();
        let mut q = TableQuery::default();
        q.sort_by(0);
        let names: Vec<&str> = q.run(&g).rows.iter().map(|r| r.key()).collect();
        assert_eq!(names, vec!["arjun", "Bala", "Kiran", "Meera"]);
    }

    #[test]
    fn pagination_rounds_up() {
        let rows: Vec<Row> = (0..23).map(|i| Row::from(vec![i.to_string().as_str()])).collect();
        let refs: Vec<&Row> = rows.iter().collect();
        let p = paginate(&refs, 3, 10);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.rows.len(), 3);
        assert_eq!(p.rows[0].key(), "20");
        assert!(paginate(&refs, 4, 10).rows.is_empty());
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(10, 10), 1);
    }

    #[test]
    fn search_resets_page() {
        let mut q = TableQuery { page: 3, ..TableQuery::default() };
        q.set_search("pune");
        assert_eq!(q.page, 1);
        assert_eq!(q.run(&grid()).total_rows, 2);
    }

    #[test]
    fn quoted_export_wraps_data_cells_only() {
        let g = RawGrid::from_rows(&["Name", "Amt"], &[vec!["A", "1,000"], vec!["B", ""]]);
        assert_eq!(quoted_csv(&g), "Name,Amt\n\"A\",\"1,000\"\n\"B\",\"\"");
    }

    #[test]
    fn summary_dashes_blanks() {
        let records = summary_records(&grid());
        assert_eq!(records[3]["City"], Value::String("—".to_string()));
        assert_eq!(records[0]["City"], Value::String("Pune".to_string()));
    }

    #[test]
    fn summary_reads_by_label() {
        let g = RawGrid::from_rows(
            &["Name", "Due", "Due"],
            &[vec!["Sapna", "120", "999"], vec!["Nitin"]],
        );
        let records = summary_records(&g);
        assert_eq!(records[0]["Due"], Value::String("120".to_string()));
        assert_eq!(records[0].len(), 2);
        assert_eq!(records[1]["Due"], Value::String("—".to_string()));
    }
}
