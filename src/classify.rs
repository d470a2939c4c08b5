//! Heuristic column sniffing.
//!
//! Sheets carry no schema, so semantic columns are located by keyword
//! matching on header labels and by looking at cell contents. The rules are
//! order-dependent on purpose: leftmost match wins, and the percentage sniff
//! only inspects columns 1 through 4 of a row.

use serde::Serialize;

use crate::grid::Row;

pub const TOTAL_LEAD_KEYWORDS: &[&str] = &["total", "lead", "leads"];
pub const PENDING_KEYWORDS: &[&str] = &["pending", "remaining", "not closed"];
pub const CLOSED_KEYWORDS: &[&str] = &["closed", "successful", "completed"];
pub const AMOUNT_KEYWORDS: &[&str] = &["amount", "rupee", "₹", "inr"];

/// Exclusive upper bound of the percentage scan window (columns 1..=4).
pub const PERCENT_SCAN_END: usize = 5;

/// Column positions found in a header row; `None` means no keyword matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ColumnMap {
    pub total_leads: Option<usize>,
    pub pending: Option<usize>,
    pub closed: Option<usize>,
    pub amount: Option<usize>,
}

impl ColumnMap {
    pub fn sniff(header: &Row) -> Self {
        Self {
            total_leads: find_column(header, TOTAL_LEAD_KEYWORDS),
            pending: find_column(header, PENDING_KEYWORDS),
            closed: find_column(header, CLOSED_KEYWORDS),
            amount: find_column(header, AMOUNT_KEYWORDS),
        }
    }

    pub fn any_found(&self) -> bool {
        self.total_leads.is_some()
            || self.pending.is_some()
            || self.closed.is_some()
            || self.amount.is_some()
    }
}

/// Leftmost column whose lower-cased label contains any keyword.
pub fn find_column(header: &Row, keywords: &[&str]) -> Option<usize> {
    header.cells().iter().position(|label| {
        let label = label.to_lowercase();
        keywords.iter().any(|kw| label.contains(kw))
    })
}

/// Performance percentage for one row.
///
/// Walks cells 1..min(len, 5). The first cell holding a `%` decides the value
/// (its numeric prefix, or 0 when there is none). Failing that, the first cell
/// whose numeric prefix is at most 100 is taken. Returns 0 when nothing in the
/// window qualifies, even if a later column holds the real percentage.
pub fn sniff_percentage(row: &Row) -> f64 {
    let end = row.len().min(PERCENT_SCAN_END);
    for idx in 1..end {
        let cell = row.cell(idx).trim();
        if cell.contains('%') {
            return parse_float_prefix(&cell.replacen('%', "", 1)).unwrap_or(0.0);
        }
        if let Some(value) = parse_float_prefix(cell) {
            if value <= 100.0 {
                return value;
            }
        }
    }
    0.0
}

/// Whole-number extraction used for lead and amount cells: every non-digit is
/// discarded and what remains is read as an integer. Nothing left means 0.
/// "₹45,000 (pending)" reads as 45000 and "N/A" as 0.
pub fn extract_digits(cell: &str) -> u64 {
    cell.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(d as u64))
}

/// Leading decimal number of `s`, ignoring leading whitespace and any
/// trailing garbage. `"82.5 %"` gives 82.5, `"45abc"` gives 45, `"₹45"` and
/// `""` give `None`.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        let negative = bytes.first() == Some(&b'-');
        return Some(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}
