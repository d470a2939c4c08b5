//! Team overview: per-employee performance, team totals, tiers and alerts.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::classify::{extract_digits, sniff_percentage, ColumnMap};
use crate::grid::{RawGrid, Row};

pub const MAX_TOP_PERFORMERS: usize = 3;
pub const MAX_ALERTS: usize = 7;

/// Closed set of recognised team members, compared trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    names: HashSet<String>,
}

impl Roster {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| normalize_name(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = normalize_name(name);
        !key.is_empty() && self.names.contains(&key)
    }

    /// Whether the row's name cell belongs to the roster.
    pub fn admits(&self, row: &Row) -> bool {
        self.contains(row.key())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Excellent,
    Good,
    Average,
    NeedsImprovement,
}

impl Tier {
    pub fn classify(value: f64) -> Self {
        if value >= 80.0 {
            Tier::Excellent
        } else if value >= 60.0 {
            Tier::Good
        } else if value >= 40.0 {
            Tier::Average
        } else {
            Tier::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Excellent => "Excellent",
            Tier::Good => "Good",
            Tier::Average => "Average",
            Tier::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Team-level banner derived from the average with the same breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TeamBanner {
    Positive,
    Neutral,
    Negative,
}

impl TeamBanner {
    pub fn for_average(avg: f64) -> Self {
        match Tier::classify(avg) {
            Tier::Excellent => TeamBanner::Positive,
            Tier::Good => TeamBanner::Neutral,
            Tier::Average | Tier::NeedsImprovement => TeamBanner::Negative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeRecord {
    pub name: String,
    pub performance: f64,
    pub tier: Tier,
    /// Cells after the name column, as fetched.
    pub raw_cells: Vec<String>,
}

/// Estimates used when the sheet carries no usable lead or amount figures.
///
/// Total leads are derived from the rounded team average, a fixed share of
/// them is assumed closed, and each closed lead is valued at a flat amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimationPolicy {
    pub leads_per_point: f64,
    pub closed_ratio: f64,
    pub amount_per_closed_lead: u64,
}

impl Default for EstimationPolicy {
    fn default() -> Self {
        Self {
            leads_per_point: 5.5,
            closed_ratio: 0.84,
            amount_per_closed_lead: 5000,
        }
    }
}

impl EstimationPolicy {
    /// (total, closed, pending) from a rounded team average.
    pub fn estimate_leads(&self, average: u64) -> (u64, u64, u64) {
        let total = round_half_up(average as f64 * self.leads_per_point);
        let closed = round_half_up(total as f64 * self.closed_ratio);
        (total, closed, total.saturating_sub(closed))
    }

    pub fn estimate_amount(&self, closed: u64) -> u64 {
        closed.saturating_mul(self.amount_per_closed_lead)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamAggregate {
    pub team_member_count: usize,
    /// Unrounded mean over the performance list.
    pub average_performance: f64,
    pub total_leads: u64,
    pub closed_leads: u64,
    pub pending_leads: u64,
    pub success_rate_percent: u64,
    pub total_amount: u64,
    /// Which figures came from the estimation policy rather than the sheet.
    pub leads_estimated: bool,
    pub amount_estimated: bool,
}

impl TeamAggregate {
    /// Average as shown on the header cards and fed to the estimation policy.
    pub fn rounded_average(&self) -> u64 {
        round_half_up(self.average_performance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    Good,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

/// Everything a dashboard render needs from one poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamOverview {
    pub columns: ColumnMap,
    pub employees: Vec<EmployeeRecord>,
    pub top_performers: Vec<EmployeeRecord>,
    pub aggregate: TeamAggregate,
    pub alerts: Vec<Alert>,
}

impl TeamOverview {
    pub fn compute(grid: &RawGrid, roster: &Roster, policy: &EstimationPolicy) -> Self {
        let columns = ColumnMap::sniff(grid.header());
        let employees = employee_records(grid, roster);
        let aggregate = team_aggregate(grid, roster, &columns, &employees, policy);
        let top_performers = top_performers(&employees, MAX_TOP_PERFORMERS);
        let alerts = performance_alerts(&employees);
        Self {
            columns,
            employees,
            top_performers,
            aggregate,
            alerts,
        }
    }

    pub fn banner(&self) -> TeamBanner {
        TeamBanner::for_average(self.aggregate.average_performance)
    }
}

/// Roster rows with a positive sniffed percentage, in sheet order.
pub fn employee_records(grid: &RawGrid, roster: &Roster) -> Vec<EmployeeRecord> {
    grid.rows()
        .iter()
        .filter(|row| roster.admits(row))
        .map(|row| {
            let performance = sniff_percentage(row);
            let performance = if performance.is_nan() { 0.0 } else { performance };
            EmployeeRecord {
                name: row.key().trim().to_string(),
                performance,
                tier: Tier::classify(performance),
                raw_cells: row.cells().iter().skip(1).cloned().collect(),
            }
        })
        .filter(|rec| rec.performance > 0.0)
        .collect()
}

pub fn average_performance(employees: &[EmployeeRecord]) -> f64 {
    if employees.is_empty() {
        return 0.0;
    }
    employees.iter().map(|e| e.performance).sum::<f64>() / employees.len() as f64
}

pub fn team_aggregate(
    grid: &RawGrid,
    roster: &Roster,
    columns: &ColumnMap,
    employees: &[EmployeeRecord],
    policy: &EstimationPolicy,
) -> TeamAggregate {
    let members: Vec<&Row> = grid.rows().iter().filter(|row| roster.admits(row)).collect();
    let sum_column = |col: Option<usize>| -> u64 {
        col.map(|idx| {
            members
                .iter()
                .map(|row| extract_digits(row.cell(idx)))
                .fold(0u64, u64::saturating_add)
        })
        .unwrap_or(0)
    };

    let average = average_performance(employees);
    let rounded = round_half_up(average);

    let mut total = sum_column(columns.total_leads);
    let mut pending = sum_column(columns.pending);
    let mut closed = sum_column(columns.closed);
    let mut amount = sum_column(columns.amount);

    let mut leads_estimated = false;
    if total == 0 {
        total = closed.saturating_add(pending);
        if total == 0 {
            (total, closed, pending) = policy.estimate_leads(rounded);
            leads_estimated = true;
        }
    }

    let mut amount_estimated = false;
    if amount == 0 {
        amount = policy.estimate_amount(closed);
        amount_estimated = true;
    }

    TeamAggregate {
        team_member_count: members.len(),
        average_performance: average,
        total_leads: total,
        closed_leads: closed,
        pending_leads: pending,
        success_rate_percent: success_rate(closed, total),
        total_amount: amount,
        leads_estimated,
        amount_estimated,
    }
}

/// round(closed / total * 100), or 0 without leads.
pub fn success_rate(closed: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    round_half_up(closed as f64 / total as f64 * 100.0)
}

/// Highest performers first; ties keep sheet order.
pub fn top_performers(employees: &[EmployeeRecord], n: usize) -> Vec<EmployeeRecord> {
    let mut sorted = employees.to_vec();
    sorted.sort_by(|a, b| {
        b.performance
            .partial_cmp(&a.performance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(n);
    sorted
}

/// Per-employee alerts (>= 80 good, < 70 bad) with the team banner in front,
/// capped at [`MAX_ALERTS`].
pub fn performance_alerts(employees: &[EmployeeRecord]) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = employees
        .iter()
        .filter_map(|e| {
            if e.performance >= 80.0 {
                Some(Alert {
                    kind: AlertKind::Good,
                    message: format!("{} - Excellent Performance ({}%)", e.name, e.performance),
                })
            } else if e.performance < 70.0 {
                Some(Alert {
                    kind: AlertKind::Bad,
                    message: format!("{} - Needs Improvement ({}%)", e.name, e.performance),
                })
            } else {
                None
            }
        })
        .collect();

    let average = average_performance(employees);
    match TeamBanner::for_average(average) {
        TeamBanner::Positive => alerts.insert(
            0,
            Alert {
                kind: AlertKind::Good,
                message: format!("Team Average Performance is Excellent ({:.1}%)", average),
            },
        ),
        TeamBanner::Negative => alerts.insert(
            0,
            Alert {
                kind: AlertKind::Bad,
                message: format!("Team Average Performance Needs Attention ({:.1}%)", average),
            },
        ),
        TeamBanner::Neutral => {}
    }

    alerts.truncate(MAX_ALERTS);
    alerts
}

/// Half-way cases round towards positive infinity.
pub fn round_half_up(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value + 0.5).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Roster {
        Roster::new(["rahul r", "meera"])
    }

    #[test]
    fn roster_matches_trimmed_case_folded() {
        let r = roster();
        assert!(r.contains("  Rahul R "));
        assert!(r.contains("MEERA"));
        assert!(!r.contains("rahul"));
        assert!(!r.contains(""));
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(Tier::classify(80.0), Tier::Excellent);
        assert_eq!(Tier::classify(79.9), Tier::Good);
        assert_eq!(Tier::classify(60.0), Tier::Good);
        assert_eq!(Tier::classify(59.9), Tier::Average);
        assert_eq!(Tier::classify(40.0), Tier::Average);
        assert_eq!(Tier::classify(39.9), Tier::NeedsImprovement);
        assert_eq!(Tier::NeedsImprovement.to_string(), "Needs Improvement");
    }

    #[test]
    fn banner_uses_same_breakpoints() {
        assert_eq!(TeamBanner::for_average(80.0), TeamBanner::Positive);
        assert_eq!(TeamBanner::for_average(70.0), TeamBanner::Neutral);
        assert_eq!(TeamBanner::for_average(59.9), TeamBanner::Negative);
    }

    #[test]
    fn filters_to_roster() {
        let grid = RawGrid::from_rows(
            &["Name", "Target"],
            &[vec!["rahul r", "85%"], vec!["someone else", "99%"], vec!["meera", "55%"]],
        );
        let employees = employee_records(&grid, &roster());
        let values: Vec<f64> = employees.iter().map(|e| e.performance).collect();
        assert_eq!(values, vec![85.0, 55.0]);
        assert_eq!(average_performance(&employees), 70.0);
        assert_eq!(employees[0].raw_cells, vec!["85%".to_string()]);
    }

    #[test]
    fn zero_performance_counts_as_member_only() {
        let grid = RawGrid::from_rows(
            &["Name", "Target"],
            &[vec!["rahul r", "85%"], vec!["meera", "n/a"]],
        );
        let overview = TeamOverview::compute(&grid, &roster(), &EstimationPolicy::default());
        assert_eq!(overview.employees.len(), 1);
        assert_eq!(overview.aggregate.team_member_count, 2);
    }

    #[test]
    fn estimation_policy_fallback() {
        let policy = EstimationPolicy::default();
        assert_eq!(policy.estimate_leads(80), (440, 370, 70));
        assert_eq!(policy.estimate_amount(370), 1_850_000);
    }

    #[test]
    fn aggregate_falls_back_without_columns() {
        let grid = RawGrid::from_rows(
            &["Name", "Target"],
            &[vec!["rahul r", "80%"], vec!["meera", "80%"]],
        );
        let overview = TeamOverview::compute(&grid, &roster(), &EstimationPolicy::default());
        let agg = &overview.aggregate;
        assert_eq!(agg.total_leads, 440);
        assert_eq!(agg.closed_leads, 370);
        assert_eq!(agg.pending_leads, 70);
        assert_eq!(agg.total_amount, 1_850_000);
        assert_eq!(agg.success_rate_percent, 84);
        assert!(agg.leads_estimated && agg.amount_estimated);
    }

    #[test]
    fn aggregate_sums_found_columns() {
        let grid = RawGrid::from_rows(
            &["Name", "Target", "Total Leads", "Closed", "Pending", "Amount"],
            &[
                vec!["rahul r", "85%", "100", "80", "20", "₹45,000"],
                vec!["meera", "55%", "50", "20", "30", "N/A"],
                vec!["outsider", "90%", "999", "999", "0", "999999"],
            ],
        );
        let agg = TeamOverview::compute(&grid, &roster(), &EstimationPolicy::default()).aggregate;
        assert_eq!(agg.team_member_count, 2);
        assert_eq!(agg.total_leads, 150);
        assert_eq!(agg.closed_leads, 100);
        assert_eq!(agg.pending_leads, 50);
        assert_eq!(agg.total_amount, 45_000);
        assert_eq!(agg.success_rate_percent, 67);
        assert!(!agg.leads_estimated && !agg.amount_estimated);
    }

    #[test]
    fn total_rebuilt_from_closed_and_pending() {
        let grid = RawGrid::from_rows(
            &["Name", "Target", "Done (closed)", "Pending"],
            &[vec!["meera", "60%", "30", "10"]],
        );
        let agg = TeamOverview::compute(&grid, &roster(), &EstimationPolicy::default()).aggregate;
        assert_eq!(agg.total_leads, 40);
        assert_eq!(agg.success_rate_percent, 75);
        assert_eq!(agg.total_amount, 150_000);
        assert!(!agg.leads_estimated);
        assert!(agg.amount_estimated);
    }

    #[test]
    fn top_performers_stable_on_ties() {
        let grid = RawGrid::from_rows(
            &["Name", "T"],
            &[
                vec!["a", "70"],
                vec!["b", "90"],
                vec!["c", "70"],
                vec!["d", "95"],
                vec!["e", "70"],
            ],
        );
        let all = Roster::new(["a", "b", "c", "d", "e"]);
        let top = top_performers(&employee_records(&grid, &all), 3);
        let names: Vec<&str> = top.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["d", "b", "a"]);
    }

    #[test]
    fn alerts_put_team_banner_first() {
        let grid = RawGrid::from_rows(
            &["Name", "T"],
            &[vec!["rahul r", "85%"], vec!["meera", "30%"]],
        );
        let alerts = performance_alerts(&employee_records(&grid, &roster()));
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].kind, AlertKind::Bad);
        assert_eq!(alerts[0].message, "Team Average Performance Needs Attention (57.5%)");
        assert_eq!(alerts[1].message, "rahul r - Excellent Performance (85%)");
        assert_eq!(alerts[2].message, "meera - Needs Improvement (30%)");
    }

    #[test]
    fn alerts_capped() {
        let names: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
        let rows: Vec<Vec<&str>> = names.iter().map(|n| vec![n.as_str(), "90%"]).collect();
        let grid = RawGrid::from_rows(&["Name", "T"], &rows);
        let alerts = performance_alerts(&employee_records(&grid, &Roster::new(&names)));
        assert_eq!(alerts.len(), MAX_ALERTS);
        assert!(alerts[0].message.starts_with("Team Average"));
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(369.6), 370);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(5, 0), 0);
    }
}
