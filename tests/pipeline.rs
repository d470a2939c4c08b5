//! End-to-end: scripted sheet bodies through the poll controller into the
//! dashboard, report, collection and export paths.

use std::sync::Arc;
use std::time::Duration;

use sheetpulse::aggregate::{AlertKind, EstimationPolicy, Roster, Tier};
use sheetpulse::change::HighlightBoard;
use sheetpulse::config::{ViewConfig, ViewKind};
use sheetpulse::export::{ExportFilters, ExportFormat, Exporter, StatusBand};
use sheetpulse::feed::{PollController, PollOutcome, Reply, ScriptedSource};
use sheetpulse::grid::parse_quoted_csv;
use sheetpulse::storage::MemoryStore;
use sheetpulse::table::{quoted_csv, TableQuery};

const TEAM_SHEET: &str = "Name,Target %,Total Leads,Closed,Pending,Amount\n\
rahul r,85%,100,80,20,₹400000\n\
outsider,99%,1000,1000,0,9999999\n\
Meera ,55%,60,30,30,150000\n\
sanju,0%,10,0,10,0\n";

fn view(kind: ViewKind) -> ViewConfig {
    ViewConfig {
        kind,
        url: "scripted".to_string(),
        interval: Some(Duration::from_millis(5000)),
        cache_bust: false,
    }
}

fn controller(kind: ViewKind, replies: Vec<Reply>) -> PollController<ScriptedSource> {
    PollController::new(
        view(kind),
        ScriptedSource::new(replies),
        Arc::new(Roster::new(["rahul r", "meera", "sanju"])),
        EstimationPolicy::default(),
        HighlightBoard::default(),
    )
}

#[tokio::test]
async fn dashboard_overview_from_sheet_columns() {
    let c = controller(ViewKind::Dashboard, vec![Reply::Body(TEAM_SHEET.to_string())]);
    assert!(matches!(c.poll_once().await, PollOutcome::Committed { rows: 4, .. }));

    let snap = c.snapshot().expect("committed snapshot");
    let overview = snap.overview.as_ref().expect("dashboard overview");
    let agg = &overview.aggregate;

    // sanju sits at 0% and drops out of the list but still counts as a member
    assert_eq!(agg.team_member_count, 3);
    assert_eq!(overview.employees.len(), 2);
    assert_eq!(agg.average_performance, 70.0);
    assert_eq!(agg.total_leads, 170);
    assert_eq!(agg.closed_leads, 110);
    assert_eq!(agg.pending_leads, 60);
    assert_eq!(agg.total_amount, 550_000);
    assert_eq!(agg.success_rate_percent, 65);
    assert!(!agg.leads_estimated && !agg.amount_estimated);

    assert_eq!(overview.top_performers[0].name, "rahul r");
    assert_eq!(overview.top_performers[0].tier, Tier::Excellent);
    assert_eq!(overview.employees[1].name, "Meera");

    let kinds: Vec<AlertKind> = overview.alerts.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AlertKind::Good, AlertKind::Bad]);
}

#[tokio::test]
async fn dashboard_estimates_without_lead_columns() {
    let body = "Name,Score\nrahul r,80%\nmeera,80%\n";
    let c = controller(ViewKind::Dashboard, vec![Reply::Body(body.to_string())]);
    c.poll_once().await;

    let snap = c.snapshot().expect("snapshot");
    let agg = &snap.overview.as_ref().expect("overview").aggregate;
    assert_eq!(agg.total_leads, 440);
    assert_eq!(agg.closed_leads, 370);
    assert_eq!(agg.pending_leads, 70);
    assert_eq!(agg.total_amount, 1_850_000);
    assert!(agg.leads_estimated && agg.amount_estimated);
}

#[tokio::test]
async fn failed_poll_then_recovery() {
    let c = controller(
        ViewKind::Collection,
        vec![Reply::Status(500), Reply::Body("Name,Due\nx,1\n".to_string())],
    );
    assert_eq!(c.poll_once().await, PollOutcome::Failed("Failed to fetch CSV".to_string()));
    assert!(c.snapshot().is_none());
    assert!(!c.status().loading);

    assert!(matches!(c.poll_once().await, PollOutcome::Committed { .. }));
    assert_eq!(c.status().last_error, None);
    assert_eq!(c.status().refresh_count, 1);
}

#[tokio::test(start_paused = true)]
async fn report_highlights_appended_rows_then_clears() {
    let c = controller(
        ViewKind::Report,
        vec![
            Reply::Body("Name,Status\na,open\nb,open\n".to_string()),
            Reply::Body("Name,Status\na,open\nb,open\nc,new\nd,new\n".to_string()),
        ],
    );
    c.poll_once().await;
    assert!(c.highlights().snapshot().is_empty());

    c.poll_once().await;
    assert_eq!(c.highlights().snapshot().to_vec(), vec![2, 3]);

    tokio::time::sleep(Duration::from_millis(2999)).await;
    assert_eq!(c.highlights().snapshot().len(), 2);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(c.highlights().snapshot().is_empty());
}

#[test]
fn collection_table_and_export_share_the_grid() {
    let grid = parse_quoted_csv(TEAM_SHEET).unwrap();

    let mut q = TableQuery::default();
    q.set_search("r");
    q.sort_by(5);
    let page = q.run(&grid);
    let names: Vec<&str> = page.rows.iter().map(|r| r.key()).collect();
    // ₹400000 is not numeric, so it sorts after the plain amounts
    assert_eq!(names, vec!["Meera ", "outsider", "rahul r"]);

    let quoted = quoted_csv(&grid);
    assert!(quoted.starts_with("Name,Target %,Total Leads"));
    assert!(quoted.contains("\"outsider\",\"99%\""));

    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore::new();
    let exporter = Exporter {
        prefix: "team",
        dir: dir.path(),
    };
    let filters = ExportFilters {
        status: Some(StatusBand::High),
        ..Default::default()
    };
    let receipt = exporter
        .run(&grid, &filters, ExportFormat::Json, &mut store, chrono::Utc::now())
        .unwrap()
        .unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(receipt.path).unwrap()).unwrap();
    let exported: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["Name"].as_str().unwrap())
        .collect();
    assert_eq!(exported, vec!["rahul r", "outsider"]);
}
