//! One-shot filtered export of the exporter view's sheet.
//!
//! Usage:
//!   export [options]
//!
//! Options:
//!   --format=<csv|excel|json|html>   Output format (default: csv)
//!   --search=<term>                  Any cell contains term (case-insensitive)
//!   --employee=<name>                Name column contains value
//!   --status=<high|medium|low>       Band of the first percent cell
//!   --min=<amount> --max=<amount>    Inclusive amount range
//!   --out=<dir>                      Output directory (default: EXPORT_DIR)
//!   --history                        Print the export history and exit

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Result};
use chrono::Utc;

use sheetpulse::classify::parse_float_prefix;
use sheetpulse::config::{Config, ViewConfig, ViewKind};
use sheetpulse::export::{
    history_key, ExportFilters, ExportFormat, ExportHistory, Exporter, StatusBand,
};
use sheetpulse::feed::{CsvSource, HttpCsvSource};
use sheetpulse::grid::parse_quoted_csv;
use sheetpulse::logging::{log, obj, v_str, Domain, Level};
use sheetpulse::session::{Credentials, SessionContext};
use sheetpulse::storage::SqliteStore;

struct Args {
    format: ExportFormat,
    filters: ExportFilters,
    out: Option<PathBuf>,
    history: bool,
}

fn print_usage() {
    eprintln!("Usage: export [--format=csv|excel|json|html] [--search=..] [--employee=..]");
    eprintln!("              [--status=high|medium|low] [--min=..] [--max=..]");
    eprintln!("              [--out=dir] [--history]");
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        format: ExportFormat::Csv,
        filters: ExportFilters::default(),
        out: None,
        history: false,
    };
    for arg in args {
        if let Some(v) = arg.strip_prefix("--format=") {
            parsed.format = ExportFormat::parse(v).ok_or_else(|| anyhow!("unknown format: {}", v))?;
        } else if let Some(v) = arg.strip_prefix("--search=") {
            parsed.filters.search_term = v.to_string();
        } else if let Some(v) = arg.strip_prefix("--employee=") {
            parsed.filters.employee = v.to_string();
        } else if let Some(v) = arg.strip_prefix("--status=") {
            let band = StatusBand::parse(v).ok_or_else(|| anyhow!("unknown status: {}", v))?;
            parsed.filters.status = Some(band);
        } else if let Some(v) = arg.strip_prefix("--min=") {
            parsed.filters.min_amount = parse_float_prefix(v);
        } else if let Some(v) = arg.strip_prefix("--max=") {
            parsed.filters.max_amount = parse_float_prefix(v);
        } else if let Some(v) = arg.strip_prefix("--out=") {
            parsed.out = Some(PathBuf::from(v));
        } else if arg == "--history" {
            parsed.history = true;
        } else {
            return Err(anyhow!("unrecognised argument: {}", arg));
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("Error: {}", err);
            print_usage();
            process::exit(1);
        }
    };

    let cfg = Config::from_env();
    let store = SqliteStore::open(&cfg.sqlite_path)?;
    let mut gate = SessionContext::new(
        store,
        Credentials {
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        },
        &cfg.store_prefix,
    )
    .with_expiry_hours(cfg.session_hours as i64);

    if args.history {
        let history = ExportHistory::load(gate.store(), &history_key(&cfg.store_prefix))?;
        println!("{}", serde_json::to_string_pretty(history.entries())?);
        return Ok(());
    }

    if !gate.check(Utc::now())?.is_valid() {
        eprintln!("No valid session; run `session login` first.");
        process::exit(2);
    }

    let view = cfg
        .view(ViewKind::Exporter)
        .cloned()
        .unwrap_or_else(|| ViewConfig::from_env(ViewKind::Exporter));
    let source = HttpCsvSource::new(&view.url, view.cache_bust, cfg.fetch_timeout())?;
    let body = match source.fetch_text().await {
        Ok(body) => body,
        Err(err) => {
            log(
                Level::Error,
                Domain::Export,
                "fetch_failed",
                obj(&[("view", v_str(view.name())), ("error", v_str(&err.to_string()))]),
            );
            eprintln!("{}", err.user_message());
            process::exit(1);
        }
    };
    let grid = parse_quoted_csv(&body)?;

    let dir = args.out.unwrap_or_else(|| PathBuf::from(&cfg.export_dir));
    let exporter = Exporter {
        prefix: &cfg.store_prefix,
        dir: &dir,
    };
    match exporter.run(&grid, &args.filters, args.format, gate.store_mut(), Utc::now())? {
        Some(receipt) => println!(
            "wrote {} rows ({} bytes) to {}",
            receipt.entry.rows,
            receipt.bytes,
            receipt.path.display()
        ),
        None => println!("nothing to export: no rows match the filters"),
    }
    Ok(())
}
