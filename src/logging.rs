//! Structured JSON-lines logging for the poll pipeline.
//!
//! Every record carries a run id, a sequence number, level, domain and event
//! name. Records go to stdout; when `LOG_DIR` is set they are also appended to
//! `events.jsonl` / `trace.jsonl` under `<LOG_DIR>/<run_id>/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Feed,      // Fetches, poll scheduling
    Grid,      // CSV parsing
    Classify,  // Column sniffing
    Aggregate, // Team overview, tiers
    Change,    // Row diffing, highlights
    Session,   // Login, expiry
    Export,    // File exports, history
    System,    // Startup, shutdown
    Profile,   // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Feed => "feed",
            Domain::Grid => "grid",
            Domain::Classify => "classify",
            Domain::Aggregate => "aggregate",
            Domain::Change => "change",
            Domain::Session => "session",
            Domain::Export => "export",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    sinks: Option<Sinks>,
}

#[derive(Debug)]
struct Sinks {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let sinks = std::env::var("LOG_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .and_then(|base| open_sinks(PathBuf::from(base).join(&run_id)));
        RunContext { run_id, sinks }
    })
}

fn open_sinks(run_dir: PathBuf) -> Option<Sinks> {
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return None;
    }
    let open = |name: &str| match File::create(run_dir.join(name)) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", name, err);
            None
        }
    };
    Some(Sinks {
        events: open("events.jsonl")?,
        trace: open("trace.jsonl")?,
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["password", "Password", "authorization", "Authorization"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["view", "url", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let line = render_record(level, domain.as_str(), event, fields);
    let ctx = ensure_run_context();
    if let Some(sinks) = &ctx.sinks {
        match level {
            Level::Trace | Level::Debug => write_line(&sinks.trace, &line),
            _ => write_line(&sinks.events, &line),
        }
    }
    println!("{}", line);
}

fn render_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> String {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_fetch(view: &str, url: &str, bytes: usize, rows: usize, sha256: &str) {
    log(
        Level::Info,
        Domain::Feed,
        "fetch_ok",
        obj(&[
            ("view", v_str(view)),
            ("url", v_str(url)),
            ("bytes", json!(bytes)),
            ("rows", json!(rows)),
            ("sha256", v_str(sha256)),
        ]),
    );
}

pub fn log_fetch_failed(view: &str, error: &str) {
    log(
        Level::Warn,
        Domain::Feed,
        "fetch_failed",
        obj(&[("view", v_str(view)), ("msg", v_str(error))]),
    );
}

pub fn log_poll_skipped(view: &str, reason: &str) {
    log(
        Level::Debug,
        Domain::Feed,
        "poll_skipped",
        obj(&[("view", v_str(view)), ("reason", v_str(reason))]),
    );
}

pub fn log_columns(view: &str, columns: &crate::classify::ColumnMap) {
    let idx = |c: Option<usize>| c.map(|i| json!(i)).unwrap_or(json!(-1));
    log(
        Level::Debug,
        Domain::Classify,
        "columns",
        obj(&[
            ("view", v_str(view)),
            ("total_leads", idx(columns.total_leads)),
            ("pending", idx(columns.pending)),
            ("closed", idx(columns.closed)),
            ("amount", idx(columns.amount)),
        ]),
    );
}

pub fn log_overview(view: &str, agg: &crate::aggregate::TeamAggregate) {
    log(
        Level::Info,
        Domain::Aggregate,
        "team_overview",
        obj(&[
            ("view", v_str(view)),
            ("team_members", json!(agg.team_member_count)),
            ("avg_performance", v_num(agg.average_performance)),
            ("total_leads", json!(agg.total_leads)),
            ("closed_leads", json!(agg.closed_leads)),
            ("pending_leads", json!(agg.pending_leads)),
            ("success_rate", json!(agg.success_rate_percent)),
            ("total_amount", json!(agg.total_amount)),
            ("leads_estimated", json!(agg.leads_estimated)),
            ("amount_estimated", json!(agg.amount_estimated)),
        ]),
    );
}

pub fn log_changes(view: &str, indices: &[usize]) {
    log(
        Level::Info,
        Domain::Change,
        "rows_updated",
        obj(&[
            ("view", v_str(view)),
            ("count", json!(indices.len())),
            ("indices", json!(indices)),
        ]),
    );
}

pub fn log_session(event: &str, user: Option<&str>, detail: &[(&str, Value)]) {
    let mut fields = obj(detail);
    fields.insert(
        "user".to_string(),
        user.map(v_str).unwrap_or(Value::Null),
    );
    log(Level::Info, Domain::Session, event, fields);
}

pub fn log_export(format: &str, rows: usize, bytes: usize, file: &str) {
    log(
        Level::Info,
        Domain::Export,
        "export_written",
        obj(&[
            ("format", v_str(format)),
            ("rows", json!(rows)),
            ("bytes", json!(bytes)),
            ("file", v_str(file)),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed wall time for a labelled block when dropped.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}
