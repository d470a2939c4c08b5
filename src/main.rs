use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};

use sheetpulse::aggregate::{EstimationPolicy, Roster};
use sheetpulse::change::HighlightBoard;
use sheetpulse::config::Config;
use sheetpulse::feed::{HttpCsvSource, PollController, PollHandle};
use sheetpulse::logging::{log, obj, v_num, v_str, Domain, Level};
use sheetpulse::session::{self, Credentials, SessionContext, SessionStatus};
use sheetpulse::storage::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("config", serde_json::to_value(&cfg)?)]),
    );

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

    if !gate.check(Utc::now())?.is_valid() {
        log(
            Level::Warn,
            Domain::Session,
            "login_required",
            obj(&[("msg", v_str("no valid session; run `session login` first"))]),
        );
        return Ok(());
    }

    let roster = Arc::new(Roster::new(cfg.roster.iter()));
    let mut handles = Vec::with_capacity(cfg.views.len());
    for view in &cfg.views {
        let source = match HttpCsvSource::new(&view.url, view.cache_bust, cfg.fetch_timeout()) {
            Ok(source) => source,
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Feed,
                    "view_disabled",
                    obj(&[("view", v_str(view.name())), ("error", v_str(&err.to_string()))]),
                );
                continue;
            }
        };
        let controller = Arc::new(PollController::new(
            view.clone(),
            source,
            Arc::clone(&roster),
            EstimationPolicy::default(),
            HighlightBoard::new(cfg.highlight_window()),
        ));
        handles.push(PollHandle::start(controller));
    }
    log(
        Level::Info,
        Domain::System,
        "views_started",
        obj(&[("count", v_num(handles.len() as f64))]),
    );

    let mut session_ticks = interval(session::CHECK_INTERVAL);
    session_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let reason = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break "interrupted",
            _ = session_ticks.tick() => {
                if let SessionStatus::Expired | SessionStatus::Missing = gate.check(Utc::now())? {
                    break "session_ended";
                }
            }
        }
    };

    for handle in &handles {
        let status = handle.controller().status();
        log(
            Level::Info,
            Domain::System,
            "view_final",
            obj(&[
                ("view", v_str(handle.controller().config().name())),
                ("refresh_count", json!(status.refresh_count)),
                ("last_error", json!(status.last_error)),
            ]),
        );
    }
    for handle in handles {
        handle.stop();
    }
    log(Level::Info, Domain::System, "shutdown", obj(&[("reason", v_str(reason))]));
    Ok(())
}
