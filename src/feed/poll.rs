//! Timer-driven polling with a single in-flight slot.
//!
//! Ticks and manual refreshes both call [`PollController::poll_once`]. A call
//! made while a fetch is outstanding is dropped (no queue, no cancellation).
//! Teardown stops the timer and marks the controller inactive; a fetch that
//! resolves afterwards is discarded instead of committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::aggregate::{EstimationPolicy, Roster};
use crate::change::HighlightBoard;
use crate::config::{ViewConfig, ViewKind};
use crate::error::SheetError;
use crate::feed::source::{fingerprint, CsvSource};
use crate::grid::{parse_csv, parse_quoted_csv, RawGrid};
use crate::logging::{
    log, log_fetch, log_fetch_failed, log_poll_skipped, obj, v_str, Domain, Level, ProfileScope,
};
use crate::view::{ViewProcessor, ViewSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Committed { rows: usize, changed: usize },
    /// Another fetch was still in flight.
    Skipped,
    /// Fetch or parse failed; previous snapshot kept.
    Failed(String),
    /// Controller was torn down while the fetch was outstanding.
    Discarded,
    /// Controller already torn down; nothing fetched.
    Inactive,
}

/// What a renderer needs besides the snapshot itself.
#[derive(Debug, Clone, Default)]
pub struct ViewStatus {
    pub loading: bool,
    pub refreshing: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub refresh_count: u64,
}

struct ViewState {
    processor: ViewProcessor,
    snapshot: Option<Arc<ViewSnapshot>>,
    status: ViewStatus,
}

pub struct PollController<S: CsvSource> {
    config: ViewConfig,
    source: S,
    refreshing: AtomicBool,
    active: AtomicBool,
    auto_refresh: AtomicBool,
    state: Mutex<ViewState>,
    highlights: HighlightBoard,
    published: watch::Sender<Option<Arc<ViewSnapshot>>>,
}

/// Clears the in-flight flag however the fetch ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: CsvSource> PollController<S> {
    pub fn new(
        config: ViewConfig,
        source: S,
        roster: Arc<Roster>,
        policy: EstimationPolicy,
        highlights: HighlightBoard,
    ) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            state: Mutex::new(ViewState {
                processor: ViewProcessor::new(config.kind, roster, policy),
                snapshot: None,
                status: ViewStatus {
                    loading: true,
                    ..ViewStatus::default()
                },
            }),
            config,
            source,
            refreshing: AtomicBool::new(false),
            active: AtomicBool::new(true),
            auto_refresh: AtomicBool::new(true),
            highlights,
            published,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Timer ticks are ignored while off; manual refresh still works.
    pub fn set_auto_refresh(&self, on: bool) {
        self.auto_refresh.store(on, Ordering::SeqCst);
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<Arc<ViewSnapshot>> {
        self.state.lock().ok().and_then(|s| s.snapshot.clone())
    }

    pub fn status(&self) -> ViewStatus {
        let mut status = self
            .state
            .lock()
            .map(|s| s.status.clone())
            .unwrap_or_default();
        status.refreshing = self.refreshing.load(Ordering::SeqCst);
        status
    }

    pub fn highlights(&self) -> &HighlightBoard {
        &self.highlights
    }

    /// Receives every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ViewSnapshot>>> {
        self.published.subscribe()
    }

    /// One fetch-parse-derive cycle.
    pub async fn poll_once(&self) -> PollOutcome {
        let view = self.config.name();
        if !self.is_active() {
            return PollOutcome::Inactive;
        }
        if self.refreshing.swap(true, Ordering::SeqCst) {
            log_poll_skipped(view, "fetch in flight");
            return PollOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.refreshing);
        let _profile = ProfileScope::with_context("poll", &[("view", v_str(view))]);

        let fetched = self.source.fetch_text().await;

        if !self.is_active() {
            log_poll_skipped(view, "view torn down before fetch resolved");
            return PollOutcome::Discarded;
        }

        let parsed = fetched.and_then(|body| {
            self.parse_body(&body)
                .map(|grid| (fingerprint(&body), body.len(), grid))
        });
        match parsed {
            Ok((digest, bytes, grid)) => {
                log_fetch(view, &self.source.describe(), bytes, grid.len(), &digest);
                let snapshot = match self.commit(grid, digest) {
                    Ok(snapshot) => snapshot,
                    Err(msg) => return PollOutcome::Failed(msg),
                };
                let outcome = PollOutcome::Committed {
                    rows: snapshot.row_count,
                    changed: snapshot.changes.len(),
                };
                self.highlights.flag(snapshot.changes.clone());
                self.published.send_replace(Some(snapshot));
                outcome
            }
            Err(err) => self.record_failure(err),
        }
    }

    /// The report reads with the plain comma split; every other view keeps
    /// quoted fields intact.
    fn parse_body(&self, body: &str) -> Result<RawGrid, SheetError> {
        match self.config.kind {
            ViewKind::Report => parse_csv(body),
            _ => parse_quoted_csv(body),
        }
    }

    fn commit(&self, grid: RawGrid, digest: String) -> Result<Arc<ViewSnapshot>, String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| "view state lock poisoned".to_string())?;
        let now = Utc::now();
        let snapshot = Arc::new(state.processor.process(grid, digest, now));
        state.snapshot = Some(Arc::clone(&snapshot));
        state.status.loading = false;
        state.status.last_error = None;
        state.status.last_updated = Some(now);
        state.status.refresh_count += 1;
        Ok(snapshot)
    }

    fn record_failure(&self, err: SheetError) -> PollOutcome {
        let view = self.config.name();
        log_fetch_failed(view, &err.to_string());
        let message = err.user_message();
        if let Ok(mut state) = self.state.lock() {
            state.status.loading = false;
            state.status.last_error = Some(message.clone());
        }
        PollOutcome::Failed(message)
    }
}

/// Running poller for one view.
pub struct PollHandle<S: CsvSource + 'static> {
    controller: Arc<PollController<S>>,
    timer: Option<JoinHandle<()>>,
}

impl<S: CsvSource + 'static> PollHandle<S> {
    /// Fetch immediately, then on every interval tick if the view has one.
    pub fn start(controller: Arc<PollController<S>>) -> Self {
        let view = controller.config().name();
        log(
            Level::Info,
            Domain::Feed,
            "poller_started",
            obj(&[
                ("view", v_str(view)),
                ("url", v_str(&controller.config().url)),
                (
                    "interval_ms",
                    json!(controller.config().interval.map(|d| d.as_millis() as u64)),
                ),
            ]),
        );

        let first = Arc::clone(&controller);
        tokio::spawn(async move {
            first.poll_once().await;
        });

        let timer = controller.config().interval.map(|period| {
            let ticking = Arc::clone(&controller);
            tokio::spawn(async move {
                let mut ticks = interval_at(Instant::now() + period, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    if !ticking.auto_refresh() {
                        continue;
                    }
                    // fire and forget, like a browser interval callback
                    let c = Arc::clone(&ticking);
                    tokio::spawn(async move {
                        c.poll_once().await;
                    });
                }
            })
        });

        Self { controller, timer }
    }

    pub fn controller(&self) -> &Arc<PollController<S>> {
        &self.controller
    }

    /// Manual refresh; subject to the same in-flight guard as timer ticks.
    pub fn refresh(&self) -> JoinHandle<PollOutcome> {
        let c = Arc::clone(&self.controller);
        tokio::spawn(async move { c.poll_once().await })
    }

    /// Stop the timer and refuse to commit anything still in flight.
    pub fn stop(mut self) {
        self.controller.deactivate();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        log(
            Level::Info,
            Domain::Feed,
            "poller_stopped",
            obj(&[("view", v_str(self.controller.config().name()))]),
        );
    }
}

impl<S: CsvSource + 'static> Drop for PollHandle<S> {
    fn drop(&mut self) {
        self.controller.deactivate();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
