//! Per-view derivation from a freshly parsed grid.
//!
//! Each poll rebuilds the whole snapshot; the only thing carried from one
//! poll to the next is the previous data rows kept by the change detector.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::aggregate::{EstimationPolicy, Roster, TeamOverview};
use crate::change::{ChangeDetector, ChangeSet};
use crate::config::ViewKind;
use crate::grid::RawGrid;
use crate::logging::{log_changes, log_columns, log_overview};

#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub kind: ViewKind,
    pub fetched_at: DateTime<Utc>,
    pub fingerprint: String,
    pub grid: RawGrid,
    pub row_count: usize,
    /// Dashboard only.
    pub overview: Option<TeamOverview>,
    /// Rows new or changed since the previous poll.
    pub changes: ChangeSet,
}

pub struct ViewProcessor {
    kind: ViewKind,
    roster: Arc<Roster>,
    policy: EstimationPolicy,
    detector: ChangeDetector,
}

impl ViewProcessor {
    pub fn new(kind: ViewKind, roster: Arc<Roster>, policy: EstimationPolicy) -> Self {
        Self {
            kind,
            roster,
            policy,
            detector: ChangeDetector::new(),
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn process(
        &mut self,
        grid: RawGrid,
        fingerprint: String,
        now: DateTime<Utc>,
    ) -> ViewSnapshot {
        let view = self.kind.as_str();

        let overview = match self.kind {
            ViewKind::Dashboard => {
                let overview = TeamOverview::compute(&grid, &self.roster, &self.policy);
                log_columns(view, &overview.columns);
                log_overview(view, &overview.aggregate);
                Some(overview)
            }
            _ => None,
        };

        let changes = match self.kind {
            ViewKind::Report => {
                let changes = self.detector.observe(grid.rows());
                if !changes.is_empty() {
                    log_changes(view, &changes.to_vec());
                }
                changes
            }
            _ => ChangeSet::default(),
        };

        ViewSnapshot {
            kind: self.kind,
            fetched_at: now,
            fingerprint,
            row_count: grid.len(),
            grid,
            overview,
            changes,
        }
    }
}
