//! Poll-to-poll change detection and the transient "updated rows" highlight.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::grid::Row;

pub const DEFAULT_HIGHLIGHT: Duration = Duration::from_millis(3000);

/// Data-row indices flagged as new or changed by one poll.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChangeSet {
    indices: BTreeSet<usize>,
}

impl ChangeSet {
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.indices.contains(&idx)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.indices.iter().copied().collect()
    }
}

impl FromIterator<usize> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}

/// Compare index-aligned rows of two polls.
///
/// Growth flags only the appended tail; otherwise each shared index is
/// compared cell for cell. Insertions, deletions and reordering are not
/// recognised. An empty previous poll flags nothing.
pub fn detect_changes(previous: &[Row], current: &[Row]) -> ChangeSet {
    if previous.is_empty() {
        return ChangeSet::default();
    }
    if current.len() > previous.len() {
        return (previous.len()..current.len()).collect();
    }
    previous
        .iter()
        .zip(current)
        .enumerate()
        .filter(|(_, (prev, cur))| prev != cur)
        .map(|(idx, _)| idx)
        .collect()
}

/// Remembers the previous poll's data rows for the next comparison.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Vec<Row>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff against the remembered rows, then remember `current`.
    pub fn observe(&mut self, current: &[Row]) -> ChangeSet {
        let changes = detect_changes(&self.previous, current);
        self.previous = current.to_vec();
        changes
    }

    pub fn previous(&self) -> &[Row] {
        &self.previous
    }
}

/// Currently highlighted rows.
///
/// Every non-empty flag starts its own clear timer and nothing cancels it, so
/// a timer armed by an earlier poll can wipe a later poll's highlight before
/// its full window has elapsed.
#[derive(Debug, Clone)]
pub struct HighlightBoard {
    current: Arc<Mutex<ChangeSet>>,
    window: Duration,
}

impl HighlightBoard {
    pub fn new(window: Duration) -> Self {
        Self {
            current: Arc::new(Mutex::new(ChangeSet::default())),
            window,
        }
    }

    /// Show `changes` and schedule the unconditional clear. Empty sets leave
    /// the board untouched and arm nothing. Must run inside a tokio runtime.
    pub fn flag(&self, changes: ChangeSet) -> Option<JoinHandle<()>> {
        if changes.is_empty() {
            return None;
        }
        if let Ok(mut slot) = self.current.lock() {
            *slot = changes;
        }
        let slot = Arc::clone(&self.current);
        let window = self.window;
        Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Ok(mut slot) = slot.lock() {
                *slot = ChangeSet::default();
            }
        }))
    }

    pub fn snapshot(&self) -> ChangeSet {
        self.current
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for HighlightBoard {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT)
    }
}
