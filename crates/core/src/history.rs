use crate::domain::{Document, Snapshot, TradeDate};
use chrono::{DateTime, Duration, FixedOffset, Timelike};
use std::num::NonZeroUsize;

pub const DEFAULT_RETENTION_WINDOW: usize = 30;

/// Maximum number of snapshots kept in the history (always >= 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow(NonZeroUsize);

impl RetentionWindow {
    pub fn new(n: usize) -> anyhow::Result<Self> {
        NonZeroUsize::new(n)
            .map(Self)
            .ok_or_else(|| anyhow::anyhow!("retention window must be >= 1 (got {n})"))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self(NonZeroUsize::new(DEFAULT_RETENTION_WINDOW).unwrap_or(NonZeroUsize::MIN))
    }
}

/// Whatever could be salvaged from the previously persisted document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorState {
    pub history: Vec<Snapshot>,
    pub update_time: Option<DateTime<FixedOffset>>,
}

impl PriorState {
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl From<&Document> for PriorState {
    fn from(doc: &Document) -> Self {
        Self {
            history: doc.history.clone(),
            update_time: Some(doc.update_time),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub document: Document,
    /// True when an entry with the same date was replaced (same-day re-run).
    pub replaced: bool,
    /// Dates pushed out of the retention window by this merge.
    pub dropped: Vec<TradeDate>,
}

/// Merges `snapshot` into the prior history and builds the next document.
///
/// Neither input is modified. The result holds at most `window` entries, newest first,
/// with unique dates; an existing entry for `snapshot.date` is replaced.
pub fn merge(
    prior: Option<&PriorState>,
    snapshot: &Snapshot,
    window: RetentionWindow,
    run_time: DateTime<FixedOffset>,
) -> MergeOutcome {
    let mut history = prior
        .map(|p| normalize_history(p.history.clone()))
        .unwrap_or_default();

    let before = history.len();
    history.retain(|s| s.date != snapshot.date);
    let replaced = history.len() != before;

    // A run normally produces the newest date, which lands at index 0. A back-filled
    // older date is slotted into place so the ordering still holds.
    let pos = history.partition_point(|s| s.date > snapshot.date);
    if pos != 0 {
        tracing::warn!(
            date = %snapshot.date,
            newest = %history[0].date,
            "snapshot is older than the newest history entry"
        );
    }
    history.insert(pos, snapshot.clone());

    let dropped = if history.len() > window.get() {
        history
            .split_off(window.get())
            .into_iter()
            .map(|s| s.date)
            .collect()
    } else {
        Vec::new()
    };

    let update_time = next_update_time(run_time, prior.and_then(|p| p.update_time));

    let head = &history[0];
    let document = Document {
        date: head.date,
        items: head.items.clone(),
        update_time,
        history,
        meta: None,
    };

    MergeOutcome {
        document,
        replaced,
        dropped,
    }
}

/// Sorts newest-first and keeps the first occurrence of each date.
pub fn normalize_history(mut history: Vec<Snapshot>) -> Vec<Snapshot> {
    history.sort_by(|a, b| b.date.cmp(&a.date));
    history.dedup_by_key(|s| s.date);
    history
}

/// Second-precision run timestamp.
///
/// A re-run within the same second as `previous` is bumped by one second so the value
/// still advances. A `previous` later than the run clock is not trusted.
fn next_update_time(
    run_time: DateTime<FixedOffset>,
    previous: Option<DateTime<FixedOffset>>,
) -> DateTime<FixedOffset> {
    let now = run_time.with_nanosecond(0).unwrap_or(run_time);
    let Some(prev) = previous else {
        return now;
    };
    let prev = prev.with_nanosecond(0).unwrap_or(prev);

    if prev == now {
        return (prev + Duration::seconds(1)).with_timezone(run_time.offset());
    }
    if prev > now {
        tracing::warn!(
            previous = %prev.to_rfc3339(),
            run_time = %now.to_rfc3339(),
            "previous update_time is ahead of the run clock; using the run clock"
        );
    }
    now
}
