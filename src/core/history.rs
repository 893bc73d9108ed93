//! Stage history queries

use chrono::{DateTime, Utc};

use crate::core::context::Snapshot;
use crate::entities::{StageHistoryEntry, Subject};

/// Days in a stage from which a subject is flagged as overdue
pub const OVERDUE_DAYS: i64 = 30;

/// Most recent history entry for the subject at their current stage
pub fn latest_entry<'a>(snapshot: &'a Snapshot, subject: &Subject) -> Option<&'a StageHistoryEntry> {
    let stage_id = snapshot
        .current_stage_record(subject)
        .map(|s| s.id.as_str())
        .or(subject.stage_id.as_deref())?;

    snapshot
        .history()
        .iter()
        .filter(|h| h.subject_id == subject.id && h.stage_id == stage_id)
        .filter(|h| h.date.is_some())
        .max_by_key(|h| h.date)
}

/// Whole days since the subject entered their current stage
///
/// `None` when no dated history entry exists for that stage.
pub fn days_in_stage(snapshot: &Snapshot, subject: &Subject, now: DateTime<Utc>) -> Option<i64> {
    let entered = latest_entry(snapshot, subject)?.date?;
    Some((now - entered).num_days().max(0))
}

pub fn is_overdue(days: Option<i64>) -> bool {
    days.is_some_and(|d| d >= OVERDUE_DAYS)
}
