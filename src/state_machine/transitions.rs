//! Status action upserts.
//!
//! Observations are keyed by `(name, backup_name, task_handle)` so every task
//! index owns exactly one entry. The last observation wins unless the entry
//! already reached a terminal state.

use super::states::StatusActionState;
use crate::models::StatusAction;
use chrono::{DateTime, Utc};
use tracing::debug;

/// What an upsert did to the recorded actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same state observed again, or a terminal entry was re-observed
    Unchanged,
}

fn same_key(a: &StatusAction, b: &StatusAction) -> bool {
    a.name == b.name && a.backup_name == b.backup_name && a.task_handle == b.task_handle
}

/// Record an observed status action.
///
/// `start_time` is stamped on insert and `end_time` when the entry first
/// reaches a terminal state.
pub fn upsert_status_action(
    actions: &mut Vec<StatusAction>,
    mut observed: StatusAction,
    now: DateTime<Utc>,
) -> UpsertOutcome {
    let Some(existing) = actions.iter_mut().find(|a| same_key(a, &observed)) else {
        observed.start_time.get_or_insert(now);
        if observed.status.is_terminal() {
            observed.end_time.get_or_insert(now);
        }
        actions.push(observed);
        return UpsertOutcome::Inserted;
    };

    if existing.status == observed.status || !existing.status.can_transition_to(observed.status) {
        if existing.status != observed.status {
            debug!(
                action = %existing.name,
                backup = %existing.backup_name,
                recorded = %existing.status,
                observed = %observed.status,
                "Ignoring observation of a terminal status action"
            );
        }
        return UpsertOutcome::Unchanged;
    }

    existing.status = observed.status;
    existing.message = observed.message;
    if observed.status.is_terminal() {
        existing.end_time = Some(now);
    }
    UpsertOutcome::Updated
}

/// Count recorded actions of one (backup, action) pair, optionally filtered by state
pub fn count_actions(
    actions: &[StatusAction],
    backup_name: &str,
    action_name: &str,
    state: Option<StatusActionState>,
) -> usize {
    actions
        .iter()
        .filter(|a| a.backup_name == backup_name && a.name == action_name)
        .filter(|a| state.map_or(true, |s| a.status == s))
        .count()
}
