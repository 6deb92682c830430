// State machine for restore status actions
//
// Each submitted task is tracked as a status action that moves from Processing
// to a terminal Completed or Failed state. Re-observing a terminal state is a
// no-op, which keeps repeated reconciliation passes idempotent.

pub mod states;
pub mod transitions;

pub use states::StatusActionState;
pub use transitions::{count_actions, upsert_status_action, UpsertOutcome};
