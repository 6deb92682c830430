//! Proptest strategies for restore records.

use proptest::prelude::*;
use restore_core::state_machine::StatusActionState;

/// Backup names as users write them, including characters names must shed
pub fn backup_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9._-]{0,79}"
}

/// Restore request uids
pub fn uid_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

pub fn name_limit_strategy() -> impl Strategy<Value = usize> {
    16usize..=80
}

pub fn action_state_strategy() -> impl Strategy<Value = StatusActionState> {
    prop_oneof![
        Just(StatusActionState::Processing),
        Just(StatusActionState::Completed),
        Just(StatusActionState::Failed),
    ]
}

/// `(chain length, index the oldest backup points back to)`
pub fn cyclic_chain_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..8).prop_flat_map(|len| (Just(len), 0..len))
}
