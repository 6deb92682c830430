//! # Orchestration
//!
//! Drives a restore request through its stages.
//!
//! ## Core Components
//!
//! - **RestoreEngine**: reconciliation entry point; walks the resolved lineage
//!   stage by stage and records the outcome on the request
//! - **RestoreManager**: turns a backup set into concrete tasks and claims
//! - **ExecutionCoordinator**: idempotent task submission, status folding and
//!   barrier release
//! - **status**: progress recomputed from recorded status actions

pub mod coordinator;
pub mod engine;
pub mod restore_manager;
pub mod status;

pub use coordinator::{recalculate, ExecutionCoordinator};
pub use engine::{select_targets, ReconcileOutcome, RestoreEngine};
pub use restore_manager::{add_workload_managing_labels, template_claims, RestoreManager};
pub use status::{analyze_restore_actions, prepare_data_action_count, task_completed, task_handle, task_name_from_handle};
