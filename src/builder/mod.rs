//! # Task Builder
//!
//! Turns a resolved backup set into concrete execution tasks: environment
//! assembly, deterministic naming, claim and repository volumes, the barrier
//! sidecar, and the template/variant split that renders each [`Task`].
//!
//! [`Task`]: crate::models::Task

pub mod barrier;
pub mod env;
pub mod expand;
pub mod naming;
pub mod source_target;
pub mod task_builder;
pub mod volumes;

pub use barrier::barrier_sidecar;
pub use env::{common_env, merge_env, target_pod_env};
pub use naming::{action_name, cut_name, post_ready_task_name, task_name};
pub use source_target::{skip_index, source_pod_name};
pub use task_builder::{restore_labels, TaskTemplate, TaskTemplateBuilder, TaskVariant};
pub use volumes::{backup_repo_attachment, claim_volume, extras_attachment, RepoAttachment};
