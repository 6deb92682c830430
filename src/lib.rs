#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Restore Core
//!
//! Orchestration engine that restores data from a chain of backups into new
//! or existing volumes and, once the restored workload is running, executes
//! follow-up actions against it.
//!
//! ## Overview
//!
//! Given a restore request naming a target backup (and optionally a point in
//! time), the engine:
//!
//! - resolves the ordered lineage of backups that must be applied (full,
//!   incremental chains, differential, continuous logs for PITR);
//! - classifies each backup into the prepare-data and post-ready stages;
//! - builds the execution tasks for each stage with the environment, volumes
//!   and placement the restore tooling expects;
//! - submits them idempotently, Serial or Parallel, and folds their progress
//!   back into the request status.
//!
//! The engine keeps no state between calls. Every [`RestoreEngine::reconcile`]
//! pass re-derives progress from the status actions recorded on the request.
//!
//! ## Module Organization
//!
//! - [`models`] - Typed control-plane records
//! - [`lineage`] - Backup lineage resolution and stage classification
//! - [`builder`] - Task templates, naming, env and volume assembly
//! - [`orchestration`] - Task submission, monitoring and the engine entry point
//! - [`state_machine`] - Status action lifecycle
//! - [`control_plane`] - Control-plane abstraction and the in-memory implementation
//! - [`events`] - User-visible notices
//! - [`config`] - Engine configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restore_core::config::RestoreEngineConfig;
//! use restore_core::control_plane::{MemoryControlPlane, SystemClock};
//! use restore_core::events::EventPublisher;
//! use restore_core::RestoreEngine;
//! use std::sync::Arc;
//!
//! # async fn example() -> restore_core::Result<()> {
//! restore_core::logging::init_structured_logging();
//! let engine = RestoreEngine::new(
//!     Arc::new(MemoryControlPlane::new()),
//!     Arc::new(EventPublisher::default()),
//!     Arc::new(SystemClock),
//!     RestoreEngineConfig::default(),
//! );
//! let outcome = engine.reconcile("default", "restore-mysql", false).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod control_plane;
pub mod error;
pub mod events;
pub mod lineage;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;

pub use config::{ConfigManager, RestoreEngineConfig};
pub use control_plane::{Clock, ControlPlane, MemoryControlPlane, SystemClock};
pub use error::{RestoreError, Result};
pub use events::{EventPublisher, EventRecorder};
pub use lineage::{BackupActionSet, BackupLineageResolver, ResolvedLineage};
pub use orchestration::{ExecutionCoordinator, ReconcileOutcome, RestoreEngine, RestoreManager};
