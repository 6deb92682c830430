//! # Backup Lineage
//!
//! Resolution of a restore target into the ordered backup sets that must be
//! restored ([`BackupLineageResolver`]), and their partition into the
//! prepare-data and post-ready stages ([`classify`]).

pub mod backup_action_set;
pub mod classifier;
pub mod resolver;

pub use backup_action_set::BackupActionSet;
pub use classifier::{classify, ResolvedLineage};
pub use resolver::BackupLineageResolver;
