//! # Control Plane Boundary
//!
//! Everything the restore engine reads or mutates lives behind the
//! [`ControlPlane`] trait: backups, action definitions, backup repositories,
//! execution tasks and their pods, volume claims, volume snapshots and the
//! restore request itself.
//!
//! Lookups of a single record return [`RestoreError::NotFound`] when the
//! record is absent and creates return [`RestoreError::AlreadyExists`], so
//! callers decide per call site whether absence is fatal, expected or
//! ignorable. Every method may also fail transiently.
//!
//! [`MemoryControlPlane`] is a complete in-memory implementation used by the
//! planner binary and the test suite.
//!
//! [`RestoreError::NotFound`]: crate::error::RestoreError::NotFound
//! [`RestoreError::AlreadyExists`]: crate::error::RestoreError::AlreadyExists

pub mod clock;
pub mod memory;

pub use clock::{Clock, FixedClock, SystemClock};
pub use memory::MemoryControlPlane;

use crate::error::Result;
use crate::models::{
    ActionDefinition, Backup, BackupRepo, LabelSelector, Pod, RestoreRequest, RestoreStatus, Task,
    VolumeClaim,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Backup>;

    /// Backups in `namespace` carrying every label in `labels`
    async fn list_backups(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Backup>>;

    /// Action definitions are cluster-scoped
    async fn get_action_definition(&self, name: &str) -> Result<ActionDefinition>;

    /// Backup repositories are cluster-scoped
    async fn get_backup_repo(&self, name: &str) -> Result<BackupRepo>;

    async fn get_task(&self, namespace: &str, name: &str) -> Result<Task>;

    async fn create_task(&self, task: &Task) -> Result<()>;

    async fn delete_task(&self, namespace: &str, name: &str) -> Result<()>;

    /// Pods spawned by the named task
    async fn list_task_pods(&self, namespace: &str, task_name: &str) -> Result<Vec<Pod>>;

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Pod>>;

    /// Merge `annotations` into the pod's annotations
    async fn patch_pod_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn get_volume_claim(&self, namespace: &str, name: &str) -> Result<VolumeClaim>;

    async fn create_volume_claim(&self, claim: &VolumeClaim) -> Result<()>;

    async fn volume_snapshot_exists(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<RestoreRequest>;

    /// Replace the restore request's status, leaving spec and metadata untouched
    async fn patch_restore_status(&self, namespace: &str, name: &str, status: &RestoreStatus) -> Result<()>;
}
