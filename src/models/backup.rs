//! Backup records as produced by the (external) backup controller.

use super::meta::{EnvVar, LabelSelector, ObjectMeta};
use super::volume::VolumeMount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a backup relates to the data it captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackupType {
    /// Self-contained snapshot of the data
    #[default]
    Full,
    /// Changes since the parent backup; requires the whole chain down to a full backup
    Incremental,
    /// Changes since a parent full backup
    Differential,
    /// Log stream enabling point-in-time restore on top of a base backup
    Continuous,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::Incremental => write!(f, "Incremental"),
            Self::Differential => write!(f, "Differential"),
            Self::Continuous => write!(f, "Continuous"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackupPhase {
    #[default]
    New,
    Running,
    Completed,
    Failed,
    Deleting,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Backup {
    pub metadata: ObjectMeta,
    pub spec: BackupSpec,
    pub status: BackupStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSpec {
    pub backup_policy_name: String,
    pub backup_method: String,
    /// Parent requested at creation time (differential backups)
    pub parent_backup_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupStatus {
    pub phase: BackupPhase,
    /// Parent resolved by the backup controller (incremental backups)
    pub parent_backup_name: Option<String>,
    pub path: Option<String>,
    pub backup_repo_name: Option<String>,
    /// Legacy claim holding backup data when no repository is recorded
    pub persistent_volume_claim_name: Option<String>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub completion_timestamp: Option<DateTime<Utc>>,
    pub time_range: Option<BackupTimeRange>,
    pub backup_method: Option<BackupMethod>,
    pub extras: Vec<BTreeMap<String, String>>,
    pub volume_snapshots: Vec<VolumeSnapshotRecord>,
    pub target: Option<BackupStatusTarget>,
    pub targets: Vec<BackupStatusTarget>,
}

/// Time window covered by the backup's data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupTimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Offset such as `+08:00` or `UTC+08:00`; empty means UTC
    pub time_zone: Option<String>,
}

/// Method descriptor recorded by the backup controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupMethod {
    pub name: String,
    pub action_set_name: String,
    pub snapshot_volumes: Option<bool>,
    pub target_volumes: Option<TargetVolumeInfo>,
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetVolumeInfo {
    pub volumes: Vec<String>,
    pub volume_mounts: Vec<VolumeMount>,
}

/// Volume snapshots taken from one source pod, keyed by volume source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeSnapshotRecord {
    pub target_pod_name: String,
    pub snapshots: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PodSelectionStrategy {
    /// One pod of the target was backed up
    #[default]
    Any,
    /// Every selected pod was backed up separately
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSelector {
    pub strategy: PodSelectionStrategy,
    pub label_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerPortRef {
    pub container_name: String,
    pub port_name: String,
}

/// One backed-up target and the pods it was taken from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupStatusTarget {
    pub name: String,
    pub pod_selector: PodSelector,
    pub selected_target_pods: Vec<String>,
    pub container_port: Option<ContainerPortRef>,
}

impl Backup {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn is_completed(&self) -> bool {
        self.status.phase == BackupPhase::Completed
    }

    /// Parent recorded by the controller, falling back to the requested parent
    pub fn parent_backup_name(&self) -> Option<&str> {
        self.status
            .parent_backup_name
            .as_deref()
            .or(self.spec.parent_backup_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.status
            .time_range
            .as_ref()
            .and_then(|r| r.start)
            .or(self.status.start_timestamp)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.status
            .time_range
            .as_ref()
            .and_then(|r| r.end)
            .or(self.status.completion_timestamp)
    }

    pub fn time_zone(&self) -> Option<&str> {
        self.status
            .time_range
            .as_ref()
            .and_then(|r| r.time_zone.as_deref())
            .filter(|tz| !tz.is_empty())
    }

    pub fn uses_volume_snapshot(&self) -> bool {
        self.status
            .backup_method
            .as_ref()
            .and_then(|m| m.snapshot_volumes)
            .unwrap_or(false)
    }

    /// Mount path recorded for a volume source during backup
    pub fn mount_path_for_volume_source(&self, volume_source: &str) -> Option<&str> {
        self.status
            .backup_method
            .as_ref()
            .and_then(|m| m.target_volumes.as_ref())
            .and_then(|tv| tv.volume_mounts.iter().find(|vm| vm.name == volume_source))
            .map(|vm| vm.mount_path.as_str())
            .filter(|p| !p.is_empty())
    }

    /// All status targets, whichever of the single/multi fields was populated
    pub fn status_targets(&self) -> Vec<&BackupStatusTarget> {
        if !self.status.targets.is_empty() {
            self.status.targets.iter().collect()
        } else {
            self.status.target.iter().collect()
        }
    }

    /// Snapshot names taken from `source_pod`, or from the first record when the
    /// source pod is not known
    pub fn volume_snapshots_for_pod(&self, source_pod: &str) -> Option<&BTreeMap<String, String>> {
        if source_pod.is_empty() {
            return self.status.volume_snapshots.first().map(|r| &r.snapshots);
        }
        self.status
            .volume_snapshots
            .iter()
            .find(|r| r.target_pod_name == source_pod)
            .map(|r| &r.snapshots)
    }
}
