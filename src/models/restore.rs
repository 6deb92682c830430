//! # Restore Requests
//!
//! The restore request is the only record the engine writes status onto.
//! Its spec names the target backup, an optional point-in-time, how volumes
//! are prepared before the workload starts, and what runs once it is ready.
//! Its status carries one [`StatusAction`] per submitted task, grouped by
//! [`RestoreStage`].

use super::meta::{EnvVar, LabelSelector, ObjectMeta, ObjectRef};
use super::pod::Toleration;
use super::volume::{ClaimSpec, VolumeMount};
use super::backup::PodSelector;
use crate::state_machine::StatusActionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreRequest {
    pub metadata: ObjectMeta,
    pub spec: RestoreSpec,
    pub status: RestoreStatus,
}

impl RestoreRequest {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    /// Subject of notices about this request
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new("Restore", self.namespace(), self.name())
    }

    /// Parsed `spec.restoreTime`; `None` when absent or not RFC 3339
    pub fn restore_time(&self) -> Option<DateTime<Utc>> {
        self.spec
            .restore_time
            .as_deref()
            .filter(|t| !t.is_empty())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn is_serial_policy(&self) -> bool {
        self.spec
            .prepare_data_config
            .as_ref()
            .is_some_and(PrepareDataConfig::is_serial_policy)
    }

    pub fn actions(&self, stage: RestoreStage) -> &[StatusAction] {
        match stage {
            RestoreStage::PrepareData => &self.status.actions.prepare_data,
            RestoreStage::PostReady => &self.status.actions.post_ready,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreSpec {
    pub backup: BackupRef,
    /// RFC 3339 point in time; only meaningful for continuous backups
    pub restore_time: Option<String>,
    pub prepare_data_config: Option<PrepareDataConfig>,
    pub ready_config: Option<ReadyConfig>,
    pub env: Vec<EnvVar>,
    pub parameters: Vec<ParameterPair>,
    pub container_resources: Option<serde_json::Value>,
    pub backoff_limit: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupRef {
    pub name: String,
    pub namespace: String,
    /// Which of the backup's targets to restore when it recorded several
    pub source_target_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterPair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionPolicy {
    /// One task at a time; the previous task is deleted before the next is created
    Serial,
    #[default]
    Parallel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrepareDataConfig {
    pub scheduling_spec: SchedulingSpec,
    pub volume_claim_restore_policy: ExecutionPolicy,
    pub restore_volume_claims: Vec<RestoreVolumeClaim>,
    pub restore_volume_claims_template: Option<RestoreVolumeClaimsTemplate>,
    pub required_policy_for_all_pod_selection: Option<RequiredPolicyForAllPodSelection>,
    /// Volume populated in place through a populate task
    pub data_source_ref: Option<VolumeConfig>,
}

impl PrepareDataConfig {
    pub fn is_serial_policy(&self) -> bool {
        self.volume_claim_restore_policy == ExecutionPolicy::Serial
    }
}

/// Scheduling constraints copied verbatim onto prepare-data tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulingSpec {
    pub tolerations: Vec<Toleration>,
    pub node_selector: BTreeMap<String, String>,
    pub node_name: Option<String>,
    pub scheduler_name: Option<String>,
    pub affinity: Option<serde_json::Value>,
    pub topology_spread_constraints: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeConfig {
    /// Volume name recorded in the backup's target volumes
    pub volume_source: Option<String>,
    pub mount_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreVolumeClaim {
    pub metadata: ObjectMeta,
    pub volume_claim_spec: ClaimSpec,
    #[serde(flatten)]
    pub volume_config: VolumeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreVolumeClaimsTemplate {
    pub templates: Vec<RestoreVolumeClaim>,
    pub replicas: u32,
    pub starting_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataRestorePolicy {
    /// Index `i` restores from the backup of the `i`-th selected source pod
    #[default]
    OneToOne,
    /// Every index restores from one configured source pod
    OneToMany,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceOfOneToMany {
    pub target_pod_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequiredPolicyForAllPodSelection {
    pub data_restore_policy: DataRestorePolicy,
    pub source_of_one_to_many: Option<SourceOfOneToMany>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadyConfig {
    pub job_action: Option<JobAction>,
    pub exec_action: Option<ExecAction>,
    pub connection_credential: Option<ConnectionCredential>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobAction {
    pub target: JobActionTarget,
    pub required_policy_for_all_pod_selection: Option<RequiredPolicyForAllPodSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobActionTarget {
    pub pod_selector: PodSelector,
    /// Target-pod volumes to mount when the action runs on the target's node
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecAction {
    pub target: ExecActionTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecActionTarget {
    pub pod_selector: LabelSelector,
}

/// Secret keys holding the workload's connection details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionCredential {
    pub secret_name: String,
    pub username_key: Option<String>,
    pub password_key: Option<String>,
    pub host_key: Option<String>,
    pub port_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RestorePhase {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RestorePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreStatus {
    pub phase: RestorePhase,
    pub message: Option<String>,
    pub actions: RestoreStatusActions,
    pub completion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreStatusActions {
    pub prepare_data: Vec<StatusAction>,
    pub post_ready: Vec<StatusAction>,
}

impl RestoreStatusActions {
    pub fn stage_mut(&mut self, stage: RestoreStage) -> &mut Vec<StatusAction> {
        match stage {
            RestoreStage::PrepareData => &mut self.prepare_data,
            RestoreStage::PostReady => &mut self.post_ready,
        }
    }
}

/// Observed progress of one task: one entry per (backup, action, index)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusAction {
    /// Stage-scoped action name, e.g. `prepare-data` or `post-ready-0`
    pub name: String,
    pub backup_name: String,
    /// `job/{task name}` for tasks
    pub task_handle: String,
    pub status: StatusActionState,
    pub message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestoreStage {
    /// Populate volumes before the workload starts
    PrepareData,
    /// Run once the workload is healthy
    PostReady,
}

impl RestoreStage {
    /// Lowercase form embedded in task names
    pub fn name_segment(&self) -> &'static str {
        match self {
            Self::PrepareData => "preparedata",
            Self::PostReady => "postready",
        }
    }
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrepareData => write!(f, "prepareData"),
            Self::PostReady => write!(f, "postReady"),
        }
    }
}
