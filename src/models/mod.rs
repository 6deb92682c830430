//! # Resource Models
//!
//! Typed views of the control-plane records the restore engine reads and
//! writes: backups, action definitions, restore requests, execution tasks,
//! pods, volume claims and backup repositories.
//!
//! All models derive `Serialize`/`Deserialize` with camelCase field names so
//! they can be loaded from the same YAML manifests the control plane stores.

pub mod action_set;
pub mod backup;
pub mod meta;
pub mod pod;
pub mod restore;
pub mod task;
pub mod volume;

pub use action_set::{ActionDefinition, ActionDefinitionSpec, ActionSpec, ExecActionSpec, JobActionSpec, RestoreActionSpec};
pub use backup::{
    Backup, BackupMethod, BackupPhase, BackupSpec, BackupStatus, BackupStatusTarget, BackupTimeRange,
    BackupType, ContainerPortRef, PodSelectionStrategy, PodSelector, TargetVolumeInfo,
    VolumeSnapshotRecord,
};
pub use meta::{EnvFromSource, EnvVar, EnvVarSource, LabelSelector, ObjectMeta, ObjectRef, OwnerReference};
pub use pod::{Container, ContainerPort, ContainerStatus, ContainerTerminated, Pod, PodPhase, PodSpec, PodStatus, Toleration};
pub use restore::{
    BackupRef, ConnectionCredential, DataRestorePolicy, ExecAction, ExecActionTarget, ExecutionPolicy,
    JobAction, JobActionTarget, ParameterPair, PrepareDataConfig, ReadyConfig, RequiredPolicyForAllPodSelection,
    RestorePhase, RestoreRequest, RestoreSpec, RestoreStage, RestoreStatus, RestoreStatusActions,
    RestoreVolumeClaim, RestoreVolumeClaimsTemplate, SchedulingSpec, SourceOfOneToMany, StatusAction,
    VolumeConfig,
};
pub use task::{Placement, Task, TaskCondition, TaskConditionKind, TaskSpec, TaskStatus};
pub use volume::{
    BackupRepo, BackupRepoSpec, ClaimSpec, DownwardApiItem, TypedObjectReference, Volume, VolumeClaim,
    VolumeMount, VolumeSource,
};
