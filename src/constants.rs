//! # System Constants
//!
//! Fixed names shared with the outside world: the environment-variable
//! vocabulary task images depend on, label and annotation keys written onto
//! created objects, container names, and event reasons.

/// Environment variables exposed to restore task containers.
///
/// Task images are built against these exact names; treat them as a
/// versioned contract.
pub mod env {
    pub const DP_BACKUP_NAME: &str = "DP_BACKUP_NAME";
    pub const DP_BASE_BACKUP_NAME: &str = "DP_BASE_BACKUP_NAME";
    pub const DP_ANCESTOR_INCREMENTAL_BACKUP_NAMES: &str = "DP_ANCESTOR_INCREMENTAL_BACKUP_NAMES";

    pub const DP_BACKUP_ROOT_PATH: &str = "DP_BACKUP_ROOT_PATH";
    pub const DP_BACKUP_BASE_PATH: &str = "DP_BACKUP_BASE_PATH";
    pub const DP_TARGET_RELATIVE_PATH: &str = "DP_TARGET_RELATIVE_PATH";

    pub const DP_BACKUP_STOP_TIME: &str = "DP_BACKUP_STOP_TIME";
    pub const DP_BASE_BACKUP_START_TIME: &str = "DP_BASE_BACKUP_START_TIME";
    pub const DP_BASE_BACKUP_START_TIMESTAMP: &str = "DP_BASE_BACKUP_START_TIMESTAMP";
    pub const DP_BASE_BACKUP_STOP_TIME: &str = "DP_BASE_BACKUP_STOP_TIME";
    pub const DP_BASE_BACKUP_STOP_TIMESTAMP: &str = "DP_BASE_BACKUP_STOP_TIMESTAMP";
    pub const DP_RESTORE_TIME: &str = "DP_RESTORE_TIME";
    pub const DP_RESTORE_TIMESTAMP: &str = "DP_RESTORE_TIMESTAMP";

    pub const DP_DB_HOST: &str = "DP_DB_HOST";
    pub const DP_DB_PORT: &str = "DP_DB_PORT";
    pub const DP_DB_USER: &str = "DP_DB_USER";
    pub const DP_DB_PASSWORD: &str = "DP_DB_PASSWORD";

    pub const DP_BACKUP_REPO_NAME: &str = "DP_BACKUP_REPO_NAME";
    /// Storage provider of a repository that exposes no claim, passed through opaquely.
    pub const DP_STORAGE_PROVIDER: &str = "DP_STORAGE_PROVIDER";

    /// Action-definition env entry declaring the strftime layout for time variables.
    pub const TIME_FORMAT: &str = "TIME_FORMAT";
}

/// Label keys written on tasks and claims, and read from backups.
pub mod labels {
    pub const RESTORE_NAME: &str = "restore.dataprotection.io/restore";
    pub const RESTORE_NAMESPACE: &str = "restore.dataprotection.io/restore-namespace";
    pub const POPULATE_CLAIM: &str = "restore.dataprotection.io/populate-claim";
    pub const TASK_NAME: &str = "restore.dataprotection.io/task-name";

    pub const BACKUP_TYPE: &str = "dataprotection.io/backup-type";
    pub const BACKUP_POLICY: &str = "dataprotection.io/backup-policy";
    pub const CLUSTER_UID: &str = "dataprotection.io/cluster-uid";

    pub const APP_INSTANCE: &str = "app.kubernetes.io/instance";
    pub const APP_COMPONENT: &str = "apps.kubeblocks.io/component-name";
    pub const APP_POD_NAME: &str = "apps.kubeblocks.io/pod-name";
    pub const APP_INSTANCE_TEMPLATE: &str = "apps.kubeblocks.io/instance-template";
    pub const WORKLOAD_NAME: &str = "workloads.kubeblocks.io/instance";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const MANAGED_BY_VALUE: &str = "restore-engine";
    /// Manager label value of claims adopted by the workload controller
    pub const WORKLOAD_MANAGED_BY_VALUE: &str = "kubeblocks";

    pub const HOSTNAME: &str = "kubernetes.io/hostname";
}

/// Annotation keys.
pub mod annotations {
    /// Written `"true"` on a task pod to release its barrier sidecar.
    pub const STOP_BARRIER: &str = "restore.dataprotection.io/stop-barrier";
    /// Serialized backup extras surfaced to the primary container.
    pub const BACKUP_EXTRAS: &str = "restore.dataprotection.io/backup-extras";
    /// Action-definition annotation: restore only the continuous stream in PITR.
    pub const SKIP_BASE_BACKUP_RESTORE_IN_PITR: &str =
        "dataprotection.io/skip-base-backup-restore-in-pitr";
}

/// Container names inside restore tasks.
pub mod containers {
    /// Runs the action definition's restore command.
    pub const PRIMARY: &str = "restore";
    /// Idles until the stop-barrier marker reads `true`.
    pub const BARRIER: &str = "restore-barrier";
}

/// Reasons attached to notices emitted on the restore request.
pub mod reasons {
    pub const CREATE_RESTORE_TASK: &str = "CreateRestoreTask";
    pub const CREATE_RESTORE_CLAIM: &str = "CreateRestoreClaim";
    pub const SKIP_BASE_BACKUP_RESTORE_IN_PITR: &str = "SkipBaseBackupRestoreInPitr";
    pub const RESTORE_FAILED: &str = "RestoreFailed";
    pub const RESTORE_COMPLETED: &str = "RestoreCompleted";
}

/// Volume names, mount paths and identifiers used by the task builder.
pub mod volumes {
    pub const CLAIM_IDENTIFIER: &str = "dp-claim";
    pub const CLAIM_TEMPLATE_IDENTIFIER: &str = "dp-claim-tpl";

    pub const BARRIER_VOLUME: &str = "barrier-signal";
    pub const BARRIER_MOUNT_PATH: &str = "/dp_barrier";
    pub const BARRIER_FILE: &str = "stop_restore_barrier";

    pub const EXTRAS_VOLUME: &str = "downward-extras";
    pub const EXTRAS_MOUNT_PATH: &str = "/dp_downward/";
    pub const EXTRAS_FILE: &str = "status_extras";

    pub const BACKUP_REPO_VOLUME: &str = "dp-backup-data";
    pub const BACKUP_REPO_MOUNT_PATH: &str = "/backupdata";
}

/// Prefix of the status-action task handle for execution tasks.
pub const TASK_HANDLE_PREFIX: &str = "job/";

/// Length of the restore request uid prefix embedded in task names.
pub const REQUEST_ID_PREFIX_LEN: usize = 8;
