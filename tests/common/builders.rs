//! Builders for the records integration tests seed into the control plane.

use super::{at, NS, RESTORE_NAME, RESTORE_UID};
use chrono::{DateTime, Utc};
use restore_core::constants::labels;
use restore_core::models::{
    ActionDefinition, ActionDefinitionSpec, ActionSpec, Backup, BackupMethod, BackupPhase, BackupRef, BackupStatusTarget, BackupTimeRange,
    BackupType, Container, ExecActionSpec, ExecutionPolicy, JobAction, JobActionSpec, JobActionTarget,
    LabelSelector, ObjectMeta, Pod, PodPhase, PodSelectionStrategy, PodSelector, PodSpec, PodStatus,
    PrepareDataConfig, ReadyConfig, RestoreActionSpec, RestoreRequest, RestoreSpec, RestoreVolumeClaim,
    RestoreVolumeClaimsTemplate, VolumeConfig,
};
use std::collections::BTreeMap;

pub const FULL_ACTIONS: &str = "mysql-full";
pub const INCREMENTAL_ACTIONS: &str = "mysql-incremental";
pub const CONTINUOUS_ACTIONS: &str = "mysql-binlog";
pub const RESTORE_IMAGE: &str = "registry.example.com/mysql-restore:8.0";

/// Action definition with a prepare-data job and optional post-ready steps
pub fn action_definition(name: &str, backup_type: BackupType, post_ready: Vec<ActionSpec>) -> ActionDefinition {
    ActionDefinition {
        metadata: ObjectMeta::named("", name),
        spec: ActionDefinitionSpec {
            backup_type,
            env: vec![],
            restore: Some(RestoreActionSpec {
                prepare_data: Some(JobActionSpec {
                    image: RESTORE_IMAGE.to_string(),
                    command: vec!["sh".into(), "-c".into(), "restore.sh".into()],
                    run_on_target_pod_node: None,
                }),
                post_ready,
                base_backup_required: None,
            }),
        },
    }
}

/// Action definition that restores only after the workload is ready
pub fn post_ready_only_definition(name: &str, backup_type: BackupType, post_ready: Vec<ActionSpec>) -> ActionDefinition {
    let mut definition = action_definition(name, backup_type, post_ready);
    if let Some(restore) = definition.spec.restore.as_mut() {
        restore.prepare_data = None;
    }
    definition
}

pub fn job_step(command: &str) -> ActionSpec {
    ActionSpec {
        job: Some(JobActionSpec {
            image: RESTORE_IMAGE.to_string(),
            command: vec!["sh".into(), "-c".into(), command.into()],
            run_on_target_pod_node: None,
        }),
        exec: None,
    }
}

pub fn exec_step(command: &str) -> ActionSpec {
    ActionSpec {
        job: None,
        exec: Some(ExecActionSpec {
            container: None,
            command: vec!["sh".into(), "-c".into(), command.into()],
        }),
    }
}

/// Builder pattern for test backups
pub struct BackupBuilder {
    backup: Backup,
}

impl BackupBuilder {
    pub fn new(name: &str) -> Self {
        let mut backup = Backup {
            metadata: ObjectMeta::named(NS, name),
            ..Default::default()
        };
        backup.spec.backup_policy_name = "mysql-policy".into();
        backup.status.phase = BackupPhase::Completed;
        backup.status.path = Some(format!("/default/{name}"));
        backup.status.backup_method = Some(BackupMethod {
            name: "xtrabackup".into(),
            action_set_name: FULL_ACTIONS.into(),
            ..Default::default()
        });
        Self { backup }
    }

    pub fn with_actions(mut self, action_set_name: &str) -> Self {
        if let Some(method) = self.backup.status.backup_method.as_mut() {
            method.action_set_name = action_set_name.to_string();
        }
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.backup.spec.parent_backup_name = Some(parent.to_string());
        self
    }

    pub fn with_phase(mut self, phase: BackupPhase) -> Self {
        self.backup.status.phase = phase;
        self
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.backup.status.time_range = Some(BackupTimeRange {
            start: Some(start),
            end: Some(end),
            time_zone: None,
        });
        self
    }

    /// Label the backup as taken from `mycluster` with the given type
    pub fn with_scope(mut self, backup_type: BackupType) -> Self {
        let backup_labels = &mut self.backup.metadata.labels;
        backup_labels.insert(labels::APP_INSTANCE.into(), "mycluster".into());
        backup_labels.insert(labels::BACKUP_TYPE.into(), backup_type.to_string());
        self
    }

    /// Record one target per name, each backed up with the `Any` strategy
    pub fn with_targets(mut self, names: &[&str]) -> Self {
        self.backup.status.targets = names
            .iter()
            .map(|name| BackupStatusTarget {
                name: name.to_string(),
                ..Default::default()
            })
            .collect();
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.backup.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Backup {
        self.backup
    }
}

/// Builder pattern for test restore requests
pub struct RestoreBuilder {
    request: RestoreRequest,
}

impl RestoreBuilder {
    pub fn new(backup_name: &str) -> Self {
        let mut metadata = ObjectMeta::named(NS, RESTORE_NAME);
        metadata.uid = RESTORE_UID.into();
        Self {
            request: RestoreRequest {
                metadata,
                spec: RestoreSpec {
                    backup: BackupRef {
                        name: backup_name.into(),
                        namespace: NS.into(),
                        source_target_name: None,
                    },
                    ..Default::default()
                },
                status: Default::default(),
            },
        }
    }

    pub fn with_restore_time(mut self, time: DateTime<Utc>) -> Self {
        self.request.spec.restore_time = Some(time.to_rfc3339());
        self
    }

    /// Restore into `replicas` claims rendered from the `data` template
    pub fn with_claim_template(mut self, replicas: u32, policy: ExecutionPolicy) -> Self {
        let mut claim = RestoreVolumeClaim {
            metadata: ObjectMeta::named("", "data-mycluster-mysql"),
            volume_config: VolumeConfig {
                volume_source: Some("data".into()),
                mount_path: Some("/var/lib/mysql".into()),
            },
            ..Default::default()
        };
        claim.metadata.labels = BTreeMap::from([
            (labels::APP_INSTANCE.to_string(), "mycluster".to_string()),
            (labels::APP_COMPONENT.to_string(), "mysql".to_string()),
        ]);
        self.request.spec.prepare_data_config = Some(PrepareDataConfig {
            volume_claim_restore_policy: policy,
            restore_volume_claims_template: Some(RestoreVolumeClaimsTemplate {
                templates: vec![claim],
                replicas,
                starting_index: 0,
            }),
            ..Default::default()
        });
        self
    }

    /// Run job-style post-ready steps against pods labelled `app=mysql`
    pub fn with_job_target(mut self, strategy: PodSelectionStrategy) -> Self {
        let ready = self.request.spec.ready_config.get_or_insert_with(ReadyConfig::default);
        ready.job_action = Some(JobAction {
            target: JobActionTarget {
                pod_selector: PodSelector {
                    strategy,
                    label_selector: Some(app_selector()),
                },
                volume_mounts: vec![],
            },
            required_policy_for_all_pod_selection: None,
        });
        self
    }

    pub fn build(self) -> RestoreRequest {
        self.request
    }
}

pub fn app_selector() -> LabelSelector {
    LabelSelector {
        match_labels: BTreeMap::from([("app".to_string(), "mysql".to_string())]),
    }
}

/// Running workload pod labelled `app=mysql`
pub fn workload_pod(name: &str) -> Pod {
    let mut metadata = ObjectMeta::named(NS, name);
    metadata.labels.insert("app".into(), "mysql".into());
    Pod {
        metadata,
        spec: PodSpec {
            node_name: Some("node-1".into()),
            containers: vec![Container {
                name: "mysql".into(),
                image: "mysql:8.0".into(),
                ..Default::default()
            }],
            ..Default::default()
        },
        status: PodStatus {
            phase: PodPhase::Running,
            pod_ip: Some("10.0.0.12".into()),
            ..Default::default()
        },
    }
}

/// Full backup F, incremental I1 on F, incremental I2 on I1
pub fn incremental_chain() -> Vec<Backup> {
    vec![
        BackupBuilder::new("full").with_window(at(9, 0), at(9, 10)).build(),
        BackupBuilder::new("inc1")
            .with_actions(INCREMENTAL_ACTIONS)
            .with_parent("full")
            .with_window(at(9, 20), at(9, 25))
            .build(),
        BackupBuilder::new("inc2")
            .with_actions(INCREMENTAL_ACTIONS)
            .with_parent("inc1")
            .with_window(at(9, 40), at(9, 45))
            .build(),
    ]
}
