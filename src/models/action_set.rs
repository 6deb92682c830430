//! Action definitions: which images and commands implement a backup
//! method's restore stages.

use super::backup::BackupType;
use super::meta::{EnvVar, ObjectMeta};
use crate::constants::{annotations, env};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionDefinition {
    pub metadata: ObjectMeta,
    pub spec: ActionDefinitionSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionDefinitionSpec {
    pub backup_type: BackupType,
    pub env: Vec<EnvVar>,
    pub restore: Option<RestoreActionSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreActionSpec {
    pub prepare_data: Option<JobActionSpec>,
    pub post_ready: Vec<ActionSpec>,
    /// `Some(false)` lets a continuous backup restore without any base backup
    pub base_backup_required: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobActionSpec {
    pub image: String,
    pub command: Vec<String>,
    pub run_on_target_pod_node: Option<bool>,
}

/// A post-ready action is either a job of its own or an exec into the target pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionSpec {
    pub job: Option<JobActionSpec>,
    pub exec: Option<ExecActionSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecActionSpec {
    /// Defaults to the target pod's first container
    pub container: Option<String>,
    pub command: Vec<String>,
}

impl ActionDefinition {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn backup_type(&self) -> BackupType {
        self.spec.backup_type
    }

    pub fn has_prepare_data_stage(&self) -> bool {
        self.spec
            .restore
            .as_ref()
            .is_some_and(|r| r.prepare_data.is_some())
    }

    pub fn has_post_ready_stage(&self) -> bool {
        self.spec
            .restore
            .as_ref()
            .is_some_and(|r| !r.post_ready.is_empty())
    }

    pub fn prepare_data(&self) -> Option<&JobActionSpec> {
        self.spec.restore.as_ref().and_then(|r| r.prepare_data.as_ref())
    }

    pub fn post_ready(&self) -> &[ActionSpec] {
        self.spec
            .restore
            .as_ref()
            .map(|r| r.post_ready.as_slice())
            .unwrap_or(&[])
    }

    pub fn base_backup_required(&self) -> bool {
        self.spec
            .restore
            .as_ref()
            .and_then(|r| r.base_backup_required)
            .unwrap_or(true)
    }

    pub fn skip_base_backup_restore_in_pitr(&self) -> bool {
        self.metadata.annotation(annotations::SKIP_BASE_BACKUP_RESTORE_IN_PITR) == Some("true")
    }

    /// strftime layout declared through the `TIME_FORMAT` env entry
    pub fn time_format(&self) -> Option<&str> {
        self.spec
            .env
            .iter()
            .find(|e| e.name == env::TIME_FORMAT)
            .and_then(|e| e.value.as_deref())
            .filter(|v| !v.is_empty())
    }
}
