//! Volumes, volume claims and backup repositories.

use super::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    PersistentVolumeClaim { claim_name: String },
    /// Pod metadata surfaced as files
    DownwardApi { items: Vec<DownwardApiItem> },
    EmptyDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownwardApiItem {
    pub path: String,
    pub field_path: String,
}

impl Volume {
    pub fn claim(name: impl Into<String>, claim_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::PersistentVolumeClaim {
                claim_name: claim_name.into(),
            },
        }
    }

    /// Surface a single pod annotation as a file named `path`
    pub fn downward_annotation(name: impl Into<String>, path: impl Into<String>, annotation: &str) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::DownwardApi {
                items: vec![DownwardApiItem {
                    path: path.into(),
                    field_path: format!("metadata.annotations['{annotation}']"),
                }],
            },
        }
    }

    pub fn claim_name(&self) -> Option<&str> {
        match &self.source {
            VolumeSource::PersistentVolumeClaim { claim_name } => Some(claim_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

impl VolumeMount {
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
        }
    }
}

/// Persistent volume claim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeClaim {
    pub metadata: ObjectMeta,
    pub spec: ClaimSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimSpec {
    pub access_modes: Vec<String>,
    pub storage_class_name: Option<String>,
    /// Requested capacity, e.g. `20Gi`
    pub storage: Option<String>,
    pub data_source: Option<TypedObjectReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedObjectReference {
    pub api_group: Option<String>,
    pub kind: String,
    pub name: String,
}

/// Storage location of backup data; the engine only passes it through to tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupRepo {
    pub metadata: ObjectMeta,
    pub spec: BackupRepoSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupRepoSpec {
    pub storage_provider: Option<String>,
    /// Claim exposing the repository as a filesystem, when the provider mounts one
    pub volume_claim: Option<String>,
    pub config: BTreeMap<String, String>,
}
