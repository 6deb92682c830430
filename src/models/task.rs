//! # Execution Tasks
//!
//! A [`Task`] is the unit submitted to the execution backend: a run-to-completion
//! pod template with the restore container and the barrier sidecar. The
//! backend reports completion through [`TaskCondition`]s; the pods it spawns are
//! listed separately through the control plane.

use super::meta::ObjectMeta;
use super::pod::{Container, Toleration};
use super::restore::RestoreStage;
use super::volume::Volume;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub metadata: ObjectMeta,
    pub spec: TaskSpec,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub stage: RestoreStage,
    /// Labels and annotations stamped on every pod the task spawns
    #[serde(default)]
    pub pod_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub pod_annotations: BTreeMap<String, String>,
    pub containers: Vec<Container>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub placement: Placement,
    pub service_account_name: Option<String>,
    pub backoff_limit: i32,
}

/// Where the task's pods may be scheduled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Placement {
    pub tolerations: Vec<Toleration>,
    pub node_selector: BTreeMap<String, String>,
    pub node_name: Option<String>,
    pub scheduler_name: Option<String>,
    pub affinity: Option<serde_json::Value>,
    pub topology_spread_constraints: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskStatus {
    pub conditions: Vec<TaskCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskConditionKind {
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCondition {
    pub kind: TaskConditionKind,
    pub status: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    fn condition(&self, kind: TaskConditionKind) -> Option<&TaskCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.kind == kind && c.status)
    }

    /// `(finished, failure message)`; a failed task is finished with a message
    pub fn finished(&self) -> (bool, Option<String>) {
        if let Some(failed) = self.condition(TaskConditionKind::Failed) {
            let message = failed
                .message
                .clone()
                .or_else(|| failed.reason.clone())
                .unwrap_or_else(|| format!("task \"{}\" failed", self.name()));
            return (true, Some(message));
        }
        (self.condition(TaskConditionKind::Complete).is_some(), None)
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.containers.iter().find(|c| c.name == name)
    }
}
