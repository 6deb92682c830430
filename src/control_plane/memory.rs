//! In-memory control plane.
//!
//! Records are kept in `DashMap`s keyed by `(namespace, name)`; cluster-scoped
//! records use an empty namespace. Besides the [`ControlPlane`] operations it
//! offers helpers that play the execution backend's part: starting task pods,
//! terminating containers and setting task conditions.

use super::ControlPlane;
use crate::constants::{containers, labels};
use crate::error::{RestoreError, Result};
use crate::models::{
    ActionDefinition, Backup, BackupRepo, ContainerStatus, ContainerTerminated, LabelSelector,
    ObjectMeta, Pod, PodPhase, PodSpec, PodStatus, RestoreRequest, RestoreStatus, Task,
    TaskCondition, TaskConditionKind, VolumeClaim,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

type ObjectKey = (String, String);

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn sorted_by_name<T>(mut items: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    items.sort_by(|a, b| name(a).cmp(name(b)));
    items
}

#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    backups: DashMap<ObjectKey, Backup>,
    action_definitions: DashMap<String, ActionDefinition>,
    backup_repos: DashMap<String, BackupRepo>,
    tasks: DashMap<ObjectKey, Task>,
    pods: DashMap<ObjectKey, Pod>,
    claims: DashMap<ObjectKey, VolumeClaim>,
    snapshots: DashSet<ObjectKey>,
    restores: DashMap<ObjectKey, RestoreRequest>,
    created_tasks: Mutex<Vec<String>>,
    deleted_tasks: Mutex<Vec<String>>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_backup(&self, backup: Backup) {
        self.backups
            .insert(key(backup.namespace(), backup.name()), backup);
    }

    pub fn insert_action_definition(&self, definition: ActionDefinition) {
        self.action_definitions
            .insert(definition.metadata.name.clone(), definition);
    }

    pub fn insert_backup_repo(&self, repo: BackupRepo) {
        self.backup_repos.insert(repo.metadata.name.clone(), repo);
    }

    pub fn insert_pod(&self, pod: Pod) {
        self.pods
            .insert(key(&pod.metadata.namespace, &pod.metadata.name), pod);
    }

    pub fn insert_task(&self, task: Task) {
        self.tasks.insert(key(task.namespace(), task.name()), task);
    }

    pub fn insert_volume_snapshot(&self, namespace: &str, name: &str) {
        self.snapshots.insert(key(namespace, name));
    }

    pub fn insert_restore(&self, restore: RestoreRequest) {
        self.restores
            .insert(key(restore.namespace(), restore.name()), restore);
    }

    pub fn restore(&self, namespace: &str, name: &str) -> Option<RestoreRequest> {
        self.restores.get(&key(namespace, name)).map(|r| r.clone())
    }

    pub fn task(&self, namespace: &str, name: &str) -> Option<Task> {
        self.tasks.get(&key(namespace, name)).map(|t| t.clone())
    }

    /// Live tasks in `namespace`, ordered by name
    pub fn tasks(&self, namespace: &str) -> Vec<Task> {
        let tasks = self
            .tasks
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| e.value().clone())
            .collect();
        sorted_by_name(tasks, |t: &Task| t.name())
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.get(&key(namespace, name)).map(|p| p.clone())
    }

    pub fn claims(&self, namespace: &str) -> Vec<VolumeClaim> {
        let claims = self
            .claims
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| e.value().clone())
            .collect();
        sorted_by_name(claims, |c: &VolumeClaim| c.metadata.name.as_str())
    }

    /// Every task name ever created, in creation order
    pub fn created_task_names(&self) -> Vec<String> {
        self.created_tasks.lock().clone()
    }

    pub fn deleted_task_names(&self) -> Vec<String> {
        self.deleted_tasks.lock().clone()
    }

    /// Spawn the pod of a task as the execution backend would; returns its name
    pub fn start_task_pod(&self, namespace: &str, task_name: &str) -> Result<String> {
        let task = self
            .task(namespace, task_name)
            .ok_or_else(|| RestoreError::not_found("Task", task_name))?;
        let pod_name = format!("{task_name}-pod");
        if self.pods.contains_key(&key(namespace, &pod_name)) {
            return Ok(pod_name);
        }

        let mut metadata = ObjectMeta::named(namespace, &pod_name);
        metadata.labels = task.spec.pod_labels.clone();
        metadata
            .labels
            .insert(labels::TASK_NAME.to_string(), task_name.to_string());
        metadata.annotations = task.spec.pod_annotations.clone();

        let pod = Pod {
            metadata,
            spec: PodSpec {
                node_name: task.spec.placement.node_name.clone(),
                containers: task.spec.containers.clone(),
                volumes: task.spec.volumes.clone(),
                tolerations: task.spec.placement.tolerations.clone(),
                ..Default::default()
            },
            status: PodStatus {
                phase: PodPhase::Running,
                ..Default::default()
            },
        };
        self.insert_pod(pod);
        Ok(pod_name)
    }

    pub fn terminate_container(&self, namespace: &str, pod_name: &str, container: &str, exit_code: i32) -> Result<()> {
        let mut pod = self
            .pods
            .get_mut(&key(namespace, pod_name))
            .ok_or_else(|| RestoreError::not_found("Pod", pod_name))?;
        let terminated = Some(ContainerTerminated {
            exit_code,
            reason: Some(if exit_code == 0 { "Completed" } else { "Error" }.to_string()),
        });
        let statuses = &mut pod.status.container_statuses;
        match statuses.iter().position(|s| s.name == container) {
            Some(i) => statuses[i].terminated = terminated,
            None => statuses.push(ContainerStatus {
                name: container.to_string(),
                terminated,
            }),
        }
        Ok(())
    }

    pub fn set_task_condition(
        &self,
        namespace: &str,
        task_name: &str,
        kind: TaskConditionKind,
        message: Option<&str>,
    ) -> Result<()> {
        let mut task = self
            .tasks
            .get_mut(&key(namespace, task_name))
            .ok_or_else(|| RestoreError::not_found("Task", task_name))?;
        task.status.conditions.retain(|c| c.kind != kind);
        task.status.conditions.push(TaskCondition {
            kind,
            status: true,
            reason: None,
            message: message.map(str::to_string),
        });
        Ok(())
    }

    /// Run a task to successful completion
    pub fn complete_task(&self, namespace: &str, task_name: &str) -> Result<()> {
        let pod = self.start_task_pod(namespace, task_name)?;
        self.terminate_container(namespace, &pod, containers::PRIMARY, 0)?;
        self.set_task_condition(namespace, task_name, TaskConditionKind::Complete, None)
    }

    /// Run a task to failure
    pub fn fail_task(&self, namespace: &str, task_name: &str, message: &str) -> Result<()> {
        let pod = self.start_task_pod(namespace, task_name)?;
        self.terminate_container(namespace, &pod, containers::PRIMARY, 1)?;
        self.set_task_condition(namespace, task_name, TaskConditionKind::Failed, Some(message))
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Backup> {
        self.backups
            .get(&key(namespace, name))
            .map(|b| b.clone())
            .ok_or_else(|| RestoreError::not_found("Backup", name))
    }

    async fn list_backups(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Backup>> {
        let selector = LabelSelector {
            match_labels: labels.clone(),
        };
        let backups = self
            .backups
            .iter()
            .filter(|e| e.key().0 == namespace && selector.matches(&e.value().metadata.labels))
            .map(|e| e.value().clone())
            .collect();
        Ok(sorted_by_name(backups, |b: &Backup| b.name()))
    }

    async fn get_action_definition(&self, name: &str) -> Result<ActionDefinition> {
        self.action_definitions
            .get(name)
            .map(|d| d.clone())
            .ok_or_else(|| RestoreError::not_found("ActionDefinition", name))
    }

    async fn get_backup_repo(&self, name: &str) -> Result<BackupRepo> {
        self.backup_repos
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| RestoreError::not_found("BackupRepo", name))
    }

    async fn get_task(&self, namespace: &str, name: &str) -> Result<Task> {
        self.task(namespace, name)
            .ok_or_else(|| RestoreError::not_found("Task", name))
    }

    async fn create_task(&self, task: &Task) -> Result<()> {
        let task_key = key(task.namespace(), task.name());
        if self.tasks.contains_key(&task_key) {
            return Err(RestoreError::already_exists("Task", task.name()));
        }
        let mut task = task.clone();
        if task.metadata.uid.is_empty() {
            task.metadata.uid = uuid::Uuid::new_v4().to_string();
        }
        debug!(namespace = %task.namespace(), task = %task.name(), "Task created");
        self.created_tasks.lock().push(task.name().to_string());
        self.tasks.insert(task_key, task);
        Ok(())
    }

    async fn delete_task(&self, namespace: &str, name: &str) -> Result<()> {
        if self.tasks.remove(&key(namespace, name)).is_none() {
            return Err(RestoreError::not_found("Task", name));
        }
        self.pods.retain(|k, pod| {
            k.0 != namespace || pod.metadata.label(labels::TASK_NAME) != Some(name)
        });
        self.deleted_tasks.lock().push(name.to_string());
        Ok(())
    }

    async fn list_task_pods(&self, namespace: &str, task_name: &str) -> Result<Vec<Pod>> {
        let pods = self
            .pods
            .iter()
            .filter(|e| e.key().0 == namespace && e.value().metadata.label(labels::TASK_NAME) == Some(task_name))
            .map(|e| e.value().clone())
            .collect();
        Ok(sorted_by_name(pods, |p: &Pod| p.name()))
    }

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Pod>> {
        let pods = self
            .pods
            .iter()
            .filter(|e| e.key().0 == namespace && selector.matches(&e.value().metadata.labels))
            .map(|e| e.value().clone())
            .collect();
        Ok(sorted_by_name(pods, |p: &Pod| p.name()))
    }

    async fn patch_pod_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut pod = self
            .pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| RestoreError::not_found("Pod", name))?;
        pod.metadata
            .annotations
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn get_volume_claim(&self, namespace: &str, name: &str) -> Result<VolumeClaim> {
        self.claims
            .get(&key(namespace, name))
            .map(|c| c.clone())
            .ok_or_else(|| RestoreError::not_found("VolumeClaim", name))
    }

    async fn create_volume_claim(&self, claim: &VolumeClaim) -> Result<()> {
        let claim_key = key(&claim.metadata.namespace, &claim.metadata.name);
        if self.claims.contains_key(&claim_key) {
            return Err(RestoreError::already_exists("VolumeClaim", &claim.metadata.name));
        }
        self.claims.insert(claim_key, claim.clone());
        Ok(())
    }

    async fn volume_snapshot_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self.snapshots.contains(&key(namespace, name)))
    }

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<RestoreRequest> {
        self.restore(namespace, name)
            .ok_or_else(|| RestoreError::not_found("Restore", name))
    }

    async fn patch_restore_status(&self, namespace: &str, name: &str, status: &RestoreStatus) -> Result<()> {
        let mut restore = self
            .restores
            .get_mut(&key(namespace, name))
            .ok_or_else(|| RestoreError::not_found("Restore", name))?;
        restore.status = status.clone();
        Ok(())
    }
}
