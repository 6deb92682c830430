//! # Task Builder
//!
//! Restore tasks of one stage share most of their shape: image, command,
//! service account, claims restored for every index and the backup
//! repository. That common part is assembled once into an immutable
//! [`TaskTemplate`] through a consuming [`TaskTemplateBuilder`]. Each task then
//! supplies only what differs per index or per target pod as a
//! [`TaskVariant`], and [`TaskTemplate::render`] produces the final [`Task`].
//!
//! ```rust,no_run
//! use restore_core::builder::{TaskTemplateBuilder, TaskVariant};
//! # use restore_core::config::RestoreEngineConfig;
//! # use restore_core::lineage::BackupActionSet;
//! # use restore_core::models::{RestoreRequest, RestoreStage};
//! # fn demo(request: &RestoreRequest, set: &BackupActionSet) -> restore_core::error::Result<()> {
//! let config = RestoreEngineConfig::default();
//! let template = TaskTemplateBuilder::new(request, set, RestoreStage::PrepareData, &config)
//!     .image("apecloud/mysql-xtrabackup:$(IMAGE_TAG)")
//!     .command(vec!["sh".into(), "-c".into(), "restore.sh".into()])
//!     .build()?;
//! let task = template.render(TaskVariant::new(template.task_name(0)));
//! # Ok(())
//! # }
//! ```

use super::barrier::barrier_sidecar;
use super::env::{common_env, env_value, merge_env};
use super::expand::{expand, replace_image_registry};
use super::naming;
use super::volumes::{extras_attachment, ExtrasAttachment, RepoAttachment};
use crate::config::RestoreEngineConfig;
use crate::constants::{containers, labels as label_keys};
use crate::error::Result;
use crate::lineage::BackupActionSet;
use crate::models::{
    BackupStatusTarget, Container, EnvFromSource, EnvVar, ObjectMeta, Placement, RestoreRequest, RestoreStage, Task, TaskSpec,
    TaskStatus, Toleration, Volume, VolumeMount,
};
use std::collections::BTreeMap;

/// Labels every restore task carries
pub fn restore_labels(request_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (label_keys::RESTORE_NAME.to_string(), request_name.to_string()),
        (label_keys::MANAGED_BY.to_string(), label_keys::MANAGED_BY_VALUE.to_string()),
    ])
}

/// Common part of every task of one stage and backup set
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    stage: RestoreStage,
    namespace: String,
    request: RestoreRequest,
    set: BackupActionSet,
    image: String,
    image_pull_policy: String,
    image_registry: Option<String>,
    command: Vec<String>,
    args: Vec<String>,
    service_account: Option<String>,
    labels: BTreeMap<String, String>,
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
    repo: Option<RepoAttachment>,
    extras: Option<ExtrasAttachment>,
    barrier: (Container, Volume),
    backoff_limit: i32,
    max_name_len: usize,
    /// Backup target the tasks restore, when the backup recorded several
    target_name: Option<String>,
    /// Whether the backup/restore env contract is injected
    restore_env: bool,
}

/// What one task adds on top of its [`TaskTemplate`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskVariant {
    pub name: String,
    /// Source pod whose backup this task restores; empty when not pod-scoped
    pub source_pod: String,
    /// Added only where the template does not already set the key
    pub labels: BTreeMap<String, String>,
    pub volumes: Vec<(Volume, VolumeMount)>,
    /// Merged over the common env
    pub env: Vec<EnvVar>,
    pub env_from: Vec<EnvFromSource>,
    /// Replaces the template's args when non-empty
    pub args: Vec<String>,
    /// Post-ready placement; prepare-data tasks use the request's scheduling spec
    pub tolerations: Vec<Toleration>,
    pub node_selector: BTreeMap<String, String>,
}

impl TaskVariant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl TaskTemplate {
    pub fn stage(&self) -> RestoreStage {
        self.stage
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the `index`-th task of this stage
    pub fn task_name(&self, index: usize) -> String {
        naming::task_name(
            self.stage,
            self.request.uid(),
            self.set.backup_name(),
            self.target_name.as_deref(),
            index,
            self.max_name_len,
        )
    }

    /// Name of the `index`-th task of post-ready step `step`
    pub fn post_ready_task_name(&self, step: usize, index: usize) -> String {
        naming::post_ready_task_name(
            self.request.uid(),
            self.set.backup_name(),
            self.target_name.as_deref(),
            step,
            index,
            self.max_name_len,
        )
    }

    fn placement(&self, variant: &TaskVariant) -> Placement {
        match (self.stage, self.request.spec.prepare_data_config.as_ref()) {
            (RestoreStage::PrepareData, Some(config)) => {
                let scheduling = &config.scheduling_spec;
                Placement {
                    tolerations: scheduling.tolerations.clone(),
                    node_selector: scheduling.node_selector.clone(),
                    node_name: scheduling.node_name.clone(),
                    scheduler_name: scheduling.scheduler_name.clone(),
                    affinity: scheduling.affinity.clone(),
                    topology_spread_constraints: scheduling.topology_spread_constraints.clone(),
                }
            }
            (RestoreStage::PrepareData, None) => Placement::default(),
            (RestoreStage::PostReady, _) => Placement {
                tolerations: variant.tolerations.clone(),
                node_selector: variant.node_selector.clone(),
                ..Default::default()
            },
        }
    }

    /// Produce the task for one variant
    pub fn render(&self, variant: TaskVariant) -> Task {
        let mut labels = self.labels.clone();
        for (key, value) in &variant.labels {
            labels.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let mut env = if self.restore_env {
            common_env(&self.request, &self.set, &variant.source_pod)
        } else {
            Vec::new()
        };
        if let Some(repo) = &self.repo {
            merge_env(&mut env, repo.env.clone());
        }
        merge_env(&mut env, variant.env.clone());

        let image = expand(&self.image, |name| env_value(&env, name));
        let image = replace_image_registry(&image, self.image_registry.as_deref());

        let placement = self.placement(&variant);
        let (mut volumes, mut mounts): (Vec<_>, Vec<_>) = variant.volumes.into_iter().unzip();
        volumes.extend(self.volumes.iter().cloned());
        mounts.extend(self.mounts.iter().cloned());

        let mut pod_annotations = BTreeMap::new();
        if let Some(extras) = &self.extras {
            pod_annotations.insert(extras.annotation.0.clone(), extras.annotation.1.clone());
            volumes.push(extras.volume.clone());
            mounts.push(extras.mount.clone());
        }
        if let Some((volume, mount)) = self.repo.as_ref().and_then(|r| r.claim.clone()) {
            volumes.push(volume);
            mounts.push(mount);
        }

        let args = if variant.args.is_empty() {
            self.args.clone()
        } else {
            variant.args
        };
        let restore = Container {
            name: containers::PRIMARY.to_string(),
            image,
            image_pull_policy: Some(self.image_pull_policy.clone()),
            command: self.command.clone(),
            args,
            env,
            env_from: variant.env_from,
            volume_mounts: mounts,
            resources: self.request.spec.container_resources.clone(),
            ..Default::default()
        };
        let (barrier, barrier_volume) = self.barrier.clone();
        volumes.push(barrier_volume);

        Task {
            metadata: ObjectMeta {
                name: variant.name,
                namespace: self.namespace.clone(),
                labels: labels.clone(),
                ..Default::default()
            },
            spec: TaskSpec {
                stage: self.stage,
                pod_labels: labels,
                pod_annotations,
                containers: vec![restore, barrier],
                volumes,
                placement,
                service_account_name: self.service_account.clone(),
                backoff_limit: self.backoff_limit,
            },
            status: TaskStatus::default(),
        }
    }
}

/// Consuming builder for [`TaskTemplate`]
#[derive(Debug, Clone)]
pub struct TaskTemplateBuilder {
    template: TaskTemplate,
}

impl TaskTemplateBuilder {
    pub fn new(request: &RestoreRequest, set: &BackupActionSet, stage: RestoreStage, config: &RestoreEngineConfig) -> Self {
        Self {
            template: TaskTemplate {
                stage,
                namespace: request.namespace().to_string(),
                request: request.clone(),
                set: set.clone(),
                image: String::new(),
                image_pull_policy: config.image_pull_policy.clone(),
                image_registry: config.image_registry.clone(),
                command: Vec::new(),
                args: Vec::new(),
                service_account: None,
                labels: restore_labels(request.name()),
                volumes: Vec::new(),
                mounts: Vec::new(),
                repo: None,
                extras: None,
                barrier: barrier_sidecar(config),
                backoff_limit: request.spec.backoff_limit.unwrap_or(config.default_backoff_limit),
                max_name_len: config.max_task_name_length,
                target_name: None,
                restore_env: true,
            },
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.template.image = image.into();
        self
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.template.command = command;
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.template.args = args;
        self
    }

    pub fn service_account(mut self, service_account: impl Into<String>) -> Self {
        self.template.service_account = Some(service_account.into());
        self
    }

    /// Create the tasks somewhere other than the request's namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.template.namespace = namespace.into();
        self
    }

    /// Leave out the backup and restore env, for tasks that touch no backup data
    pub fn without_restore_env(mut self) -> Self {
        self.template.restore_env = false;
        self
    }

    /// Name tasks after the backup target they restore
    pub fn target(mut self, target: Option<&BackupStatusTarget>) -> Self {
        self.template.target_name = target.map(|t| t.name.clone()).filter(|n| !n.is_empty());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.template.labels.insert(key.into(), value.into());
        self
    }

    /// Volume mounted by every task of the stage; `None` is ignored
    pub fn common_volume(mut self, volume: Option<(Volume, VolumeMount)>) -> Self {
        if let Some((volume, mount)) = volume {
            self.template.volumes.push(volume);
            self.template.mounts.push(mount);
        }
        self
    }

    pub fn backup_repo(mut self, repo: Option<RepoAttachment>) -> Self {
        self.template.repo = repo;
        self
    }

    pub fn build(mut self) -> Result<TaskTemplate> {
        self.template.extras = extras_attachment(&self.template.set)?;
        Ok(self.template)
    }
}
