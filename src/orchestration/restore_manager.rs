//! # Restore Manager
//!
//! Builds the execution tasks of each stage for one backup set and creates
//! the volume claims those tasks restore into.
//!
//! ## Prepare-data ordering
//!
//! Under the `Parallel` policy every index is built at once and each index
//! gets its own claims (`{claim}-{index}`). Under `Serial` only one task runs
//! at a time: the number of indices built is one more than the number of
//! Completed entries already recorded (capped at the target), each completed
//! task is deleted to release its claims, and indices already recorded as
//! Completed are not built again.

use super::status::{prepare_data_action_count, task_completed, task_name_from_handle};
use crate::builder::{
    backup_repo_attachment, claim_volume, skip_index, source_pod_name, target_pod_env, TaskTemplateBuilder,
    TaskVariant,
};
use crate::config::RestoreEngineConfig;
use crate::constants::{labels, reasons, volumes};
use crate::control_plane::ControlPlane;
use crate::error::{ignore_already_exists, ignore_not_found, RestoreError, Result};
use crate::events::EventRecorder;
use crate::lineage::BackupActionSet;
use crate::models::{
    BackupRepo, BackupStatusTarget, ClaimSpec, ExecActionSpec, JobActionSpec, LabelSelector, ObjectMeta, Pod,
    PodSelectionStrategy, PrepareDataConfig, ReadyConfig, RestoreRequest, RestoreStage, RestoreVolumeClaim,
    RestoreVolumeClaimsTemplate, StatusAction, Task, TypedObjectReference, VolumeClaim,
};
use crate::state_machine::StatusActionState;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const VOLUME_SNAPSHOT_KIND: &str = "VolumeSnapshot";
const VOLUME_SNAPSHOT_GROUP: &str = "snapshot.storage.k8s.io";

/// Claims rendered from the claim template for restore index `i`
pub fn template_claims(template: &RestoreVolumeClaimsTemplate, i: usize) -> Vec<RestoreVolumeClaim> {
    let index = i + template.starting_index as usize;
    template
        .templates
        .iter()
        .map(|claim| {
            let mut claim = claim.clone();
            claim.metadata.name = format!("{}-{index}", claim.metadata.name);
            add_workload_managing_labels(&mut claim, index);
            claim
        })
        .collect()
}

/// Label a template claim so the workload controller adopts it as the claim
/// of its `index`-th pod
pub fn add_workload_managing_labels(claim: &mut RestoreVolumeClaim, index: usize) {
    let (Some(instance), Some(component)) = (
        claim.metadata.label(labels::APP_INSTANCE),
        claim.metadata.label(labels::APP_COMPONENT),
    ) else {
        return;
    };
    let workload = format!("{instance}-{component}");
    let claim_labels = &mut claim.metadata.labels;
    claim_labels
        .entry(labels::WORKLOAD_NAME.to_string())
        .or_insert_with(|| workload.clone());
    claim_labels
        .entry(labels::MANAGED_BY.to_string())
        .or_insert_with(|| labels::WORKLOAD_MANAGED_BY_VALUE.to_string());

    if claim_labels.get(labels::APP_POD_NAME).is_some_and(|p| !p.is_empty()) {
        return;
    }
    let pod_name = match claim_labels.get(labels::APP_INSTANCE_TEMPLATE) {
        Some(template) => format!("{workload}-{template}-{index}"),
        None => format!("{workload}-{index}"),
    };
    claim_labels.insert(labels::APP_POD_NAME.to_string(), pod_name);
}

fn recorded<'a>(
    actions: &'a [StatusAction],
    backup_name: &'a str,
    action_name: &'a str,
) -> impl Iterator<Item = &'a StatusAction> + 'a {
    actions
        .iter()
        .filter(move |a| a.backup_name == backup_name && a.name == action_name)
}

#[derive(Clone)]
pub struct RestoreManager {
    control_plane: Arc<dyn ControlPlane>,
    recorder: Arc<dyn EventRecorder>,
    config: Arc<RestoreEngineConfig>,
}

impl std::fmt::Debug for RestoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RestoreManager {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        recorder: Arc<dyn EventRecorder>,
        config: Arc<RestoreEngineConfig>,
    ) -> Self {
        Self {
            control_plane,
            recorder,
            config,
        }
    }

    /// The backup's repository; a named repository that does not exist is fatal
    pub async fn prepare_backup_repo(&self, set: &BackupActionSet) -> Result<Option<BackupRepo>> {
        let Some(name) = set.backup.status.backup_repo_name.as_deref().filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        self.control_plane
            .get_backup_repo(name)
            .await
            .map(Some)
            .map_err(RestoreError::fatal_if_not_found)
    }

    /// Create a claim in the request's namespace unless it already exists
    pub async fn create_claim_if_absent(
        &self,
        request: &RestoreRequest,
        metadata: &ObjectMeta,
        spec: &ClaimSpec,
    ) -> Result<()> {
        let namespace = request.namespace();
        match self.control_plane.get_volume_claim(namespace, &metadata.name).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut metadata = metadata.clone();
        metadata.namespace = namespace.to_string();
        self.recorder.normal(
            &request.object_ref(),
            reasons::CREATE_RESTORE_CLAIM,
            &format!("created volume claim {namespace}/{}", metadata.name),
        );
        let claim = VolumeClaim {
            metadata,
            spec: spec.clone(),
        };
        ignore_already_exists(self.control_plane.create_volume_claim(&claim).await)
    }

    /// Number of indices to build under the `Serial` policy; deletes the tasks
    /// of completed indices so their claims are released
    async fn serial_replicas(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        action_name: &str,
        replicas: usize,
    ) -> Result<usize> {
        let mut current = 1;
        for action in recorded(request.actions(RestoreStage::PrepareData), set.backup_name(), action_name) {
            if action.status != StatusActionState::Completed || current >= replicas {
                continue;
            }
            current += 1;
            if let Some(task_name) = task_name_from_handle(&action.task_handle) {
                debug!(task = %task_name, "Deleting completed serial restore task");
                ignore_not_found(self.control_plane.delete_task(request.namespace(), task_name).await)?;
            }
        }
        Ok(current.min(replicas))
    }

    /// Prepare-data tasks of one backup set, creating their claims first
    #[instrument(skip(self, request, set, target), fields(restore = %request.name(), backup = %set.backup_name()))]
    pub async fn build_prepare_data_tasks(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        action_name: &str,
    ) -> Result<Vec<Task>> {
        let Some(config) = request.spec.prepare_data_config.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(job) = set.action_definition.as_ref().and_then(|d| d.prepare_data()) else {
            return Ok(Vec::new());
        };
        let repo = self.prepare_backup_repo(set).await?;

        let mut builder = TaskTemplateBuilder::new(request, set, RestoreStage::PrepareData, &self.config)
            .image(&job.image)
            .command(job.command.clone())
            .service_account(&self.config.worker_service_account)
            .target(target)
            .backup_repo(backup_repo_attachment(set, repo.as_ref()));
        for claim in &config.restore_volume_claims {
            self.create_claim_if_absent(request, &claim.metadata, &claim.volume_claim_spec)
                .await?;
            builder = builder.common_volume(claim_volume(
                set,
                &claim.volume_config,
                &claim.metadata.name,
                volumes::CLAIM_IDENTIFIER,
            )?);
        }
        let template = builder.build()?;

        let mut replicas = prepare_data_action_count(Some(config));
        if config.is_serial_policy() {
            replicas = self.serial_replicas(request, set, action_name, replicas).await?;
        }

        let mut tasks = Vec::new();
        for i in 0..replicas {
            let mut variant = TaskVariant::new(template.task_name(i));
            if let Some(claims_template) = &config.restore_volume_claims_template {
                for claim in template_claims(claims_template, i) {
                    self.create_claim_if_absent(request, &claim.metadata, &claim.volume_claim_spec)
                        .await?;
                    variant.volumes.extend(claim_volume(
                        set,
                        &claim.volume_config,
                        &claim.metadata.name,
                        volumes::CLAIM_TEMPLATE_IDENTIFIER,
                    )?);
                    for (key, value) in claim.metadata.labels {
                        variant.labels.entry(key).or_insert(value);
                    }
                }
            }

            let source_pod = source_pod_name(target, config.required_policy_for_all_pod_selection.as_ref(), i)?;
            if skip_index(target, &source_pod) {
                debug!(index = i, "No source pod maps to this index, skipping");
                continue;
            }
            variant.source_pod = source_pod;
            if config.is_serial_policy() && task_completed(request.actions(RestoreStage::PrepareData), &variant.name) {
                continue;
            }
            tasks.push(template.render(variant));
        }
        Ok(tasks)
    }

    /// Task that fills `populate_claim` in place from the backup.
    ///
    /// `None` when the request declares no data-source reference or the
    /// backup set has no prepare-data action.
    pub async fn build_volume_populate_task(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        populate_claim: &VolumeClaim,
        index: usize,
    ) -> Result<Option<Task>> {
        let Some(config) = request.spec.prepare_data_config.as_ref() else {
            return Ok(None);
        };
        let Some(data_source_ref) = config.data_source_ref.as_ref() else {
            return Ok(None);
        };
        let Some(job) = set.action_definition.as_ref().and_then(|d| d.prepare_data()) else {
            return Ok(None);
        };
        let repo = self.prepare_backup_repo(set).await?;
        let source_pod = source_pod_name(target, config.required_policy_for_all_pod_selection.as_ref(), 0)?;
        let claim_name = &populate_claim.metadata.name;

        let template = TaskTemplateBuilder::new(request, set, RestoreStage::PrepareData, &self.config)
            .image(&job.image)
            .command(job.command.clone())
            .service_account(&self.config.worker_service_account)
            .target(target)
            .label(labels::POPULATE_CLAIM, claim_name)
            .backup_repo(backup_repo_attachment(set, repo.as_ref()))
            .build()?;

        let mut variant = TaskVariant::new(format!("{claim_name}-{index}"));
        variant.source_pod = source_pod;
        variant
            .volumes
            .extend(claim_volume(set, data_source_ref, claim_name, volumes::CLAIM_IDENTIFIER)?);
        Ok(Some(template.render(variant)))
    }

    /// Tasks of post-ready step `step` of one backup set, one per target pod
    #[instrument(skip(self, request, set, target), fields(restore = %request.name(), backup = %set.backup_name()))]
    pub async fn build_post_ready_tasks(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        step: usize,
    ) -> Result<Vec<Task>> {
        let Some(ready) = request.spec.ready_config.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(definition) = set.action_definition.as_ref().filter(|d| d.has_post_ready_stage()) else {
            return Ok(Vec::new());
        };
        let Some(action) = definition.post_ready().get(step) else {
            return Err(RestoreError::fatal(format!(
                "post-ready step {step} is not declared by action definition \"{}\"",
                definition.name()
            )));
        };

        match (&action.job, &action.exec) {
            (Some(job), _) => {
                let repo = self.prepare_backup_repo(set).await?;
                self.build_job_action_tasks(request, set, target, ready, job, step, repo)
                    .await
            }
            (None, Some(exec)) => {
                self.build_exec_action_tasks(request, set, target, ready, exec, step)
                    .await
            }
            (None, None) => Err(RestoreError::fatal(format!(
                "post-ready step {step} of action definition \"{}\" declares neither a job nor an exec action",
                definition.name()
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_job_action_tasks(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        ready: &ReadyConfig,
        job: &JobActionSpec,
        step: usize,
        repo: Option<BackupRepo>,
    ) -> Result<Vec<Task>> {
        let Some(job_action) = ready.job_action.as_ref() else {
            return Err(RestoreError::fatal("spec.readyConfig.jobAction can not be empty"));
        };
        let pod_selector = &job_action.target.pod_selector;
        let Some(label_selector) = pod_selector.label_selector.as_ref() else {
            return Err(RestoreError::fatal(
                "spec.readyConfig.jobAction.target.podSelector.labelSelector can not be empty",
            ));
        };
        let mut pods = self.target_pods(request, label_selector, "jobAction").await?;
        if pod_selector.strategy == PodSelectionStrategy::Any {
            let Some(running) = pods.iter().find(|p| p.is_running()).cloned() else {
                return Err(RestoreError::InvalidState(
                    "can not found any running pod by spec.readyConfig.jobAction.target.podSelector".to_string(),
                ));
            };
            pods = vec![running];
        }

        let template = TaskTemplateBuilder::new(request, set, RestoreStage::PostReady, &self.config)
            .image(&job.image)
            .command(job.command.clone())
            .service_account(&self.config.worker_service_account)
            .target(target)
            .backup_repo(backup_repo_attachment(set, repo.as_ref()))
            .build()?;
        let run_on_target_node = job.run_on_target_pod_node.unwrap_or(false);

        let mut tasks = Vec::new();
        for (i, pod) in pods.iter().enumerate() {
            let source_pod = source_pod_name(target, job_action.required_policy_for_all_pod_selection.as_ref(), i)?;
            if skip_index(target, &source_pod) {
                continue;
            }
            let mut variant = TaskVariant::new(template.post_ready_task_name(step, i));
            variant.source_pod = source_pod;
            variant.tolerations = pod.spec.tolerations.clone();
            if run_on_target_node {
                variant.node_selector.insert(
                    labels::HOSTNAME.to_string(),
                    pod.spec.node_name.clone().unwrap_or_default(),
                );
                for mount in &job_action.target.volume_mounts {
                    for volume in pod.spec.volumes.iter().filter(|v| v.name == mount.name) {
                        variant.volumes.push((volume.clone(), mount.clone()));
                    }
                }
            }
            let (env, env_from) = target_pod_env(
                pod,
                ready.connection_credential.as_ref(),
                target,
                &self.config.cluster_domain,
            );
            variant.env = env;
            variant.env_from = env_from;
            tasks.push(template.render(variant));
        }
        Ok(tasks)
    }

    /// Exec-style tasks run `kubectl exec` against each target pod from the
    /// controller namespace. They read no backup data, so they carry neither
    /// the restore env nor, outside the controller namespace, a service account.
    async fn build_exec_action_tasks(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        ready: &ReadyConfig,
        exec: &ExecActionSpec,
        step: usize,
    ) -> Result<Vec<Task>> {
        let Some(exec_action) = ready.exec_action.as_ref() else {
            return Err(RestoreError::fatal("spec.readyConfig.execAction can not be empty"));
        };
        let pods = self
            .target_pods(request, &exec_action.target.pod_selector, "execAction")
            .await?;

        let mut builder = TaskTemplateBuilder::new(request, set, RestoreStage::PostReady, &self.config)
            .image(&self.config.tools_image)
            .command(vec!["kubectl".to_string()])
            .without_restore_env()
            .target(target)
            .label(labels::RESTORE_NAMESPACE, request.namespace());
        if let Some(namespace) = self.config.controller_namespace.as_deref() {
            builder = builder
                .namespace(namespace)
                .service_account(&self.config.exec_worker_service_account);
        }
        let template = builder.build()?;

        let tasks = pods
            .iter()
            .enumerate()
            .map(|(i, pod)| {
                let container = exec
                    .container
                    .clone()
                    .filter(|c| !c.is_empty())
                    .or_else(|| pod.spec.containers.first().map(|c| c.name.clone()))
                    .unwrap_or_default();
                let mut variant = TaskVariant::new(template.post_ready_task_name(step, i));
                variant.args = [
                    "-n",
                    pod.metadata.namespace.as_str(),
                    "exec",
                    pod.name(),
                    "-c",
                    container.as_str(),
                    "--",
                ]
                .into_iter()
                .map(str::to_string)
                .chain(exec.command.iter().cloned())
                .collect();
                variant.tolerations = pod.spec.tolerations.clone();
                template.render(variant)
            })
            .collect();
        Ok(tasks)
    }

    async fn target_pods(&self, request: &RestoreRequest, selector: &LabelSelector, source: &str) -> Result<Vec<Pod>> {
        let mut pods = self.control_plane.list_pods(request.namespace(), selector).await?;
        if pods.is_empty() {
            return Err(RestoreError::InvalidState(format!(
                "can not found any pod by spec.readyConfig.{source}.target.podSelector"
            )));
        }
        pods.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(pods)
    }

    /// Create the claims of a snapshot-backed set with the matching volume
    /// snapshot as data source. No status action is recorded.
    #[instrument(skip(self, request, set, target), fields(restore = %request.name(), backup = %set.backup_name()))]
    pub async fn restore_claims_from_snapshot(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
    ) -> Result<()> {
        let Some(config) = request.spec.prepare_data_config.as_ref() else {
            return Ok(());
        };
        for claim in &config.restore_volume_claims {
            self.create_claim_from_snapshot(request, set, target, config, claim.clone())
                .await?;
        }
        if let Some(template) = &config.restore_volume_claims_template {
            for i in 0..prepare_data_action_count(Some(config)) {
                for claim in template_claims(template, i) {
                    self.create_claim_from_snapshot(request, set, target, config, claim)
                        .await?;
                }
            }
        }
        info!("Restore claims created from volume snapshots");
        Ok(())
    }

    async fn create_claim_from_snapshot(
        &self,
        request: &RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        config: &PrepareDataConfig,
        mut claim: RestoreVolumeClaim,
    ) -> Result<()> {
        let Some(source) = claim
            .volume_config
            .volume_source
            .clone()
            .filter(|s| !s.is_empty())
        else {
            return Err(RestoreError::fatal(format!(
                "claim \"{}\" volumeSource can not be empty if the backup uses volume snapshot",
                claim.metadata.name
            )));
        };

        // Snapshots of older backups are named after the backup and volume source.
        let mut snapshot = format!("{}-{source}", set.backup_name());
        if !self
            .control_plane
            .volume_snapshot_exists(set.backup.namespace(), &snapshot)
            .await?
        {
            let source_pod = source_pod_name(target, config.required_policy_for_all_pod_selection.as_ref(), 0)?;
            let any_strategy = target.map_or(true, |t| t.pod_selector.strategy == PodSelectionStrategy::Any);
            if any_strategy || !source_pod.is_empty() {
                let Some(group) = set.backup.volume_snapshots_for_pod(&source_pod) else {
                    return Err(RestoreError::fatal(format!(
                        "can not found the volume snapshot in the backup status, source target pod is \"{source_pod}\""
                    )));
                };
                snapshot = group.get(&source).cloned().unwrap_or_default();
            }
        }
        if !snapshot.is_empty() {
            claim.volume_claim_spec.data_source = Some(TypedObjectReference {
                api_group: Some(VOLUME_SNAPSHOT_GROUP.to_string()),
                kind: VOLUME_SNAPSHOT_KIND.to_string(),
                name: snapshot,
            });
        }
        self.create_claim_if_absent(request, &claim.metadata, &claim.volume_claim_spec)
            .await
    }
}
