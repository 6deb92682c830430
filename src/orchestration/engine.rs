//! # Restore Engine
//!
//! Single entry point invoked by the external reconciliation scheduler. Each
//! call loads the restore request, re-derives where the restore stands from
//! its recorded status actions, advances it as far as possible without
//! blocking, and writes the resulting status back when it changed.
//!
//! ## Flow
//!
//! 1. Resolve the backup lineage. A fatal resolution error fails the request
//!    before anything is submitted.
//! 2. Drive the prepare-data bucket in order; a backup set must finish before
//!    the next one starts.
//! 3. Once the caller reports the restored workload ready, drive the
//!    post-ready bucket step by step.
//!
//! Every call is safe to repeat against partially applied state.

use super::coordinator::{recalculate, ExecutionCoordinator};
use super::restore_manager::RestoreManager;
use super::status::analyze_restore_actions;
use crate::builder::action_name;
use crate::config::RestoreEngineConfig;
use crate::constants::reasons;
use crate::control_plane::{Clock, ControlPlane};
use crate::error::{RestoreError, Result};
use crate::events::EventRecorder;
use crate::lineage::{BackupActionSet, BackupLineageResolver};
use crate::logging::log_restore_operation;
use crate::models::{Backup, BackupStatusTarget, RestorePhase, RestoreRequest, RestoreStage};
use crate::state_machine::StatusActionState;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    /// Tasks are still running or the workload is not ready yet
    InProgress,
    Completed,
    /// The request failed permanently with this message
    Failed(String),
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed(message) => write!(f, "Failed: {message}"),
        }
    }
}

/// Progress of one (backup, action) group
#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupState {
    Done,
    Running,
    Failed(String),
}

/// Targets of `backup` to restore.
///
/// A named source target must exist on backups that record targets; a backup
/// without recorded targets is restored once with no target.
pub fn select_targets<'a>(
    backup: &'a Backup,
    source_target_name: Option<&str>,
) -> Result<Vec<Option<&'a BackupStatusTarget>>> {
    let targets = backup.status_targets();
    if targets.is_empty() {
        return Ok(vec![None]);
    }
    match source_target_name.filter(|n| !n.is_empty()) {
        None => Ok(targets.into_iter().map(Some).collect()),
        Some(name) => targets
            .into_iter()
            .find(|t| t.name == name)
            .map(|t| vec![Some(t)])
            .ok_or_else(|| {
                RestoreError::fatal(format!(
                    "source target \"{name}\" is not recorded by backup \"{}\"",
                    backup.name()
                ))
            }),
    }
}

/// Failure messages recorded for one group, joined
fn failure_message(request: &RestoreRequest, stage: RestoreStage, backup_name: &str, action: &str) -> String {
    let details: Vec<String> = request
        .actions(stage)
        .iter()
        .filter(|a| a.backup_name == backup_name && a.name == action && a.status == StatusActionState::Failed)
        .map(|a| format!("{}: {}", a.task_handle, a.message.as_deref().unwrap_or("failed")))
        .collect();
    format!(
        "{stage} action \"{action}\" of backup \"{backup_name}\" failed: {}",
        details.join("; ")
    )
}

fn group_state(
    request: &RestoreRequest,
    stage: RestoreStage,
    backup_name: &str,
    action: &str,
    all_finished: bool,
    exist_failed: bool,
) -> GroupState {
    match (all_finished, exist_failed) {
        (false, _) => GroupState::Running,
        (true, true) => GroupState::Failed(failure_message(request, stage, backup_name, action)),
        (true, false) => GroupState::Done,
    }
}

#[derive(Clone)]
pub struct RestoreEngine {
    control_plane: Arc<dyn ControlPlane>,
    recorder: Arc<dyn EventRecorder>,
    clock: Arc<dyn Clock>,
    resolver: BackupLineageResolver,
    manager: RestoreManager,
    coordinator: ExecutionCoordinator,
}

impl fmt::Debug for RestoreEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreEngine")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl RestoreEngine {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
        config: RestoreEngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            resolver: BackupLineageResolver::new(control_plane.clone(), recorder.clone()),
            manager: RestoreManager::new(control_plane.clone(), recorder.clone(), config),
            coordinator: ExecutionCoordinator::new(control_plane.clone(), recorder.clone(), clock.clone()),
            control_plane,
            recorder,
            clock,
        }
    }

    pub fn resolver(&self) -> &BackupLineageResolver {
        &self.resolver
    }

    pub fn manager(&self) -> &RestoreManager {
        &self.manager
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    /// Advance the restore request `namespace/name` by one pass.
    ///
    /// `workload_ready` reports whether the restored workload is healthy;
    /// post-ready actions wait for it. Transient failures are returned as
    /// errors after any progress made so far has been persisted.
    #[instrument(skip(self), fields(namespace = %namespace, restore = %name))]
    pub async fn reconcile(&self, namespace: &str, name: &str, workload_ready: bool) -> Result<ReconcileOutcome> {
        let request = self.control_plane.get_restore(namespace, name).await?;
        match request.status.phase {
            RestorePhase::Completed => return Ok(ReconcileOutcome::Completed),
            RestorePhase::Failed => {
                let message = request.status.message.clone().unwrap_or_default();
                return Ok(ReconcileOutcome::Failed(message));
            }
            RestorePhase::Running => {}
        }

        let mut working = request.clone();
        let outcome = match self.drive(&mut working, workload_ready).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => ReconcileOutcome::Failed(e.to_string()),
            Err(e) => {
                warn!(error = %e, "Restore pass interrupted");
                self.write_status(&request, &working).await?;
                return Err(e);
            }
        };

        match &outcome {
            ReconcileOutcome::InProgress => {}
            ReconcileOutcome::Completed => {
                working.status.phase = RestorePhase::Completed;
                working.status.completion_timestamp = Some(self.clock.now());
                self.recorder
                    .normal(&working.object_ref(), reasons::RESTORE_COMPLETED, "restore completed");
            }
            ReconcileOutcome::Failed(message) => {
                working.status.phase = RestorePhase::Failed;
                working.status.message = Some(message.clone());
                working.status.completion_timestamp = Some(self.clock.now());
                self.recorder
                    .warning(&working.object_ref(), reasons::RESTORE_FAILED, message);
            }
        }
        self.write_status(&request, &working).await?;
        log_restore_operation("reconcile", name, namespace, &outcome.to_string(), None);
        Ok(outcome)
    }

    /// Patch the status only when this pass changed it
    async fn write_status(&self, original: &RestoreRequest, working: &RestoreRequest) -> Result<()> {
        if original.status == working.status {
            return Ok(());
        }
        self.control_plane
            .patch_restore_status(working.namespace(), working.name(), &working.status)
            .await
    }

    async fn drive(&self, request: &mut RestoreRequest, workload_ready: bool) -> Result<ReconcileOutcome> {
        let lineage = self.resolver.resolve(request).await?;
        let source_target_name = request.spec.backup.source_target_name.clone();

        for set in &lineage.prepare_data {
            for target in select_targets(&set.backup, source_target_name.as_deref())? {
                match self.drive_prepare_data(request, set, target).await? {
                    GroupState::Done => {}
                    GroupState::Running => return Ok(ReconcileOutcome::InProgress),
                    GroupState::Failed(message) => return Ok(ReconcileOutcome::Failed(message)),
                }
            }
        }

        if lineage.post_ready.is_empty() {
            return Ok(ReconcileOutcome::Completed);
        }
        if !workload_ready {
            info!("Prepare-data finished, waiting for the workload to become ready");
            return Ok(ReconcileOutcome::InProgress);
        }

        for set in &lineage.post_ready {
            let steps = set
                .action_definition
                .as_ref()
                .map_or(0, |d| d.post_ready().len());
            for target in select_targets(&set.backup, source_target_name.as_deref())? {
                for step in 0..steps {
                    match self.drive_post_ready(request, set, target, step).await? {
                        GroupState::Done => {}
                        GroupState::Running => return Ok(ReconcileOutcome::InProgress),
                        GroupState::Failed(message) => return Ok(ReconcileOutcome::Failed(message)),
                    }
                }
            }
        }
        Ok(ReconcileOutcome::Completed)
    }

    async fn drive_prepare_data(
        &self,
        request: &mut RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
    ) -> Result<GroupState> {
        if set.use_volume_snapshot {
            self.manager
                .restore_claims_from_snapshot(request, set, target)
                .await?;
        }
        if !set.has_prepare_data_stage() {
            return Ok(GroupState::Done);
        }

        let stage = RestoreStage::PrepareData;
        let backup_name = set.backup_name();
        let action = action_name(stage, None, target.map(|t| t.name.as_str()));
        let (finished, failed) = analyze_restore_actions(request, stage, backup_name, &action);
        if finished {
            return Ok(group_state(request, stage, backup_name, &action, finished, failed));
        }

        let tasks = self
            .manager
            .build_prepare_data_tasks(request, set, target, &action)
            .await?;
        let tasks = self.coordinator.submit_tasks(request, tasks).await?;
        let (mut all_finished, exist_failed) = self
            .coordinator
            .check_tasks_done(&mut request.status, stage, &action, backup_name, &tasks)
            .await?;
        recalculate(
            &request.status,
            request.spec.prepare_data_config.as_ref(),
            backup_name,
            &action,
            &mut all_finished,
            exist_failed,
        );
        Ok(group_state(request, stage, backup_name, &action, all_finished, exist_failed))
    }

    async fn drive_post_ready(
        &self,
        request: &mut RestoreRequest,
        set: &BackupActionSet,
        target: Option<&BackupStatusTarget>,
        step: usize,
    ) -> Result<GroupState> {
        let stage = RestoreStage::PostReady;
        let backup_name = set.backup_name();
        let action = action_name(stage, Some(step), target.map(|t| t.name.as_str()));
        let (finished, failed) = analyze_restore_actions(request, stage, backup_name, &action);
        if finished {
            return Ok(group_state(request, stage, backup_name, &action, finished, failed));
        }

        let tasks = self
            .manager
            .build_post_ready_tasks(request, set, target, step)
            .await?;
        let tasks = self.coordinator.submit_tasks(request, tasks).await?;
        let (all_finished, exist_failed) = self
            .coordinator
            .check_tasks_done(&mut request.status, stage, &action, backup_name, &tasks)
            .await?;
        Ok(group_state(request, stage, backup_name, &action, all_finished, exist_failed))
    }
}
