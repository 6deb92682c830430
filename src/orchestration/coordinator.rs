//! # Execution Coordinator
//!
//! Submits restore tasks idempotently, folds their observed state into the
//! restore status, and releases barrier sidecars once every task of a group
//! has finished its restore work.
//!
//! ## Barrier release
//!
//! A task counts as finished for the barrier when it is Complete or Failed,
//! or when its primary container already exited with code 0 even though the
//! task itself is still running (the sidecar keeps it alive). Once every
//! submitted task of the group is finished, the stop marker is written on
//! all of their pods. A primary container that exits abnormally gets its own
//! marker immediately so the task can fail without waiting for its peers.

use super::status::{prepare_data_action_count, task_handle};
use crate::constants::{annotations, containers, reasons};
use crate::control_plane::{Clock, ControlPlane};
use crate::error::{ignore_already_exists, ignore_not_found, Result};
use crate::events::EventRecorder;
use crate::logging::log_task_operation;
use crate::models::{
    ObjectMeta, OwnerReference, Pod, PrepareDataConfig, RestoreRequest, RestoreStage, RestoreStatus, StatusAction,
    Task,
};
use crate::state_machine::{count_actions, upsert_status_action, StatusActionState};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

const BARRIER_RELEASED: &str = "true";

/// Link `dependent` to the restore request unless it is already linked
fn set_owner(dependent: &mut ObjectMeta, owner: &RestoreRequest) {
    if dependent
        .owner_references
        .iter()
        .any(|r| !owner.uid().is_empty() && r.uid == owner.uid())
    {
        return;
    }
    dependent.owner_references.push(OwnerReference {
        kind: "Restore".to_string(),
        name: owner.name().to_string(),
        uid: owner.uid().to_string(),
        controller: true,
    });
}

/// Adjust a group's completion under the `Serial` policy.
///
/// Any failure ends the group. Otherwise the group is only finished once as
/// many actions are recorded as the static target count, since a serial
/// group submits one task at a time.
pub fn recalculate(
    status: &RestoreStatus,
    config: Option<&PrepareDataConfig>,
    backup_name: &str,
    action_name: &str,
    all_finished: &mut bool,
    exist_failed: bool,
) {
    let Some(config) = config.filter(|c| c.is_serial_policy()) else {
        return;
    };
    if exist_failed {
        *all_finished = true;
        return;
    }
    let recorded = count_actions(&status.actions.prepare_data, backup_name, action_name, None);
    if recorded != prepare_data_action_count(Some(config)) {
        *all_finished = false;
    }
}

#[derive(Clone)]
pub struct ExecutionCoordinator {
    control_plane: Arc<dyn ControlPlane>,
    recorder: Arc<dyn EventRecorder>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator").finish_non_exhaustive()
    }
}

impl ExecutionCoordinator {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            control_plane,
            recorder,
            clock,
        }
    }

    /// Create every task that does not exist yet.
    ///
    /// Returns the tasks as stored: fetched when they already existed, as
    /// submitted otherwise. Tasks in the owner's namespace are linked to it.
    #[instrument(skip(self, owner, tasks), fields(restore = %owner.name(), count = tasks.len()))]
    pub async fn submit_tasks(&self, owner: &RestoreRequest, tasks: Vec<Task>) -> Result<Vec<Task>> {
        let mut submitted = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            match self.control_plane.get_task(task.namespace(), task.name()).await {
                Ok(existing) => {
                    submitted.push(existing);
                    continue;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }

            if task.namespace() == owner.namespace() {
                set_owner(&mut task.metadata, owner);
            }
            ignore_already_exists(self.control_plane.create_task(&task).await)?;
            self.recorder.normal(
                &owner.object_ref(),
                reasons::CREATE_RESTORE_TASK,
                &format!("created task {}/{}", task.namespace(), task.name()),
            );
            log_task_operation(
                "create",
                task.name(),
                &task.spec.stage.to_string(),
                None,
                "submitted",
                None,
            );
            submitted.push(task);
        }
        Ok(submitted)
    }

    /// Record the observed state of `tasks` on `status` and release barriers.
    ///
    /// Returns `(all_finished, exist_failed)` for the group.
    #[instrument(skip(self, status, tasks), fields(count = tasks.len()))]
    pub async fn check_tasks_done(
        &self,
        status: &mut RestoreStatus,
        stage: RestoreStage,
        action_name: &str,
        backup_name: &str,
        tasks: &[Task],
    ) -> Result<(bool, bool)> {
        let now = self.clock.now();
        let mut all_finished = true;
        let mut exist_failed = false;
        let mut finished_count = 0;

        for task in tasks {
            let mut observed = StatusAction {
                name: action_name.to_string(),
                backup_name: backup_name.to_string(),
                task_handle: task_handle(task.name()),
                ..Default::default()
            };
            match task.finished() {
                (true, Some(message)) => {
                    exist_failed = true;
                    finished_count += 1;
                    observed.status = StatusActionState::Failed;
                    observed.message = Some(message);
                }
                (true, None) => {
                    finished_count += 1;
                    observed.status = StatusActionState::Completed;
                }
                (false, _) => {
                    all_finished = false;
                    observed.status = StatusActionState::Processing;
                    if self.restore_container_terminated(task).await? {
                        finished_count += 1;
                    }
                }
            }
            let outcome = upsert_status_action(status.actions.stage_mut(stage), observed, now);
            debug!(task = %task.name(), ?outcome, "Status action observed");
        }

        if finished_count == tasks.len() {
            try_join_all(tasks.iter().map(|task| self.stop_barriers_for_task(task))).await?;
        }
        Ok((all_finished, exist_failed))
    }

    /// Whether the primary container of a task pod exited with code 0.
    ///
    /// A pod whose primary container exited abnormally has its barrier
    /// released right away.
    async fn restore_container_terminated(&self, task: &Task) -> Result<bool> {
        let pods = self
            .control_plane
            .list_task_pods(task.namespace(), task.name())
            .await?;
        let mut normal = false;
        for pod in &pods {
            let Some(terminated) = pod
                .container_status(containers::PRIMARY)
                .and_then(|s| s.terminated.as_ref())
            else {
                continue;
            };
            if terminated.exit_code == 0 {
                normal = true;
            } else {
                self.stop_barrier(pod).await?;
            }
        }
        Ok(normal)
    }

    /// Release the barrier of every pod of `task`
    pub async fn stop_barriers_for_task(&self, task: &Task) -> Result<()> {
        let pods = self
            .control_plane
            .list_task_pods(task.namespace(), task.name())
            .await?;
        for pod in &pods {
            self.stop_barrier(pod).await?;
        }
        Ok(())
    }

    /// Write the stop marker on one pod; no-op when already written
    pub async fn stop_barrier(&self, pod: &Pod) -> Result<()> {
        if pod.metadata.annotation(annotations::STOP_BARRIER) == Some(BARRIER_RELEASED) {
            return Ok(());
        }
        debug!(pod = %pod.name(), "Releasing restore barrier");
        let patch = BTreeMap::from([(
            annotations::STOP_BARRIER.to_string(),
            BARRIER_RELEASED.to_string(),
        )]);
        ignore_not_found(
            self.control_plane
                .patch_pod_annotations(&pod.metadata.namespace, pod.name(), &patch)
                .await,
        )
    }
}
