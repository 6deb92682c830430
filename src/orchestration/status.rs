//! Progress derived from recorded status actions.
//!
//! Nothing about stage progress is kept in memory between reconciliations;
//! every decision is recomputed from the restore request's status actions.

use crate::constants::TASK_HANDLE_PREFIX;
use crate::models::{PrepareDataConfig, RestoreRequest, RestoreStage, StatusAction};
use crate::state_machine::StatusActionState;

/// Status-action handle of a task
pub fn task_handle(task_name: &str) -> String {
    format!("{TASK_HANDLE_PREFIX}{task_name}")
}

/// Task name behind a status-action handle
pub fn task_name_from_handle(handle: &str) -> Option<&str> {
    handle.strip_prefix(TASK_HANDLE_PREFIX).filter(|n| !n.is_empty())
}

/// Whether the task named `task_name` is recorded as Completed
pub fn task_completed(actions: &[StatusAction], task_name: &str) -> bool {
    let handle = task_handle(task_name);
    actions
        .iter()
        .any(|a| a.task_handle == handle && a.status == StatusActionState::Completed)
}

/// Number of prepare-data tasks a backup set needs.
///
/// Zero without prepare-data configuration, the claim template's replicas
/// when a template is declared, one otherwise.
pub fn prepare_data_action_count(config: Option<&PrepareDataConfig>) -> usize {
    match config {
        None => 0,
        Some(config) => config
            .restore_volume_claims_template
            .as_ref()
            .map_or(1, |t| t.replicas as usize),
    }
}

/// `(all_finished, exist_failed)` of one (stage, backup, action) group.
///
/// The expected count of prepare-data actions is static; post-ready actions
/// are expected one per recorded entry. A group with nothing expected is
/// never finished.
pub fn analyze_restore_actions(
    request: &RestoreRequest,
    stage: RestoreStage,
    backup_name: &str,
    action_name: &str,
) -> (bool, bool) {
    let mut expected = match stage {
        RestoreStage::PrepareData => prepare_data_action_count(request.spec.prepare_data_config.as_ref()),
        RestoreStage::PostReady => 0,
    };
    let mut finished = 0;
    let mut failed = false;

    for action in request
        .actions(stage)
        .iter()
        .filter(|a| a.backup_name == backup_name && a.name == action_name)
    {
        if stage == RestoreStage::PostReady {
            expected += 1;
        }
        match action.status {
            StatusActionState::Failed => {
                finished += 1;
                failed = true;
            }
            StatusActionState::Completed => finished += 1,
            StatusActionState::Processing => {}
        }
    }
    (expected > 0 && finished == expected, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RestoreVolumeClaimsTemplate;

    fn action(backup: &str, name: &str, task: &str, status: StatusActionState) -> StatusAction {
        StatusAction {
            name: name.into(),
            backup_name: backup.into(),
            task_handle: task_handle(task),
            status,
            ..Default::default()
        }
    }

    fn request_with(replicas: Option<u32>, prepare: Vec<StatusAction>, post: Vec<StatusAction>) -> RestoreRequest {
        let mut request = RestoreRequest::default();
        request.spec.prepare_data_config = Some(PrepareDataConfig {
            restore_volume_claims_template: replicas.map(|replicas| RestoreVolumeClaimsTemplate {
                replicas,
                ..Default::default()
            }),
            ..Default::default()
        });
        request.status.actions.prepare_data = prepare;
        request.status.actions.post_ready = post;
        request
    }

    #[test]
    fn test_handles() {
        assert_eq!(task_handle("t0"), "job/t0");
        assert_eq!(task_name_from_handle("job/t0"), Some("t0"));
        assert_eq!(task_name_from_handle("job/"), None);
        assert_eq!(task_name_from_handle("pod/t0"), None);
    }

    #[test]
    fn test_prepare_data_action_count() {
        assert_eq!(prepare_data_action_count(None), 0);
        assert_eq!(prepare_data_action_count(Some(&PrepareDataConfig::default())), 1);
        let request = request_with(Some(3), vec![], vec![]);
        assert_eq!(prepare_data_action_count(request.spec.prepare_data_config.as_ref()), 3);
    }

    #[test]
    fn test_prepare_data_needs_static_count() {
        let request = request_with(
            Some(2),
            vec![action("b1", "prepare-data", "t0", StatusActionState::Completed)],
            vec![],
        );
        assert_eq!(analyze_restore_actions(&request, RestoreStage::PrepareData, "b1", "prepare-data"), (false, false));

        let request = request_with(
            Some(2),
            vec![
                action("b1", "prepare-data", "t0", StatusActionState::Completed),
                action("b1", "prepare-data", "t1", StatusActionState::Failed),
                action("b2", "prepare-data", "t2", StatusActionState::Processing),
            ],
            vec![],
        );
        assert_eq!(analyze_restore_actions(&request, RestoreStage::PrepareData, "b1", "prepare-data"), (true, true));
        assert!(task_completed(request.actions(RestoreStage::PrepareData), "t0"));
        assert!(!task_completed(request.actions(RestoreStage::PrepareData), "t1"));
    }

    #[test]
    fn test_post_ready_counts_recorded_entries() {
        let request = request_with(None, vec![], vec![]);
        assert_eq!(analyze_restore_actions(&request, RestoreStage::PostReady, "b1", "post-ready-0"), (false, false));

        let request = request_with(
            None,
            vec![],
            vec![
                action("b1", "post-ready-0", "p0", StatusActionState::Completed),
                action("b1", "post-ready-0", "p1", StatusActionState::Processing),
            ],
        );
        assert_eq!(analyze_restore_actions(&request, RestoreStage::PostReady, "b1", "post-ready-0"), (false, false));
    }
}
