//! End-to-end reconciliation against the in-memory control plane, playing
//! the execution backend by hand between passes.

mod common;

use common::*;
use restore_core::config::RestoreEngineConfig;
use restore_core::constants::{annotations, containers, env as vars, labels, reasons};
use restore_core::control_plane::SystemClock;
use restore_core::models::{
    BackupType, ExecAction, ExecActionTarget, ExecutionPolicy, PodSelectionStrategy, RestorePhase, VolumeSnapshotRecord,
};
use restore_core::state_machine::StatusActionState;
use restore_core::{EventPublisher, ReconcileOutcome, RestoreEngine};
use std::collections::BTreeMap;
use std::sync::Arc;

fn task_name(backup: &str, index: usize) -> String {
    format!("restore-preparedata-7d0f6c1a-{backup}-{index}")
}

fn seed_full(env: &TestEnv, post_ready: Vec<restore_core::models::ActionSpec>) {
    env.cp
        .insert_action_definition(action_definition(FULL_ACTIONS, BackupType::Full, post_ready));
    env.cp.insert_backup(BackupBuilder::new("full").build());
}

/// Live tasks that have not reached a terminal condition
fn running_tasks(env: &TestEnv) -> Vec<String> {
    env.cp
        .tasks(NS)
        .into_iter()
        .filter(|t| !t.finished().0)
        .map(|t| t.name().to_string())
        .collect()
}

#[tokio::test]
async fn test_parallel_prepare_data_completes() {
    let mut env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(2, ExecutionPolicy::Parallel).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    assert_eq!(env.task_names(), vec![task_name("full", 0), task_name("full", 1)]);

    let claims: Vec<String> = env.cp.claims(NS).into_iter().map(|c| c.metadata.name).collect();
    assert_eq!(claims, vec!["data-mycluster-mysql-0", "data-mycluster-mysql-1"]);
    let claim = &env.cp.claims(NS)[1];
    assert_eq!(claim.metadata.label(labels::APP_POD_NAME), Some("mycluster-mysql-1"));
    assert_eq!(claim.metadata.label(labels::WORKLOAD_NAME), Some("mycluster-mysql"));

    let task = env.cp.task(NS, &task_name("full", 0)).unwrap();
    let restore = task.container(containers::PRIMARY).unwrap();
    assert_eq!(restore.image, RESTORE_IMAGE);
    assert!(restore
        .env
        .iter()
        .any(|e| e.name == vars::DP_BACKUP_NAME && e.value.as_deref() == Some("full")));
    assert!(task.container(containers::BARRIER).is_some());
    assert_eq!(task.metadata.owner_references.len(), 1);
    assert_eq!(task.metadata.label(labels::RESTORE_NAME), Some(RESTORE_NAME));

    let status = env.restore().status;
    assert_eq!(status.phase, RestorePhase::Running);
    assert_eq!(status.actions.prepare_data.len(), 2);
    assert!(status
        .actions
        .prepare_data
        .iter()
        .all(|a| a.status == StatusActionState::Processing && a.name == "prepare-data"));

    env.complete(&task_name("full", 0));
    env.complete(&task_name("full", 1));
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::Completed);

    let restore = env.restore();
    assert_eq!(restore.status.phase, RestorePhase::Completed);
    assert_eq!(restore.status.completion_timestamp, Some(at(12, 0)));
    assert!(restore
        .status
        .actions
        .prepare_data
        .iter()
        .all(|a| a.status == StatusActionState::Completed));

    let published = env.drain_reasons();
    assert_eq!(
        published.iter().filter(|r| *r == reasons::CREATE_RESTORE_TASK).count(),
        2
    );
    assert!(published.contains(&reasons::RESTORE_COMPLETED.to_string()));
}

#[tokio::test]
async fn test_submission_is_idempotent() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(2, ExecutionPolicy::Parallel).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    let status = env.restore().status;
    for _ in 0..3 {
        assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    }

    assert_eq!(env.cp.created_task_names().len(), 2);
    assert_eq!(env.cp.claims(NS).len(), 2);
    assert_eq!(env.restore().status, status);
}

#[tokio::test]
async fn test_serial_runs_one_task_at_a_time() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(3, ExecutionPolicy::Serial).build());

    let mut outcome = ReconcileOutcome::InProgress;
    for _ in 0..12 {
        outcome = env.reconcile(false).await;
        assert!(running_tasks(&env).len() <= 1, "more than one serial task running");
        if outcome != ReconcileOutcome::InProgress {
            break;
        }
        for name in running_tasks(&env) {
            env.complete(&name);
        }
    }

    assert_eq!(outcome, ReconcileOutcome::Completed);
    assert_eq!(
        env.cp.created_task_names(),
        vec![task_name("full", 0), task_name("full", 1), task_name("full", 2)]
    );
    let deleted = env.cp.deleted_task_names();
    assert!(deleted.contains(&task_name("full", 0)));
    assert!(deleted.contains(&task_name("full", 1)));

    let actions = env.restore().status.actions.prepare_data;
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().all(|a| a.status == StatusActionState::Completed));
}

#[tokio::test]
async fn test_completion_recomputed_after_restart() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(2, ExecutionPolicy::Parallel).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    env.complete(&task_name("full", 0));
    env.complete(&task_name("full", 1));

    // A fresh engine over the same records picks up where the first left off.
    let restarted = RestoreEngine::new(
        env.cp.clone(),
        Arc::new(EventPublisher::default()),
        Arc::new(SystemClock),
        RestoreEngineConfig::default(),
    );
    let outcome = restarted.reconcile(NS, RESTORE_NAME, false).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Completed);
    assert_eq!(env.cp.created_task_names().len(), 2);
}

#[tokio::test]
async fn test_parallel_failures_are_aggregated() {
    let mut env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(2, ExecutionPolicy::Parallel).build());

    env.reconcile(false).await;
    env.fail(&task_name("full", 0), "xtrabackup exited with 1");
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);

    env.complete(&task_name("full", 1));
    let outcome = env.reconcile(false).await;
    let ReconcileOutcome::Failed(message) = outcome.clone() else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("xtrabackup exited with 1"), "{message}");

    let restore = env.restore();
    assert_eq!(restore.status.phase, RestorePhase::Failed);
    let failed = restore
        .status
        .actions
        .prepare_data
        .iter()
        .find(|a| a.status == StatusActionState::Failed)
        .unwrap();
    assert_eq!(failed.task_handle, format!("job/{}", task_name("full", 0)));
    assert!(env.drain_reasons().contains(&reasons::RESTORE_FAILED.to_string()));
}

#[tokio::test]
async fn test_barriers_released_once_all_restores_exit() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(2, ExecutionPolicy::Parallel).build());
    env.reconcile(false).await;

    let pod0 = env.cp.start_task_pod(NS, &task_name("full", 0)).unwrap();
    let pod1 = env.cp.start_task_pod(NS, &task_name("full", 1)).unwrap();
    env.cp.terminate_container(NS, &pod0, containers::PRIMARY, 0).unwrap();
    env.reconcile(false).await;
    assert_eq!(
        env.cp.pod(NS, &pod0).unwrap().metadata.annotation(annotations::STOP_BARRIER),
        None
    );

    env.cp.terminate_container(NS, &pod1, containers::PRIMARY, 0).unwrap();
    env.reconcile(false).await;
    for pod in [&pod0, &pod1] {
        assert_eq!(
            env.cp.pod(NS, pod).unwrap().metadata.annotation(annotations::STOP_BARRIER),
            Some("true")
        );
    }
}

#[tokio::test]
async fn test_abnormal_exit_releases_own_barrier() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(2, ExecutionPolicy::Parallel).build());
    env.reconcile(false).await;

    let pod0 = env.cp.start_task_pod(NS, &task_name("full", 0)).unwrap();
    let pod1 = env.cp.start_task_pod(NS, &task_name("full", 1)).unwrap();
    env.cp.terminate_container(NS, &pod0, containers::PRIMARY, 2).unwrap();
    env.reconcile(false).await;

    assert_eq!(
        env.cp.pod(NS, &pod0).unwrap().metadata.annotation(annotations::STOP_BARRIER),
        Some("true")
    );
    assert_eq!(
        env.cp.pod(NS, &pod1).unwrap().metadata.annotation(annotations::STOP_BARRIER),
        None
    );
}

#[tokio::test]
async fn test_post_ready_waits_for_workload() {
    let env = TestEnv::new();
    seed_full(&env, vec![job_step("import.sh")]);
    env.cp.insert_pod(workload_pod("mysql-0"));
    env.cp.insert_pod(workload_pod("mysql-1"));
    env.cp.insert_restore(
        RestoreBuilder::new("full")
            .with_claim_template(1, ExecutionPolicy::Parallel)
            .with_job_target(PodSelectionStrategy::Any)
            .build(),
    );

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    env.complete(&task_name("full", 0));
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    assert_eq!(env.cp.created_task_names().len(), 1);

    assert_eq!(env.reconcile(true).await, ReconcileOutcome::InProgress);
    let post_ready = "restore-post-ready-7d0f6c1a-full-0-0";
    assert_eq!(env.cp.created_task_names().last().map(String::as_str), Some(post_ready));

    let task = env.cp.task(NS, post_ready).unwrap();
    let env_vars = &task.container(containers::PRIMARY).unwrap().env;
    assert!(env_vars
        .iter()
        .any(|e| e.name == vars::DP_DB_HOST && e.value.as_deref() == Some("10.0.0.12")));

    let actions = env.restore().status.actions.post_ready;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].name, "post-ready-0");

    env.complete(post_ready);
    assert_eq!(env.reconcile(true).await, ReconcileOutcome::Completed);
}

#[tokio::test]
async fn test_post_ready_without_target_pods_is_transient() {
    let env = TestEnv::new();
    env.cp.insert_action_definition(post_ready_only_definition(
        FULL_ACTIONS,
        BackupType::Full,
        vec![job_step("import.sh")],
    ));
    env.cp.insert_backup(BackupBuilder::new("full").build());
    env.cp.insert_restore(
        RestoreBuilder::new("full")
            .with_job_target(PodSelectionStrategy::Any)
            .build(),
    );

    let err = env.engine.reconcile(NS, RESTORE_NAME, true).await.unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(env.restore().status.phase, RestorePhase::Running);

    env.cp.insert_pod(workload_pod("mysql-0"));
    assert_eq!(env.reconcile(true).await, ReconcileOutcome::InProgress);
}

#[tokio::test]
async fn test_exec_post_ready_runs_in_controller_namespace() {
    let config = RestoreEngineConfig {
        controller_namespace: Some("kb-system".into()),
        ..Default::default()
    };
    let env = TestEnv::with_config(config);
    env.cp.insert_action_definition(post_ready_only_definition(
        FULL_ACTIONS,
        BackupType::Full,
        vec![exec_step("mysql -e 'FLUSH PRIVILEGES'")],
    ));
    env.cp.insert_backup(BackupBuilder::new("full").build());
    env.cp.insert_pod(workload_pod("mysql-0"));
    env.cp.insert_pod(workload_pod("mysql-1"));
    let mut request = RestoreBuilder::new("full").build();
    request.spec.ready_config = Some(restore_core::models::ReadyConfig {
        exec_action: Some(ExecAction {
            target: ExecActionTarget {
                pod_selector: app_selector(),
            },
        }),
        ..Default::default()
    });
    env.cp.insert_restore(request);

    assert_eq!(env.reconcile(true).await, ReconcileOutcome::InProgress);

    let tasks = env.cp.tasks("kb-system");
    assert_eq!(tasks.len(), 2);
    let task = &tasks[1];
    assert!(task.metadata.owner_references.is_empty());
    assert_eq!(task.metadata.label(labels::RESTORE_NAMESPACE), Some(NS));
    assert_eq!(task.spec.service_account_name.as_deref(), Some("restore-exec-worker"));

    let container = task.container(containers::PRIMARY).unwrap();
    assert_eq!(container.command, vec!["kubectl"]);
    assert_eq!(
        container.args,
        vec!["-n", NS, "exec", "mysql-1", "-c", "mysql", "--", "sh", "-c", "mysql -e 'FLUSH PRIVILEGES'"]
    );
    assert!(container.env.iter().all(|e| e.name != vars::DP_BACKUP_NAME));
}

#[tokio::test]
async fn test_exec_post_ready_without_controller_namespace() {
    let env = TestEnv::new();
    env.cp.insert_action_definition(post_ready_only_definition(
        FULL_ACTIONS,
        BackupType::Full,
        vec![exec_step("mysql -e 'FLUSH PRIVILEGES'")],
    ));
    env.cp.insert_backup(BackupBuilder::new("full").build());
    env.cp.insert_pod(workload_pod("mysql-0"));
    let mut request = RestoreBuilder::new("full").build();
    request.spec.ready_config = Some(restore_core::models::ReadyConfig {
        exec_action: Some(ExecAction {
            target: ExecActionTarget {
                pod_selector: app_selector(),
            },
        }),
        ..Default::default()
    });
    env.cp.insert_restore(request);

    assert_eq!(env.reconcile(true).await, ReconcileOutcome::InProgress);

    let tasks = env.cp.tasks(NS);
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.spec.service_account_name, None);
    let container = task.container(containers::PRIMARY).unwrap();
    assert!(container.env.is_empty(), "{:?}", container.env);
}

#[tokio::test]
async fn test_snapshot_backup_restores_claims_from_snapshots() {
    let env = TestEnv::new();
    let mut backup = BackupBuilder::new("snap").with_actions("").build();
    if let Some(method) = backup.status.backup_method.as_mut() {
        method.snapshot_volumes = Some(true);
    }
    backup.status.volume_snapshots = vec![VolumeSnapshotRecord {
        target_pod_name: "mysql-0".into(),
        snapshots: BTreeMap::from([("data".to_string(), "snap-data-7f2k".to_string())]),
    }];
    env.cp.insert_backup(backup);
    env.cp
        .insert_restore(RestoreBuilder::new("snap").with_claim_template(2, ExecutionPolicy::Parallel).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::Completed);
    assert!(env.cp.created_task_names().is_empty());

    let claims = env.cp.claims(NS);
    assert_eq!(claims.len(), 2);
    for claim in &claims {
        let source = claim.spec.data_source.as_ref().unwrap();
        assert_eq!(source.kind, "VolumeSnapshot");
        assert_eq!(source.name, "snap-data-7f2k");
    }
    assert!(env.restore().status.actions.prepare_data.is_empty());
}

#[tokio::test]
async fn test_snapshot_legacy_name_preferred() {
    let env = TestEnv::new();
    let mut backup = BackupBuilder::new("snap").with_actions("").build();
    if let Some(method) = backup.status.backup_method.as_mut() {
        method.snapshot_volumes = Some(true);
    }
    env.cp.insert_backup(backup);
    env.cp.insert_volume_snapshot(NS, "snap-data");
    env.cp
        .insert_restore(RestoreBuilder::new("snap").with_claim_template(1, ExecutionPolicy::Parallel).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::Completed);
    let claims = env.cp.claims(NS);
    assert_eq!(
        claims[0].spec.data_source.as_ref().map(|s| s.name.as_str()),
        Some("snap-data")
    );
}

#[tokio::test]
async fn test_volume_populate_task_mounts_claim_in_place() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    let mut request = RestoreBuilder::new("full").build();
    request.spec.prepare_data_config = Some(restore_core::models::PrepareDataConfig {
        data_source_ref: Some(restore_core::models::VolumeConfig {
            volume_source: Some("data".into()),
            mount_path: Some("/var/lib/mysql".into()),
        }),
        ..Default::default()
    });
    let claim = restore_core::models::VolumeClaim {
        metadata: restore_core::models::ObjectMeta::named(NS, "data-mycluster-mysql-0"),
        ..Default::default()
    };

    let lineage = env.engine.resolver().resolve(&request).await.unwrap();
    let set = &lineage.prepare_data[0];
    let task = env
        .engine
        .manager()
        .build_volume_populate_task(&request, set, None, &claim, 0)
        .await
        .unwrap()
        .expect("data source reference declared");

    assert_eq!(task.name(), "data-mycluster-mysql-0-0");
    assert_eq!(task.metadata.label(labels::POPULATE_CLAIM), Some("data-mycluster-mysql-0"));
    let restore = task.container(containers::PRIMARY).unwrap();
    assert!(restore
        .volume_mounts
        .iter()
        .any(|m| m.mount_path == "/var/lib/mysql"));

    // Without a data source reference there is nothing to populate.
    let plain = RestoreBuilder::new("full").build();
    assert!(env
        .engine
        .manager()
        .build_volume_populate_task(&plain, set, None, &claim, 0)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_every_backup_target_gets_its_own_tasks() {
    let env = TestEnv::new();
    env.cp
        .insert_action_definition(action_definition(FULL_ACTIONS, BackupType::Full, vec![]));
    env.cp
        .insert_backup(BackupBuilder::new("full").with_targets(&["mysql", "proxy"]).build());
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(1, ExecutionPolicy::Parallel).build());

    let mysql_task = "restore-preparedata-7d0f6c1a-full-mysql-0";
    let proxy_task = "restore-preparedata-7d0f6c1a-full-proxy-0";

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    assert_eq!(env.cp.created_task_names(), vec![mysql_task]);

    // The second target starts only once the first has finished.
    env.complete(mysql_task);
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    assert_eq!(env.cp.created_task_names(), vec![mysql_task, proxy_task]);

    env.complete(proxy_task);
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::Completed);

    let recorded: Vec<(String, String)> = env
        .restore()
        .status
        .actions
        .prepare_data
        .into_iter()
        .map(|a| (a.name, a.task_handle))
        .collect();
    assert_eq!(
        recorded,
        vec![
            ("prepare-data-mysql".to_string(), format!("job/{mysql_task}")),
            ("prepare-data-proxy".to_string(), format!("job/{proxy_task}")),
        ]
    );
}

#[tokio::test]
async fn test_serial_failure_stops_remaining_indices() {
    let mut env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(3, ExecutionPolicy::Serial).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    assert_eq!(env.cp.created_task_names(), vec![task_name("full", 0)]);

    env.fail(&task_name("full", 0), "xtrabackup exited with 1");
    let outcome = env.reconcile(false).await;
    let ReconcileOutcome::Failed(message) = outcome.clone() else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("xtrabackup exited with 1"), "{message}");
    assert_eq!(env.restore().status.phase, RestorePhase::Failed);
    assert!(env.drain_reasons().contains(&reasons::RESTORE_FAILED.to_string()));

    // Terminal requests build nothing further.
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::Failed(message));
    assert_eq!(env.cp.created_task_names(), vec![task_name("full", 0)]);
}

#[tokio::test]
async fn test_serial_progress_recomputed_after_restart() {
    let env = TestEnv::new();
    seed_full(&env, vec![]);
    env.cp
        .insert_restore(RestoreBuilder::new("full").with_claim_template(3, ExecutionPolicy::Serial).build());

    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);
    env.complete(&task_name("full", 0));
    // Records index 0 as Completed; one of three is not enough to finish.
    assert_eq!(env.reconcile(false).await, ReconcileOutcome::InProgress);

    let restarted = RestoreEngine::new(
        env.cp.clone(),
        Arc::new(EventPublisher::default()),
        Arc::new(SystemClock),
        RestoreEngineConfig::default(),
    );
    let outcome = restarted.reconcile(NS, RESTORE_NAME, false).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::InProgress);
    assert_eq!(
        env.cp.created_task_names(),
        vec![task_name("full", 0), task_name("full", 1)]
    );
    assert!(env.cp.deleted_task_names().contains(&task_name("full", 0)));

    env.complete(&task_name("full", 1));
    let outcome = restarted.reconcile(NS, RESTORE_NAME, false).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::InProgress);
    let outcome = restarted.reconcile(NS, RESTORE_NAME, false).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::InProgress);
    assert_eq!(
        env.cp.created_task_names(),
        vec![task_name("full", 0), task_name("full", 1), task_name("full", 2)]
    );
}
