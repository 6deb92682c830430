use criterion::{black_box, criterion_group, criterion_main, Criterion};
use restore_core::builder::task_name;
use restore_core::control_plane::{MemoryControlPlane, SystemClock};
use restore_core::models::{
    ActionDefinition, ActionDefinitionSpec, Backup, BackupMethod, BackupPhase, BackupType, ObjectMeta, RestoreRequest,
    RestoreStage,
};
use restore_core::{EventPublisher, RestoreEngine, RestoreEngineConfig};
use std::sync::Arc;

const CHAIN_LENGTH: usize = 32;

fn backup(name: &str, action_set: &str, parent: Option<String>) -> Backup {
    let mut backup = Backup {
        metadata: ObjectMeta::named("default", name),
        ..Default::default()
    };
    backup.spec.parent_backup_name = parent;
    backup.status.phase = BackupPhase::Completed;
    backup.status.backup_method = Some(BackupMethod {
        name: "xtrabackup".into(),
        action_set_name: action_set.into(),
        ..Default::default()
    });
    backup
}

fn definition(name: &str, backup_type: BackupType) -> ActionDefinition {
    ActionDefinition {
        metadata: ObjectMeta::named("", name),
        spec: ActionDefinitionSpec {
            backup_type,
            env: vec![],
            restore: None,
        },
    }
}

/// Engine over a full backup followed by a long incremental chain
fn chain_engine() -> RestoreEngine {
    let cp = Arc::new(MemoryControlPlane::new());
    cp.insert_action_definition(definition("full", BackupType::Full));
    cp.insert_action_definition(definition("incremental", BackupType::Incremental));
    cp.insert_backup(backup("inc-base", "full", None));
    let mut parent = "inc-base".to_string();
    for i in 0..CHAIN_LENGTH {
        let name = format!("inc-{i}");
        cp.insert_backup(backup(&name, "incremental", Some(parent)));
        parent = name;
    }
    RestoreEngine::new(
        cp,
        Arc::new(EventPublisher::default()),
        Arc::new(SystemClock),
        RestoreEngineConfig::default(),
    )
}

fn benchmark_incremental_resolution(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let engine = chain_engine();
    let mut request = RestoreRequest {
        metadata: ObjectMeta::named("default", "restore-bench"),
        ..Default::default()
    };
    request.spec.backup.name = format!("inc-{}", CHAIN_LENGTH - 1);
    request.spec.backup.namespace = "default".into();

    c.bench_function("resolve_incremental_chain", |b| {
        b.iter(|| runtime.block_on(engine.resolver().resolve(black_box(&request))).unwrap())
    });
}

fn benchmark_task_naming(c: &mut Criterion) {
    let backup_name = "a-rather-long-backup-name-taken-by-the-nightly-schedule-20240101";
    c.bench_function("task_name_with_cut", |b| {
        b.iter(|| {
            task_name(
                RestoreStage::PrepareData,
                black_box("7d0f6c1a-2b3c-4d5e-8f90-a1b2c3d4e5f6"),
                black_box(backup_name),
                black_box(Some("mysql")),
                black_box(7),
                63,
            )
        })
    });
}

criterion_group!(benches, benchmark_incremental_resolution, benchmark_task_naming);
criterion_main!(benches);
