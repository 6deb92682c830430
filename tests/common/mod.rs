//! Shared fixtures for integration tests: record builders over the
//! in-memory control plane and a harness wiring up the engine.

#![allow(dead_code)]

pub mod builders;
pub mod strategies;

pub use builders::*;

use chrono::{DateTime, TimeZone, Utc};
use restore_core::config::RestoreEngineConfig;
use restore_core::control_plane::{FixedClock, MemoryControlPlane};
use restore_core::events::{EventPublisher, RestoreNotice};
use restore_core::models::RestoreRequest;
use restore_core::{ReconcileOutcome, RestoreEngine};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const NS: &str = "default";
pub const RESTORE_UID: &str = "7d0f6c1a-2b3c-4d5e-8f90-a1b2c3d4e5f6";
pub const RESTORE_NAME: &str = "restore-mysql";

/// 2024-01-01 at `hour:minute` UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
}

/// Engine plus handles on everything it talks to
pub struct TestEnv {
    pub cp: Arc<MemoryControlPlane>,
    pub publisher: Arc<EventPublisher>,
    pub clock: Arc<FixedClock>,
    pub engine: RestoreEngine,
    pub notices: broadcast::Receiver<RestoreNotice>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(RestoreEngineConfig::default())
    }

    pub fn with_config(config: RestoreEngineConfig) -> Self {
        let cp = Arc::new(MemoryControlPlane::new());
        let publisher = Arc::new(EventPublisher::new(256));
        let notices = publisher.subscribe();
        let clock = Arc::new(FixedClock::new(at(12, 0)));
        let engine = RestoreEngine::new(cp.clone(), publisher.clone(), clock.clone(), config);
        Self {
            cp,
            publisher,
            clock,
            engine,
            notices,
        }
    }

    pub async fn reconcile(&self, workload_ready: bool) -> ReconcileOutcome {
        self.engine
            .reconcile(NS, RESTORE_NAME, workload_ready)
            .await
            .expect("reconcile should not fail transiently")
    }

    pub fn restore(&self) -> RestoreRequest {
        self.cp.restore(NS, RESTORE_NAME).expect("restore request exists")
    }

    /// Names of the live tasks in the test namespace
    pub fn task_names(&self) -> Vec<String> {
        self.cp.tasks(NS).iter().map(|t| t.name().to_string()).collect()
    }

    pub fn complete(&self, task_name: &str) {
        self.cp.complete_task(NS, task_name).expect("task exists");
    }

    pub fn fail(&self, task_name: &str, message: &str) {
        self.cp.fail_task(NS, task_name, message).expect("task exists");
    }

    /// Reasons of every notice published so far
    pub fn drain_reasons(&mut self) -> Vec<String> {
        let mut reasons = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            reasons.push(notice.reason);
        }
        reasons
    }
}
