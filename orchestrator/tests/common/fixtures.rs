//! Reusable test utilities:
//! - Common server records and fleet builders
//! - A scripted patch executor for pipeline tests
//! - Date/time helpers

// Allow unused code in test fixtures - not every suite uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use orchestrator::config::OrchestratorConfig;
use orchestrator::metrics::SyntheticMetrics;
use orchestrator::notify::LogNotifier;
use orchestrator::pipeline::{ExecutionReport, PatchExecutor, PatchOperation};
use orchestrator::registry::{InMemoryRegistry, Registry, ServerRecord};
use orchestrator::scheduler::CycleRunner;

/// Common test server names
pub mod servers {
    pub const DB_1: &str = "db01";
    pub const WEB_1: &str = "web01";
    pub const DEV_1: &str = "dev01";
}

/// Common test owners
pub mod owners {
    pub const ALICE: &str = "alice";
    pub const BOB: &str = "bob";
    pub const CAROL: &str = "carol";
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn server(name: &str, timezone: &str, host_group: &str, owner: &str) -> ServerRecord {
    ServerRecord::new(name, timezone, host_group, owner)
}

/// A small mixed fleet: one database, one application, one development host.
pub fn small_fleet() -> Vec<ServerRecord> {
    vec![
        server(servers::DB_1, "America/New_York", "database", owners::ALICE),
        server(servers::WEB_1, "America/New_York", "application", owners::BOB),
        server(servers::DEV_1, "Europe/Berlin", "development", owners::CAROL),
    ]
}

/// A report where every operation succeeded.
pub fn passing_report(operations: usize) -> ExecutionReport {
    ExecutionReport {
        operations: (0..operations)
            .map(|i| PatchOperation {
                name: format!("op-{}", i),
                succeeded: true,
                hard_error: false,
            })
            .collect(),
    }
}

/// A report with the given mix of outcomes.
pub fn mixed_report(succeeded: usize, failed: usize, hard_errors: usize) -> ExecutionReport {
    let mut operations = Vec::new();
    for i in 0..succeeded {
        operations.push(PatchOperation {
            name: format!("ok-{}", i),
            succeeded: true,
            hard_error: false,
        });
    }
    for i in 0..failed {
        operations.push(PatchOperation {
            name: format!("fail-{}", i),
            succeeded: false,
            hard_error: false,
        });
    }
    for i in 0..hard_errors {
        operations.push(PatchOperation {
            name: format!("hard-{}", i),
            succeeded: false,
            hard_error: true,
        });
    }
    ExecutionReport { operations }
}

/// Executor that replays fixed reports and counts calls per phase.
pub struct ScriptedExecutor {
    pub pre: ExecutionReport,
    pub exec: ExecutionReport,
    pub post: ExecutionReport,
    pub pre_calls: AtomicU32,
    pub exec_calls: AtomicU32,
    pub post_calls: AtomicU32,
}

impl ScriptedExecutor {
    pub fn passing() -> Self {
        Self::with_reports(passing_report(4), passing_report(6), passing_report(3))
    }

    pub fn with_reports(pre: ExecutionReport, exec: ExecutionReport, post: ExecutionReport) -> Self {
        Self {
            pre,
            exec,
            post,
            pre_calls: AtomicU32::new(0),
            exec_calls: AtomicU32::new(0),
            post_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PatchExecutor for ScriptedExecutor {
    async fn pre_checks(&self, _server: &ServerRecord) -> anyhow::Result<ExecutionReport> {
        self.pre_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pre.clone())
    }

    async fn execute(&self, _server: &ServerRecord) -> anyhow::Result<ExecutionReport> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.exec.clone())
    }

    async fn post_checks(&self, _server: &ServerRecord) -> anyhow::Result<ExecutionReport> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.post.clone())
    }
}

/// A cycle runner over an in-memory registry, with a log-only notifier
/// and synthetic metrics. Returns the registry handle for assertions.
pub fn test_runner(
    executor: Arc<dyn PatchExecutor>,
) -> (Arc<CycleRunner>, Arc<InMemoryRegistry>) {
    let registry = Arc::new(InMemoryRegistry::new());
    let shared: Arc<dyn Registry> = registry.clone();
    let runner = CycleRunner::new(
        Arc::new(OrchestratorConfig::default()),
        shared,
        Arc::new(LogNotifier),
        Arc::new(SyntheticMetrics::new(14)),
        executor,
    )
    .expect("default config should build a runner");
    (Arc::new(runner), registry)
}
