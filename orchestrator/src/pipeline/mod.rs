//! Lifecycle pipeline: pre-check, trigger, execution, validation
//!
//! One poll advances one server's run by at most one logical step.
//! Entry into pre-checks and into the execution trigger is time-gated
//! against the server's scheduled instant resolved to UTC in its own
//! zone; a wider window precedes pre-checks than the trigger itself.
//! Unapproved servers never progress past `not_started`.

mod run;

pub use run::{PipelineRun, Stage};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::calendar::Quarter;
use crate::errors::{OrchestratorError, ValidationFailure};
use crate::notify::Notifier;
use crate::registry::{ServerRecord, ServerStatus};
use crate::timezone;

/// Outcome of one patch sub-operation or check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOperation {
    pub name: String,
    pub succeeded: bool,
    /// Hard errors fail the batch regardless of the success ratio.
    pub hard_error: bool,
}

/// Batch result returned by the execution collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub operations: Vec<PatchOperation>,
}

impl ExecutionReport {
    pub fn success_ratio(&self) -> f64 {
        if self.operations.is_empty() {
            return 1.0;
        }
        let succeeded = self.operations.iter().filter(|op| op.succeeded).count();
        succeeded as f64 / self.operations.len() as f64
    }

    pub fn hard_errors(&self) -> u32 {
        self.operations.iter().filter(|op| op.hard_error).count() as u32
    }
}

/// External execution collaborator. Retry policy for the actual patch
/// run lives on the other side of this trait, not in the pipeline.
#[async_trait]
pub trait PatchExecutor: Send + Sync {
    /// Readiness checks ahead of the window (reachability, disk, agent).
    async fn pre_checks(&self, server: &ServerRecord) -> Result<ExecutionReport>;

    /// Run the patch batch and report per-operation outcomes.
    async fn execute(&self, server: &ServerRecord) -> Result<ExecutionReport>;

    /// Post-patch health checks.
    async fn post_checks(&self, server: &ServerRecord) -> Result<ExecutionReport>;
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub precheck_window_hours: i64,
    pub trigger_window_hours: i64,
    pub validation_threshold: f64,
    pub max_precheck_attempts: u32,
    /// Hours past the scheduled instant before an untriggered run
    /// counts as a missed window.
    pub missed_window_grace_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use crate::constants::pipeline;
        Self {
            precheck_window_hours: pipeline::PRECHECK_WINDOW_HOURS,
            trigger_window_hours: pipeline::TRIGGER_WINDOW_HOURS,
            validation_threshold: pipeline::VALIDATION_SUCCESS_THRESHOLD,
            max_precheck_attempts: 3,
            missed_window_grace_hours: pipeline::MISSED_WINDOW_GRACE_HOURS,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    executor: Arc<dyn PatchExecutor>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        executor: Arc<dyn PatchExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            executor,
            notifier,
        }
    }

    /// Resolve the server's local scheduled wall-clock to UTC. An
    /// unknown zone is a configuration error and aborts the poll.
    fn scheduled_instant(
        &self,
        server: &ServerRecord,
        quarter: Quarter,
    ) -> Result<Option<DateTime<Utc>>, OrchestratorError> {
        let schedule = server.schedules.get(quarter);
        let (Some(date), Some(time)) = (schedule.patch_date, schedule.patch_time) else {
            return Ok(None);
        };
        let utc = timezone::to_utc(date.and_time(time), &server.timezone)?;
        Ok(Some(utc))
    }

    /// Advance one run by at most one step. Returns the stage the run
    /// is in after the poll. Validation-threshold failures move the run
    /// to `failed` and escalate, but do not surface as errors.
    pub async fn poll(
        &self,
        run: &mut PipelineRun,
        server: &mut ServerRecord,
        now: DateTime<Utc>,
    ) -> Result<Stage, OrchestratorError> {
        if run.stage.is_terminal() {
            return Ok(run.stage);
        }

        // An unapproved server never progresses, whatever stage the
        // caller thinks it is in.
        let approval = server.schedules.get(run.quarter).approval;
        if !approval.is_approved() {
            warn!(
                "Skipping pipeline for {}: approval is '{}' for {}",
                server.name,
                approval.as_str(),
                run.quarter
            );
            return Ok(run.stage);
        }

        let Some(scheduled) = self.scheduled_instant(server, run.quarter)? else {
            warn!(
                "Skipping pipeline for {}: approved but no schedule for {}",
                server.name, run.quarter
            );
            return Ok(run.stage);
        };

        // A poll arriving past the grace bound means the orchestrator
        // was down for the window itself; an untriggered run fails and
        // escalates instead of firing late.
        let window_closes = scheduled + Duration::hours(self.config.missed_window_grace_hours);
        if now > window_closes
            && matches!(
                run.stage,
                Stage::NotStarted | Stage::Precheck | Stage::AwaitingTrigger
            )
        {
            self.fail_run(
                run,
                server,
                format!(
                    "missed execution window: scheduled {}, not triggered by {}",
                    scheduled, window_closes
                ),
            )
            .await;
            return Ok(run.stage);
        }

        match run.stage {
            Stage::NotStarted => {
                let opens = scheduled - Duration::hours(self.config.precheck_window_hours);
                if now < opens {
                    return Ok(run.stage);
                }
                run.advance(Stage::Precheck);
                self.run_prechecks(run, server).await
            }
            Stage::Precheck => self.run_prechecks(run, server).await,
            Stage::AwaitingTrigger => {
                let opens = scheduled - Duration::hours(self.config.trigger_window_hours);
                if now < opens {
                    return Ok(run.stage);
                }
                self.run_execution(run, server).await
            }
            Stage::PostCheck => self.run_postchecks(run, server).await,
            // Executing/Validating are transient within a single poll;
            // landing here means a previous poll was interrupted, so
            // treat the execution outcome as unknown and fail safe.
            Stage::Executing | Stage::Validating => {
                self.fail_run(
                    run,
                    server,
                    "interrupted during execution; outcome unknown".to_string(),
                )
                .await;
                Ok(run.stage)
            }
            Stage::Completed | Stage::Failed => Ok(run.stage),
        }
    }

    async fn run_prechecks(
        &self,
        run: &mut PipelineRun,
        server: &mut ServerRecord,
    ) -> Result<Stage, OrchestratorError> {
        match self.executor.pre_checks(server).await {
            Ok(report) => match self.check_threshold(&server.name, "precheck", &report) {
                Ok(ratio) => {
                    info!(
                        "Pre-checks passed for {} ({:.0}% of {} checks)",
                        server.name,
                        ratio * 100.0,
                        report.operations.len()
                    );
                    run.advance(Stage::AwaitingTrigger);
                    Ok(run.stage)
                }
                Err(failure) => self.retry_or_fail(run, server, failure.to_string()).await,
            },
            Err(e) => {
                self.retry_or_fail(run, server, format!("pre-check call failed: {}", e))
                    .await
            }
        }
    }

    async fn retry_or_fail(
        &self,
        run: &mut PipelineRun,
        server: &mut ServerRecord,
        failure: String,
    ) -> Result<Stage, OrchestratorError> {
        let attempts = run.record_attempt(Stage::Precheck, failure.clone());
        if attempts >= self.config.max_precheck_attempts {
            self.fail_run(run, server, failure).await;
        } else {
            warn!(
                "Pre-check attempt {}/{} failed for {}: {}",
                attempts, self.config.max_precheck_attempts, server.name, failure
            );
            run.advance(Stage::NotStarted);
        }
        Ok(run.stage)
    }

    async fn run_execution(
        &self,
        run: &mut PipelineRun,
        server: &mut ServerRecord,
    ) -> Result<Stage, OrchestratorError> {
        run.advance(Stage::Executing);
        server.status = ServerStatus::Running;
        server.touch();
        info!("Trigger window open; executing patch run for {}", server.name);

        let report = match self.executor.execute(server).await {
            Ok(report) => report,
            Err(e) => {
                // Retrying the patch run itself belongs to the external
                // executor, not this layer.
                self.fail_run(run, server, format!("execution call failed: {}", e))
                    .await;
                return Ok(run.stage);
            }
        };

        run.advance(Stage::Validating);
        match self.check_threshold(&server.name, "patch validation", &report) {
            Ok(ratio) => {
                info!(
                    "Patch validation passed for {} ({:.0}% of {} operations)",
                    server.name,
                    ratio * 100.0,
                    report.operations.len()
                );
                run.advance(Stage::PostCheck);
                Ok(run.stage)
            }
            Err(failure) => {
                self.fail_run(run, server, failure.to_string()).await;
                Ok(run.stage)
            }
        }
    }

    async fn run_postchecks(
        &self,
        run: &mut PipelineRun,
        server: &mut ServerRecord,
    ) -> Result<Stage, OrchestratorError> {
        let report = match self.executor.post_checks(server).await {
            Ok(report) => report,
            Err(e) => {
                self.fail_run(run, server, format!("post-check call failed: {}", e))
                    .await;
                return Ok(run.stage);
            }
        };

        match self.check_threshold(&server.name, "post-patch validation", &report) {
            Ok(_) => {
                run.advance(Stage::Completed);
                server.status = ServerStatus::Completed;
                server.touch();
                info!("Pipeline completed for {} ({})", server.name, run.quarter);
                Ok(run.stage)
            }
            Err(failure) => {
                self.fail_run(run, server, failure.to_string()).await;
                Ok(run.stage)
            }
        }
    }

    fn check_threshold(
        &self,
        server_name: &str,
        stage: &str,
        report: &ExecutionReport,
    ) -> Result<f64, ValidationFailure> {
        let ratio = report.success_ratio();
        let hard_errors = report.hard_errors();
        if ratio >= self.config.validation_threshold && hard_errors == 0 {
            Ok(ratio)
        } else {
            Err(ValidationFailure {
                server_name: server_name.to_string(),
                stage: stage.to_string(),
                success_ratio: ratio,
                hard_errors,
            })
        }
    }

    async fn fail_run(&self, run: &mut PipelineRun, server: &mut ServerRecord, failure: String) {
        error!("Pipeline failed for {}: {}", server.name, failure);
        run.last_failure = Some(failure.clone());
        run.advance(Stage::Failed);
        server.status = ServerStatus::Failed;
        server.touch();

        let subject = format!("Patch pipeline failed: {} ({})", server.name, run.quarter);
        if let Err(e) = self
            .notifier
            .send(&server.primary_owner, &subject, &failure, false)
            .await
        {
            warn!("Escalation for {} not delivered: {}", server.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Quarter;
    use crate::notify::LogNotifier;
    use crate::registry::ApprovalStatus;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Executor returning canned reports.
    struct StubExecutor {
        precheck_ok: bool,
        execute_ratio: f64,
        hard_error: bool,
        calls: AtomicU32,
    }

    impl StubExecutor {
        fn passing() -> Self {
            Self {
                precheck_ok: true,
                execute_ratio: 1.0,
                hard_error: false,
                calls: AtomicU32::new(0),
            }
        }

        fn report(ratio: f64, hard_error: bool) -> ExecutionReport {
            let total = 4;
            let succeeded = (ratio * total as f64).round() as usize;
            ExecutionReport {
                operations: (0..total)
                    .map(|i| PatchOperation {
                        name: format!("op-{}", i),
                        succeeded: i < succeeded,
                        hard_error: hard_error && i == 0,
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl PatchExecutor for StubExecutor {
        async fn pre_checks(&self, _server: &ServerRecord) -> Result<ExecutionReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::report(if self.precheck_ok { 1.0 } else { 0.5 }, false))
        }

        async fn execute(&self, _server: &ServerRecord) -> Result<ExecutionReport> {
            Ok(Self::report(self.execute_ratio, self.hard_error))
        }

        async fn post_checks(&self, _server: &ServerRecord) -> Result<ExecutionReport> {
            Ok(Self::report(1.0, false))
        }
    }

    fn pipeline(executor: StubExecutor) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            Arc::new(executor),
            Arc::new(LogNotifier),
        )
    }

    fn approved_server(utc_schedule: (i32, u32, u32, u32)) -> ServerRecord {
        let (y, m, d, h) = utc_schedule;
        let mut server = ServerRecord::new("db01", "UTC", "database", "alice");
        let schedule = server.schedules.get_mut(Quarter::Q3);
        schedule.patch_date = NaiveDate::from_ymd_opt(y, m, d);
        schedule.patch_time = chrono::NaiveTime::from_hms_opt(h, 0, 0);
        schedule.approval = ApprovalStatus::Approved;
        server
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn unapproved_server_never_leaves_not_started() {
        let pl = pipeline(StubExecutor::passing());
        let mut server = approved_server((2025, 6, 19, 21));
        server.schedules.get_mut(Quarter::Q3).approval = ApprovalStatus::Pending;
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        let stage = pl.poll(&mut run, &mut server, at(2025, 6, 19, 20)).await.unwrap();
        assert_eq!(stage, Stage::NotStarted);
    }

    #[tokio::test]
    async fn precheck_gated_until_window_opens() {
        let pl = pipeline(StubExecutor::passing());
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        // 6 hours out: still closed (window is 4h)
        let stage = pl.poll(&mut run, &mut server, at(2025, 6, 19, 15)).await.unwrap();
        assert_eq!(stage, Stage::NotStarted);

        // 3 hours out: prechecks run and pass
        let stage = pl.poll(&mut run, &mut server, at(2025, 6, 19, 18)).await.unwrap();
        assert_eq!(stage, Stage::AwaitingTrigger);
    }

    #[tokio::test]
    async fn full_happy_path_reaches_completed() {
        let pl = pipeline(StubExecutor::passing());
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        pl.poll(&mut run, &mut server, at(2025, 6, 19, 18)).await.unwrap();
        assert_eq!(run.stage, Stage::AwaitingTrigger);

        // Trigger window (1h) not yet open at 19:30
        let before = at(2025, 6, 19, 19);
        pl.poll(&mut run, &mut server, before).await.unwrap();
        assert_eq!(run.stage, Stage::AwaitingTrigger);

        pl.poll(&mut run, &mut server, at(2025, 6, 19, 20)).await.unwrap();
        assert_eq!(run.stage, Stage::PostCheck);
        assert_eq!(server.status, ServerStatus::Running);

        pl.poll(&mut run, &mut server, at(2025, 6, 19, 21)).await.unwrap();
        assert_eq!(run.stage, Stage::Completed);
        assert_eq!(server.status, ServerStatus::Completed);
    }

    #[tokio::test]
    async fn below_threshold_execution_fails_and_escalates() {
        let executor = StubExecutor {
            precheck_ok: true,
            execute_ratio: 0.5,
            hard_error: false,
            calls: AtomicU32::new(0),
        };
        let pl = pipeline(executor);
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        pl.poll(&mut run, &mut server, at(2025, 6, 19, 18)).await.unwrap();
        pl.poll(&mut run, &mut server, at(2025, 6, 19, 20, )).await.unwrap();

        assert_eq!(run.stage, Stage::Failed);
        assert_eq!(server.status, ServerStatus::Failed);
        assert!(run.last_failure.as_deref().unwrap_or("").contains("patch validation"));
    }

    #[tokio::test]
    async fn hard_error_fails_even_at_full_ratio() {
        let executor = StubExecutor {
            precheck_ok: true,
            execute_ratio: 1.0,
            hard_error: true,
            calls: AtomicU32::new(0),
        };
        let pl = pipeline(executor);
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        pl.poll(&mut run, &mut server, at(2025, 6, 19, 18)).await.unwrap();
        pl.poll(&mut run, &mut server, at(2025, 6, 19, 20)).await.unwrap();
        assert_eq!(run.stage, Stage::Failed);
    }

    #[tokio::test]
    async fn poll_long_after_the_window_fails_instead_of_firing() {
        let pl = pipeline(StubExecutor::passing());
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        // Two days of downtime: the next poll lands far past the window
        pl.poll(&mut run, &mut server, at(2025, 6, 21, 9)).await.unwrap();
        assert_eq!(run.stage, Stage::Failed);
        assert_eq!(server.status, ServerStatus::Failed);
        assert!(run
            .last_failure
            .as_deref()
            .unwrap_or("")
            .contains("missed execution window"));
    }

    #[tokio::test]
    async fn awaiting_trigger_closes_after_the_grace_period() {
        let pl = pipeline(StubExecutor::passing());
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        pl.poll(&mut run, &mut server, at(2025, 6, 19, 18)).await.unwrap();
        assert_eq!(run.stage, Stage::AwaitingTrigger);

        // Orchestrator back only the next morning
        pl.poll(&mut run, &mut server, at(2025, 6, 20, 8)).await.unwrap();
        assert_eq!(run.stage, Stage::Failed);
    }

    #[tokio::test]
    async fn failing_prechecks_retry_then_fail() {
        let executor = StubExecutor {
            precheck_ok: false,
            execute_ratio: 1.0,
            hard_error: false,
            calls: AtomicU32::new(0),
        };
        let pl = pipeline(executor);
        let mut server = approved_server((2025, 6, 19, 21));
        let mut run = PipelineRun::new("db01", Quarter::Q3);

        let now = at(2025, 6, 19, 18);
        pl.poll(&mut run, &mut server, now).await.unwrap();
        assert_eq!(run.stage, Stage::NotStarted);
        pl.poll(&mut run, &mut server, now).await.unwrap();
        assert_eq!(run.stage, Stage::NotStarted);
        pl.poll(&mut run, &mut server, now).await.unwrap();
        assert_eq!(run.stage, Stage::Failed);
        assert_eq!(run.attempts(Stage::Precheck), 3);
    }
}
