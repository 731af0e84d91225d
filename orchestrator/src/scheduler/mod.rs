//! Cycle runner and cron driver
//!
//! The engines above are pure-ish and synchronous; this module is what
//! actually turns them into a service. A `CycleRunner` owns the
//! collaborators and performs whole read-mutate-write cycles against
//! the registry snapshot; the `OrchestratorScheduler` registers the
//! periodic jobs (pipeline poll, daily planning/escalation sweep) on a
//! 6-field-cron scheduler.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::approval::ApprovalEngine;
use crate::assignment::{AssignmentEngine, AssignmentPlan, Classifier};
use crate::calendar::Calendar;
use crate::config::OrchestratorConfig;
use crate::errors::OrchestratorError;
use crate::metrics::MetricsSource;
use crate::notify::Notifier;
use crate::pipeline::{PatchExecutor, Pipeline, PipelineRun, Stage};
use crate::prediction::{ConfidenceLevel, PredictionEngine};
use crate::registry::{ApprovalStatus, Registry};

/// Outcome counters for one pipeline poll cycle.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleSummary {
    pub polled: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct CycleRunner {
    config: Arc<OrchestratorConfig>,
    registry: Arc<dyn Registry>,
    calendar: Calendar,
    assignment: AssignmentEngine,
    approval: ApprovalEngine,
    prediction: PredictionEngine,
    pipeline: Arc<Pipeline>,
    /// In-memory pipeline runs for the active quarter, keyed by server.
    runs: Arc<RwLock<HashMap<String, PipelineRun>>>,
}

impl CycleRunner {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        registry: Arc<dyn Registry>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<dyn MetricsSource>,
        executor: Arc<dyn PatchExecutor>,
    ) -> Result<Self, OrchestratorError> {
        let calendar = Calendar::new(config.quarters.clone(), config.maintenance_weekday);
        let classifier = Classifier::new(config.groups.clone())?;

        let assignment = AssignmentEngine::new(calendar.clone(), classifier, config.slot_grid);
        let approval = ApprovalEngine::new(calendar.clone(), config.slot_grid, notifier.clone());
        let prediction = PredictionEngine::new(config.prediction, metrics);
        let pipeline = Arc::new(Pipeline::new(config.pipeline, executor, notifier));

        Ok(Self {
            config,
            registry,
            calendar,
            assignment,
            approval,
            prediction,
            pipeline,
            runs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Poll every server's pipeline once and write the snapshot back.
    ///
    /// Per-server work fans out under a concurrency bound; each server
    /// owns its record for the duration of the poll, so there is no
    /// shared mutable state beyond the runs map.
    pub async fn run_pipeline_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, OrchestratorError> {
        let today = now.date_naive();
        let Some(quarter) = self.calendar.active_quarter(today) else {
            warn!("No active quarter covers {}; skipping pipeline cycle", today);
            return Ok(CycleSummary::default());
        };

        let records = self.registry.read_all().await?;
        let mut runs = self.runs.write().await;

        let pairs: Vec<_> = records
            .into_iter()
            .map(|record| {
                let run = runs
                    .remove(&record.name)
                    .filter(|run| run.quarter == quarter)
                    .unwrap_or_else(|| PipelineRun::new(&record.name, quarter));
                (record, run)
            })
            .collect();

        let pipeline = self.pipeline.clone();
        let results: Vec<_> = stream::iter(pairs)
            .map(|(mut record, mut run)| {
                let pipeline = pipeline.clone();
                async move {
                    let outcome = pipeline.poll(&mut run, &mut record, now).await;
                    (record, run, outcome)
                }
            })
            .buffer_unordered(self.config.max_concurrent_polls)
            .collect()
            .await;

        let mut summary = CycleSummary::default();
        let mut fatal: Option<OrchestratorError> = None;
        let mut updated = Vec::with_capacity(results.len());

        for (record, run, outcome) in results {
            summary.polled += 1;
            match outcome {
                Ok(Stage::Completed) => summary.completed += 1,
                Ok(Stage::Failed) => summary.failed += 1,
                Ok(Stage::NotStarted) => summary.skipped += 1,
                Ok(_) => {}
                Err(e) => {
                    error!("Pipeline poll for {} aborted: {}", record.name, e);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
            runs.insert(record.name.clone(), run);
            updated.push(record);
        }
        drop(runs);

        updated.sort_by(|a, b| a.name.cmp(&b.name));
        self.registry.write_all(&updated).await?;

        info!(
            "Pipeline cycle for {}: {} polled, {} completed, {} failed, {} not started",
            quarter, summary.polled, summary.completed, summary.failed, summary.skipped
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Plan and apply schedules for every server lacking one in the
    /// active quarter, honoring confident load predictions.
    pub async fn run_assignment(&self, now: DateTime<Utc>) -> Result<AssignmentPlan, OrchestratorError> {
        let today = now.date_naive();
        let Some(quarter) = self.calendar.active_quarter(today) else {
            warn!("No active quarter covers {}; skipping assignment", today);
            return Ok(AssignmentPlan::default());
        };
        let reference_year = self.calendar.reference_year(today);

        let mut records = self.registry.read_all().await?;

        let mut recommendations = HashMap::new();
        for record in records.iter().filter(|r| r.is_unscheduled(quarter)) {
            let rec = self.prediction.recommend(&record.name).await;
            if rec.level != ConfidenceLevel::Low {
                recommendations.insert(record.name.clone(), rec.time);
            }
        }

        let plan = self
            .assignment
            .plan(&records, quarter, reference_year, today, &recommendations);
        self.assignment
            .apply(&plan, &mut records, quarter, Some(quarter));
        self.registry.write_all(&records).await?;

        Ok(plan)
    }

    /// Escalate overdue pending approvals to auto-approval.
    ///
    /// A server is overdue once its patch date (or, unscheduled, the
    /// quarter's earliest remaining candidate date) is within the
    /// configured lead window.
    pub async fn run_auto_approval_sweep(&self, now: DateTime<Utc>) -> Result<u32, OrchestratorError> {
        let today = now.date_naive();
        let Some(quarter) = self.calendar.active_quarter(today) else {
            return Ok(0);
        };
        let reference_year = self.calendar.reference_year(today);
        let earliest = self
            .calendar
            .earliest_candidate(quarter, reference_year, today);

        let mut records = self.registry.read_all().await?;
        let fleet_schedules: Vec<_> = records
            .iter()
            .filter_map(|record| {
                let schedule = record.schedules.get(quarter);
                schedule.patch_date.zip(schedule.patch_time)
            })
            .collect();

        let mut escalated = 0;
        for record in records.iter_mut() {
            if record.schedules.get(quarter).approval != ApprovalStatus::Pending {
                continue;
            }
            let deadline_anchor = record.schedules.get(quarter).patch_date.or(earliest);
            let Some(anchor) = deadline_anchor else {
                continue;
            };
            if (anchor - today).num_days() > self.config.auto_approve_lead_days {
                continue;
            }

            match self.approval.auto_approve(
                record,
                quarter,
                reference_year,
                today,
                &fleet_schedules,
                Some(quarter),
            ) {
                Ok(()) => escalated += 1,
                Err(e) => warn!("Auto-approval for {} skipped: {}", record.name, e),
            }
        }

        if escalated > 0 {
            self.registry.write_all(&records).await?;
            info!("Auto-approved {} server(s) for {}", escalated, quarter);
        }
        Ok(escalated)
    }

    /// The day used for freeze evaluation and approval gating; exposed
    /// so interactive callers share the runner's clock.
    pub fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Registers the runner's periodic jobs on a cron scheduler.
pub struct OrchestratorScheduler {
    runner: Arc<CycleRunner>,
    scheduler: JobScheduler,
}

impl OrchestratorScheduler {
    pub async fn new(runner: Arc<CycleRunner>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;
        Ok(Self { runner, scheduler })
    }

    pub async fn start(&self) -> Result<()> {
        let config = self.runner.config.clone();

        validate_6_field_cron(&config.pipeline_poll_schedule)?;
        validate_6_field_cron(&config.auto_approval_schedule)?;

        let runner = self.runner.clone();
        let poll_job = Job::new_async(config.pipeline_poll_schedule.as_str(), move |_uuid, _sched| {
            let runner = runner.clone();
            Box::pin(async move {
                if let Err(e) = runner.run_pipeline_cycle(Utc::now()).await {
                    error!("Pipeline cycle failed: {}", e);
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create pipeline poll job: {}", e))?;
        self.scheduler
            .add(poll_job)
            .await
            .map_err(|e| anyhow!("Failed to add pipeline poll job: {}", e))?;

        let runner = self.runner.clone();
        let sweep_job =
            Job::new_async(config.auto_approval_schedule.as_str(), move |_uuid, _sched| {
                let runner = runner.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    match runner.run_assignment(now).await {
                        Ok(plan) if !plan.assignments.is_empty() => {
                            info!("Daily planning assigned {} server(s)", plan.assignments.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("Daily planning failed: {}", e),
                    }
                    if let Err(e) = runner.run_auto_approval_sweep(now).await {
                        error!("Auto-approval sweep failed: {}", e);
                    }
                })
            })
            .map_err(|e| anyhow!("Failed to create planning sweep job: {}", e))?;
        self.scheduler
            .add(sweep_job)
            .await
            .map_err(|e| anyhow!("Failed to add planning sweep job: {}", e))?;

        self.scheduler.start().await?;
        info!(
            "Scheduler started: poll '{}', planning sweep '{}'",
            config.pipeline_poll_schedule, config.auto_approval_schedule
        );
        Ok(())
    }
}

/// tokio-cron-scheduler wants 6 fields: sec min hour day month dow.
/// Rejecting malformed expressions up front beats a job that silently
/// never fires.
pub fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(anyhow!(
            "Expected 6 cron fields (sec min hour day month dow), got {} in '{}'",
            parts.len(),
            schedule
        ));
    }

    let ranges: [(&str, u32, u32); 6] = [
        ("second", 0, 59),
        ("minute", 0, 59),
        ("hour", 0, 23),
        ("day", 1, 31),
        ("month", 1, 12),
        ("dayofweek", 0, 7),
    ];

    for (field, (name, min, max)) in parts.iter().zip(ranges) {
        validate_cron_field(field, name, min, max)?;
    }
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<()> {
    if field == "*" || field == "?" {
        return Ok(());
    }

    if let Some(step_str) = field.strip_prefix("*/") {
        let step: u32 = step_str
            .parse()
            .map_err(|_| anyhow!("Invalid {} step value: {}", name, step_str))?;
        if step == 0 {
            return Err(anyhow!("{} step value cannot be 0", name));
        }
        return Ok(());
    }

    let check = |raw: &str| -> Result<()> {
        let value: u32 = raw
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, raw))?;
        if value < min || value > max {
            return Err(anyhow!(
                "{} value {} is outside valid range {}-{}",
                name,
                value,
                min,
                max
            ));
        }
        Ok(())
    };

    if let Some((start, end)) = field.split_once('-') {
        check(start)?;
        check(end)?;
        return Ok(());
    }
    for part in field.split(',') {
        check(part)?;
    }
    Ok(())
}
