pub mod manager;
pub use manager::ConfigManager;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::assignment::{GroupRule, SlotGridConfig};
use crate::calendar::{standard_quarters, QuarterSpec};
use crate::constants;
use crate::pipeline::PipelineConfig;
use crate::prediction::PredictionConfig;

/// Immutable runtime configuration handed to each engine constructor.
/// No process-wide singletons: every component receives the value it
/// needs explicitly.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub registry_path: String,
    pub webhook_url: String,
    /// Port the per-server patch agent listens on.
    pub agent_port: u16,
    pub maintenance_weekday: Weekday,
    pub quarters: Vec<QuarterSpec>,
    pub groups: Vec<GroupRule>,
    pub slot_grid: SlotGridConfig,
    pub prediction: PredictionConfig,
    pub pipeline: PipelineConfig,
    /// Days before the quarter's first remaining maintenance date at
    /// which pending approvals escalate to auto-approval.
    pub auto_approve_lead_days: i64,
    pub max_concurrent_polls: usize,
    pub pipeline_poll_schedule: String,
    pub auto_approval_schedule: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            registry_path: "data/servers.db".to_string(),
            webhook_url: String::new(),
            agent_port: 8745,
            maintenance_weekday: constants::calendar::MAINTENANCE_WEEKDAY,
            quarters: standard_quarters(),
            groups: crate::assignment::Classifier::standard().rules().to_vec(),
            slot_grid: SlotGridConfig::default(),
            prediction: PredictionConfig::default(),
            pipeline: PipelineConfig::default(),
            auto_approve_lead_days: 14,
            max_concurrent_polls: constants::workers::MAX_CONCURRENT_POLLS,
            pipeline_poll_schedule: constants::schedules::PIPELINE_POLL.to_string(),
            auto_approval_schedule: constants::schedules::AUTO_APPROVAL_SWEEP.to_string(),
        }
    }
}

/// On-disk layout of `orchestrator.toml`. Everything is optional;
/// omitted sections fall back to the stock defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub registry_path: Option<String>,
    pub webhook_url: Option<String>,
    pub agent_port: Option<u16>,
    /// Weekday name, e.g. "thu" or "thursday".
    pub maintenance_weekday: Option<String>,
    pub auto_approve_lead_days: Option<i64>,
    pub max_concurrent_polls: Option<usize>,
    pub pipeline_poll_schedule: Option<String>,
    pub auto_approval_schedule: Option<String>,
    pub slots: Option<SlotsSection>,
    pub prediction: Option<PredictionSection>,
    pub pipeline: Option<PipelineSection>,
    #[serde(default)]
    pub groups: Vec<GroupRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotsSection {
    pub window_start_hour: Option<u32>,
    pub window_span_hours: Option<u32>,
    pub step_minutes: Option<u32>,
    pub slot_capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSection {
    pub retention_days: Option<i64>,
    pub evening_start_hour: Option<u32>,
    pub evening_end_hour: Option<u32>,
    pub low_load_threshold: Option<f64>,
    pub session_risk_threshold: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    pub precheck_window_hours: Option<i64>,
    pub trigger_window_hours: Option<i64>,
    pub validation_threshold: Option<f64>,
    pub max_precheck_attempts: Option<u32>,
    pub missed_window_grace_hours: Option<i64>,
}
