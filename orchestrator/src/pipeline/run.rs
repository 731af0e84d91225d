//! Ephemeral per-(server, quarter) pipeline state
//!
//! A `PipelineRun` lives for one quarter's patch cycle. Polls are
//! idempotent against this state: re-invoking the poller never repeats
//! a completed stage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::calendar::Quarter;

/// Strictly ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    Precheck,
    AwaitingTrigger,
    Executing,
    Validating,
    PostCheck,
    Completed,
    Failed,
}

impl Stage {
    pub const COUNT: usize = 8;

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Stage::NotStarted => 0,
            Stage::Precheck => 1,
            Stage::AwaitingTrigger => 2,
            Stage::Executing => 3,
            Stage::Validating => 4,
            Stage::PostCheck => 5,
            Stage::Completed => 6,
            Stage::Failed => 7,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::Precheck => "precheck",
            Stage::AwaitingTrigger => "awaiting_trigger",
            Stage::Executing => "executing",
            Stage::Validating => "validating",
            Stage::PostCheck => "post_check",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State for one server's traversal of the quarter cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub server_name: String,
    pub quarter: Quarter,
    pub stage: Stage,
    attempts: [u32; Stage::COUNT],
    pub last_failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(server_name: &str, quarter: Quarter) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            server_name: server_name.to_string(),
            quarter,
            stage: Stage::NotStarted,
            attempts: [0; Stage::COUNT],
            last_failure: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }

    /// Record one failed attempt at a stage, returning the new count.
    pub fn record_attempt(&mut self, stage: Stage, failure: String) -> u32 {
        self.attempts[stage.index()] += 1;
        self.last_failure = Some(failure);
        self.updated_at = Utc::now();
        self.attempts[stage.index()]
    }

    pub fn attempts(&self, stage: Stage) -> u32 {
        self.attempts[stage.index()]
    }
}
