pub mod approval;
pub mod assignment;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod prediction;
pub mod registry;
pub mod scheduler;
pub mod timezone;

// Re-export commonly used types
pub use approval::ApprovalEngine;
pub use assignment::{AssignmentEngine, Classifier};
pub use calendar::{Calendar, Quarter};
pub use config::{ConfigManager, OrchestratorConfig};
pub use errors::OrchestratorError;
pub use http::HttpPatchExecutor;
pub use metrics::{MetricsSource, SyntheticMetrics};
pub use notify::{Notifier, WebhookNotifier};
pub use pipeline::{PatchExecutor, Pipeline};
pub use prediction::PredictionEngine;
pub use registry::{Registry, ServerRecord, SqliteRegistry};
pub use scheduler::{CycleRunner, OrchestratorScheduler};
