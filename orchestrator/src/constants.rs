//! Application-wide constants for windows, thresholds and limits
//!
//! Central repository for the engine's magic numbers, organized by category.
//! Most of these are also overridable through [`crate::config::OrchestratorConfig`];
//! the values here are the stock defaults.

#![allow(dead_code)] // Some constants are defined for future use

use chrono::Weekday;

/// Calendar and freeze-window constants
pub mod calendar {
    use super::Weekday;

    /// Fixed weekly maintenance weekday
    pub const MAINTENANCE_WEEKDAY: Weekday = Weekday::Thu;

    /// Length of the freeze window in days, measured from the next
    /// occurrence of the maintenance weekday
    pub const FREEZE_SPAN_DAYS: i64 = 7;
}

/// Slot-grid constants for the assignment heuristic
pub mod slots {
    /// First hour of the evening patch window (24h clock)
    pub const WINDOW_START_HOUR: u32 = 20;

    /// Length of the evening patch window in hours
    pub const WINDOW_SPAN_HOURS: u32 = 4;

    /// Slot step in minutes
    pub const STEP_MINUTES: u32 = 30;

    /// Maximum servers assigned to one (date, time) slot
    pub const SLOT_CAPACITY: u32 = 3;
}

/// Load-prediction constants
pub mod prediction {
    /// Days of history kept per server
    pub const RETENTION_DAYS: i64 = 30;

    /// First candidate evening hour for recommendations
    pub const EVENING_START_HOUR: u32 = 19;

    /// Last candidate evening hour for recommendations (inclusive)
    pub const EVENING_END_HOUR: u32 = 23;

    /// Average CPU percentage below which an hour counts as low-load
    pub const LOW_LOAD_THRESHOLD: f64 = 30.0;

    /// Active-session count above which a risk factor is raised
    pub const SESSION_RISK_THRESHOLD: u32 = 2;

    /// Confidence above which a recommendation is labeled High
    pub const HIGH_CONFIDENCE: f64 = 0.7;

    /// Confidence above which a recommendation is labeled Medium
    pub const MEDIUM_CONFIDENCE: f64 = 0.4;

    /// Fallback hour recommended when no history exists
    pub const FALLBACK_HOUR: u32 = 22;

    /// Confidence attached to the no-data fallback
    pub const FALLBACK_CONFIDENCE: f64 = 0.3;
}

/// Lifecycle pipeline trigger windows and thresholds
pub mod pipeline {
    /// Hours before the scheduled instant at which pre-checks may start
    pub const PRECHECK_WINDOW_HOURS: i64 = 4;

    /// Hours before the scheduled instant at which the scheduling
    /// trigger fires (narrower than the precheck window)
    pub const TRIGGER_WINDOW_HOURS: i64 = 1;

    /// Fraction of patch operations that must succeed for a
    /// validation stage to pass
    pub const VALIDATION_SUCCESS_THRESHOLD: f64 = 0.75;

    /// Hours past the scheduled instant after which an untriggered run
    /// counts as a missed window and fails instead of firing late
    pub const MISSED_WINDOW_GRACE_HOURS: i64 = 2;
}

/// Concurrency limits for the cycle runner
pub mod workers {
    /// Maximum servers polled concurrently in one cycle
    pub const MAX_CONCURRENT_POLLS: usize = 8;
}

/// Default cron schedules for the cycle runner (6-field format)
pub mod schedules {
    /// Pipeline poll: every 10 minutes
    pub const PIPELINE_POLL: &str = "0 */10 * * * *";

    /// Auto-approval sweep: daily at 08:00
    pub const AUTO_APPROVAL_SWEEP: &str = "0 0 8 * * *";
}
