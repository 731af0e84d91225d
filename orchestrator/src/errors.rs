//! Custom error types for the patch orchestrator
//!
//! Provides structured error handling with context for the failure classes
//! the engine distinguishes: fatal configuration problems, expected freeze
//! rejections, persistence failures, validation-threshold failures and
//! slot-capacity exhaustion.

use std::fmt;

/// Main error type for the orchestrator
#[derive(Debug)]
pub enum OrchestratorError {
    /// Configuration-related errors (fatal for the run that hits them)
    Config(ConfigError),

    /// Freeze-window violations (expected, surfaced as rejected mutations)
    Freeze(FreezeViolation),

    /// Registry read/write errors
    Persistence(PersistenceError),

    /// Validation-threshold failures during the pipeline
    Validation(ValidationFailure),

    /// No slot available for a server during assignment
    Capacity(CapacityExhausted),

    /// Approval state machine rule violations
    Approval(ApprovalError),

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Timezone name not present in the tz database
    UnknownTimezone { zone: String },

    /// Malformed group-priority table
    InvalidGroupTable { reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },
}

/// A schedule mutation rejected by the freeze window
#[derive(Debug)]
pub struct FreezeViolation {
    pub server_name: String,
    pub requested_date: String,
    pub freeze_until: String,
}

/// Registry persistence error variants
#[derive(Debug)]
pub enum PersistenceError {
    /// Connection to the registry store failed
    ConnectionFailed { reason: String },

    /// Snapshot read failed
    ReadFailed { reason: String },

    /// Snapshot write failed; caller must retry the whole
    /// read-mutate-write cycle
    WriteFailed { reason: String },
}

/// A validation stage fell below the success threshold
#[derive(Debug)]
pub struct ValidationFailure {
    pub server_name: String,
    pub stage: String,
    pub success_ratio: f64,
    pub hard_errors: u32,
}

/// No under-capacity slot was available for a server
#[derive(Debug)]
pub struct CapacityExhausted {
    pub server_name: String,
    pub group: String,
    pub slots_considered: usize,
}

/// Approval state machine error variants
#[derive(Debug)]
pub enum ApprovalError {
    /// Approve called while no patch date is set for the quarter
    NoPatchDate { server_name: String, quarter: u8 },

    /// Reject called with an empty reason
    EmptyReason { server_name: String },

    /// Transition attempted out of a terminal state
    AlreadyDecided { server_name: String, current: String },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Config(e) => write!(f, "Configuration error: {}", e),
            OrchestratorError::Freeze(e) => write!(f, "Freeze window violation: {}", e),
            OrchestratorError::Persistence(e) => write!(f, "Persistence error: {}", e),
            OrchestratorError::Validation(e) => write!(f, "Validation failure: {}", e),
            OrchestratorError::Capacity(e) => write!(f, "Capacity exhausted: {}", e),
            OrchestratorError::Approval(e) => write!(f, "Approval error: {}", e),
            OrchestratorError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::UnknownTimezone { zone } => {
                write!(f, "Unknown timezone '{}'", zone)
            }
            ConfigError::InvalidGroupTable { reason } => {
                write!(f, "Invalid group-priority table: {}", reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for FreezeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Schedule change for '{}' on {} rejected: date is inside the freeze window (frozen through {})",
            self.server_name, self.requested_date, self.freeze_until
        )
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::ConnectionFailed { reason } => {
                write!(f, "Registry connection failed: {}", reason)
            }
            PersistenceError::ReadFailed { reason } => {
                write!(f, "Registry snapshot read failed: {}", reason)
            }
            PersistenceError::WriteFailed { reason } => {
                write!(f, "Registry snapshot write failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stage '{}' for '{}' below threshold: {:.0}% succeeded, {} hard errors",
            self.stage,
            self.server_name,
            self.success_ratio * 100.0,
            self.hard_errors
        )
    }
}

impl fmt::Display for CapacityExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No slot available for '{}' (group '{}', {} slots considered)",
            self.server_name, self.group, self.slots_considered
        )
    }
}

impl fmt::Display for ApprovalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalError::NoPatchDate {
                server_name,
                quarter,
            } => {
                write!(
                    f,
                    "Cannot approve '{}' for Q{}: no patch date set",
                    server_name, quarter
                )
            }
            ApprovalError::EmptyReason { server_name } => {
                write!(f, "Rejection of '{}' requires a non-empty reason", server_name)
            }
            ApprovalError::AlreadyDecided {
                server_name,
                current,
            } => {
                write!(
                    f,
                    "Approval for '{}' already decided ({}); clear the schedule first",
                    server_name, current
                )
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for FreezeViolation {}
impl std::error::Error for PersistenceError {}
impl std::error::Error for ValidationFailure {}
impl std::error::Error for CapacityExhausted {}
impl std::error::Error for ApprovalError {}

// Conversions from anyhow::Error for boundaries that still use it
impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Other(err.to_string())
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(err: ConfigError) -> Self {
        OrchestratorError::Config(err)
    }
}

impl From<FreezeViolation> for OrchestratorError {
    fn from(err: FreezeViolation) -> Self {
        OrchestratorError::Freeze(err)
    }
}

impl From<PersistenceError> for OrchestratorError {
    fn from(err: PersistenceError) -> Self {
        OrchestratorError::Persistence(err)
    }
}

impl From<ValidationFailure> for OrchestratorError {
    fn from(err: ValidationFailure) -> Self {
        OrchestratorError::Validation(err)
    }
}

impl From<CapacityExhausted> for OrchestratorError {
    fn from(err: CapacityExhausted) -> Self {
        OrchestratorError::Capacity(err)
    }
}

impl From<ApprovalError> for OrchestratorError {
    fn from(err: ApprovalError) -> Self {
        OrchestratorError::Approval(err)
    }
}
