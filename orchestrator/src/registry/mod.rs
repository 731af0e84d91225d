//! Server registry: record model plus the persistence collaborator seam
//!
//! The engine treats persistence as a full-snapshot contract: load every
//! record, mutate in memory, write the whole set back. Partial field
//! updates never go through this interface, which keeps the
//! single-writer-per-record rule enforceable by the caller.

mod store;

pub use store::SqliteRegistry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::calendar::Quarter;
use crate::errors::PersistenceError;

/// Owner decision state for one (server, quarter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    AutoApproved,
    Rejected,
}

impl ApprovalStatus {
    /// Approved either by the owner or by deadline escalation.
    #[inline]
    pub fn is_approved(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::AutoApproved)
    }

    /// Terminal for the quarter; re-approval requires clearing the date.
    #[inline]
    pub fn is_decided(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::AutoApproved => "auto_approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Current-quarter progress state for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Pending,
    Scheduled,
    Approved,
    Running,
    Completed,
    Failed,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Pending => "pending",
            ServerStatus::Scheduled => "scheduled",
            ServerStatus::Approved => "approved",
            ServerStatus::Running => "running",
            ServerStatus::Completed => "completed",
            ServerStatus::Failed => "failed",
        }
    }
}

/// Schedule and approval fields for one quarter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterSchedule {
    pub patch_date: Option<NaiveDate>,
    pub patch_time: Option<NaiveTime>,
    pub approval: ApprovalStatus,
}

impl Default for QuarterSchedule {
    fn default() -> Self {
        Self {
            patch_date: None,
            patch_time: None,
            approval: ApprovalStatus::Pending,
        }
    }
}

/// Fixed-size quarter-keyed schedule map, so all four quarters are
/// covered at compile time instead of via string-built field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarterMap {
    schedules: [QuarterSchedule; 4],
}

impl QuarterMap {
    #[inline]
    pub fn get(&self, quarter: Quarter) -> &QuarterSchedule {
        &self.schedules[quarter.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, quarter: Quarter) -> &mut QuarterSchedule {
        &mut self.schedules[quarter.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quarter, &QuarterSchedule)> {
        Quarter::ALL.iter().map(|&q| (q, self.get(q)))
    }
}

/// One managed host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: String,
    /// IANA zone name, e.g. "America/New_York".
    pub timezone: String,
    /// Host-group/classification tag, e.g. "database".
    pub host_group: String,
    pub schedules: QuarterMap,
    pub status: ServerStatus,
    pub primary_owner: String,
    pub secondary_owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerRecord {
    pub fn new(name: &str, timezone: &str, host_group: &str, primary_owner: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            timezone: timezone.to_string(),
            host_group: host_group.to_string(),
            schedules: QuarterMap::default(),
            status: ServerStatus::Pending,
            primary_owner: primary_owner.to_string(),
            secondary_owner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A server lacks a schedule for the quarter when no date is set.
    pub fn is_unscheduled(&self, quarter: Quarter) -> bool {
        self.schedules.get(quarter).patch_date.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Full-snapshot persistence contract for the server registry.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Load every record.
    async fn read_all(&self) -> Result<Vec<ServerRecord>, PersistenceError>;

    /// Replace the full record set. Callers must retry the whole
    /// read-mutate-write cycle on failure rather than patch partially.
    async fn write_all(&self, records: &[ServerRecord]) -> Result<(), PersistenceError>;
}

/// In-memory registry used by tests and as a bootstrapping stand-in.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: Arc<RwLock<HashMap<String, ServerRecord>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, records: Vec<ServerRecord>) {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.name.clone(), record);
        }
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn read_all(&self) -> Result<Vec<ServerRecord>, PersistenceError> {
        let map = self.records.read().await;
        let mut records: Vec<_> = map.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn write_all(&self, records: &[ServerRecord]) -> Result<(), PersistenceError> {
        let mut map = self.records.write().await;
        map.clear();
        for record in records {
            map.insert(record.name.clone(), record.clone());
        }
        Ok(())
    }
}
