//! Per-server, per-quarter approval state machine
//!
//! Lifecycle per (server, quarter): `pending` moves to exactly one of
//! `approved`, `auto_approved` or `rejected`, all terminal for that
//! quarter. Re-opening requires clearing the schedule, which resets the
//! approval to `pending`. Every schedule mutation is gated by the weekly
//! freeze window.

pub mod freeze;

use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{info, warn};

use crate::assignment::{SlotGridConfig, SlotPlan};
use crate::calendar::{Calendar, Quarter};
use crate::errors::{ApprovalError, FreezeViolation, OrchestratorError};
use crate::notify::Notifier;
use crate::registry::{ApprovalStatus, ServerRecord, ServerStatus};

pub struct ApprovalEngine {
    calendar: Calendar,
    grid_config: SlotGridConfig,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalEngine {
    pub fn new(calendar: Calendar, grid_config: SlotGridConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            calendar,
            grid_config,
            notifier,
        }
    }

    fn check_freeze(
        &self,
        server: &ServerRecord,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), FreezeViolation> {
        let weekday = self.calendar.maintenance_weekday();
        if freeze::is_frozen(date, today, weekday) {
            let boundary = freeze::freeze_boundary(today, weekday);
            return Err(FreezeViolation {
                server_name: server.name.clone(),
                requested_date: date.to_string(),
                freeze_until: boundary.to_string(),
            });
        }
        Ok(())
    }

    /// Set (or move) a server's schedule for the quarter. Rejected when
    /// the target date sits inside the freeze window, when an existing
    /// date does, or when the quarter's approval is already decided.
    pub fn set_schedule(
        &self,
        server: &mut ServerRecord,
        quarter: Quarter,
        date: NaiveDate,
        time: NaiveTime,
        today: NaiveDate,
    ) -> Result<(), OrchestratorError> {
        let schedule = server.schedules.get(quarter);
        if schedule.approval.is_decided() {
            return Err(ApprovalError::AlreadyDecided {
                server_name: server.name.clone(),
                current: schedule.approval.as_str().to_string(),
            }
            .into());
        }
        if let Some(existing) = schedule.patch_date {
            self.check_freeze(server, existing, today)?;
        }
        self.check_freeze(server, date, today)?;

        let schedule = server.schedules.get_mut(quarter);
        schedule.patch_date = Some(date);
        schedule.patch_time = Some(time);
        server.touch();
        info!("Schedule for {} {} set to {} {}", server.name, quarter, date, time);
        Ok(())
    }

    /// Clear a quarter's schedule and reset the approval to pending.
    /// This is the only way out of a terminal approval state.
    pub fn clear_schedule(
        &self,
        server: &mut ServerRecord,
        quarter: Quarter,
        today: NaiveDate,
    ) -> Result<(), OrchestratorError> {
        if let Some(existing) = server.schedules.get(quarter).patch_date {
            self.check_freeze(server, existing, today)?;
        }

        let schedule = server.schedules.get_mut(quarter);
        schedule.patch_date = None;
        schedule.patch_time = None;
        schedule.approval = ApprovalStatus::Pending;
        server.touch();
        info!("Schedule for {} {} cleared", server.name, quarter);
        Ok(())
    }

    /// Owner approval. Requires a patch date; flips the current-quarter
    /// status when the approved quarter is the active one.
    pub fn approve(
        &self,
        server: &mut ServerRecord,
        quarter: Quarter,
        actor: &str,
        active_quarter: Option<Quarter>,
    ) -> Result<(), OrchestratorError> {
        let schedule = server.schedules.get(quarter);
        if schedule.approval.is_decided() {
            return Err(ApprovalError::AlreadyDecided {
                server_name: server.name.clone(),
                current: schedule.approval.as_str().to_string(),
            }
            .into());
        }
        if schedule.patch_date.is_none() {
            return Err(ApprovalError::NoPatchDate {
                server_name: server.name.clone(),
                quarter: quarter.number(),
            }
            .into());
        }

        server.schedules.get_mut(quarter).approval = ApprovalStatus::Approved;
        if active_quarter == Some(quarter) {
            server.status = ServerStatus::Approved;
        }
        server.touch();
        info!("{} approved {} for {}", actor, server.name, quarter);
        Ok(())
    }

    /// Owner rejection with a mandatory reason, forwarded to the
    /// notification collaborator. Delivery failure never rolls the
    /// rejection back. A rejection targets a proposed schedule, so
    /// like `approve` it requires a patch date for the quarter.
    pub async fn reject(
        &self,
        server: &mut ServerRecord,
        quarter: Quarter,
        actor: &str,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        if reason.trim().is_empty() {
            return Err(ApprovalError::EmptyReason {
                server_name: server.name.clone(),
            }
            .into());
        }
        let schedule = server.schedules.get(quarter);
        if schedule.approval.is_decided() {
            return Err(ApprovalError::AlreadyDecided {
                server_name: server.name.clone(),
                current: schedule.approval.as_str().to_string(),
            }
            .into());
        }
        if schedule.patch_date.is_none() {
            return Err(ApprovalError::NoPatchDate {
                server_name: server.name.clone(),
                quarter: quarter.number(),
            }
            .into());
        }

        server.schedules.get_mut(quarter).approval = ApprovalStatus::Rejected;
        server.touch();
        info!("{} rejected {} for {}: {}", actor, server.name, quarter, reason);

        let subject = format!("Patch schedule rejected: {} ({})", server.name, quarter);
        let body = format!("Rejected by {}. Reason: {}", actor, reason.trim());
        if let Err(e) = self
            .notifier
            .send(&server.primary_owner, &subject, &body, false)
            .await
        {
            warn!("Rejection notice for {} not delivered: {}", server.name, e);
        }
        Ok(())
    }

    /// Deadline escalation. Callers decide *when* the deadline has
    /// passed; this fills in a default schedule if the owner never set
    /// one (earliest future maintenance date, least-occupied evening
    /// slot) and moves the approval to `auto_approved`.
    ///
    /// `fleet_schedules` carries the (date, time) pairs already booked
    /// across the fleet so the default slot balances against them.
    pub fn auto_approve(
        &self,
        server: &mut ServerRecord,
        quarter: Quarter,
        reference_year: i32,
        today: NaiveDate,
        fleet_schedules: &[(NaiveDate, NaiveTime)],
        active_quarter: Option<Quarter>,
    ) -> Result<(), OrchestratorError> {
        let schedule = server.schedules.get(quarter);
        if schedule.approval.is_decided() {
            return Err(ApprovalError::AlreadyDecided {
                server_name: server.name.clone(),
                current: schedule.approval.as_str().to_string(),
            }
            .into());
        }

        if schedule.patch_date.is_none() {
            let dates = self.calendar.candidate_dates(quarter, reference_year, today);
            let mut slot_plan = SlotPlan::build(&dates, self.grid_config);
            slot_plan.seed_occupancy(fleet_schedules.iter().map(|(d, t)| (d, t)));

            let Some((date, time)) = slot_plan.least_occupied() else {
                return Err(OrchestratorError::Other(format!(
                    "Cannot auto-approve {}: no open slot remains in {} {}",
                    server.name, quarter, reference_year
                )));
            };

            let schedule = server.schedules.get_mut(quarter);
            schedule.patch_date = Some(date);
            schedule.patch_time = Some(time);
            info!(
                "Auto-assigned default slot {} {} to {} for {}",
                date, time, server.name, quarter
            );
        }

        server.schedules.get_mut(quarter).approval = ApprovalStatus::AutoApproved;
        if active_quarter == Some(quarter) {
            server.status = ServerStatus::Approved;
        }
        server.touch();
        warn!(
            "Approval deadline passed; {} auto-approved for {}",
            server.name, quarter
        );
        Ok(())
    }
}
