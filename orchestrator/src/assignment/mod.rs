//! Load-balanced assignment of patch windows
//!
//! Takes every server lacking a schedule for the target quarter,
//! classifies it into a priority group and hands out (date, time) slots
//! from the evening grid. Groups are processed in ascending priority
//! order; within a group the order is deterministic so re-running the
//! planner yields the same assignments.

mod classifier;
mod slots;

pub use classifier::{Classifier, GroupOrdering, GroupRule, UNCLASSIFIED};
pub use slots::{SlotGridConfig, SlotPlan, TimeSlot};

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::calendar::{Calendar, Quarter};
use crate::errors::CapacityExhausted;
use crate::registry::{ServerRecord, ServerStatus};

/// One planned (server, slot) pairing.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub server_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub group: String,
    pub rationale: String,
}

/// Result of one planning run. Unassignable servers are warnings, not
/// failures: the batch still applies for everyone who got a slot.
#[derive(Debug, Default, Serialize)]
pub struct AssignmentPlan {
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct AssignmentEngine {
    calendar: Calendar,
    classifier: Classifier,
    grid_config: SlotGridConfig,
}

impl AssignmentEngine {
    pub fn new(calendar: Calendar, classifier: Classifier, grid_config: SlotGridConfig) -> Self {
        Self {
            calendar,
            classifier,
            grid_config,
        }
    }

    /// Plan slots for every server lacking a schedule in the quarter.
    ///
    /// Occupancy is seeded from schedules that already exist on the
    /// fleet so a partial re-run keeps earlier bookings intact.
    /// `recommendations` carries per-server predicted low-load times;
    /// a matching open slot is taken ahead of the group preference.
    pub fn plan(
        &self,
        fleet: &[ServerRecord],
        quarter: Quarter,
        reference_year: i32,
        today: NaiveDate,
        recommendations: &HashMap<String, NaiveTime>,
    ) -> AssignmentPlan {
        let dates = self.calendar.candidate_dates(quarter, reference_year, today);
        if dates.is_empty() {
            warn!("No future maintenance dates remain in {} {}", quarter, reference_year);
            return AssignmentPlan {
                unassigned: fleet
                    .iter()
                    .filter(|s| s.is_unscheduled(quarter))
                    .map(|s| s.name.clone())
                    .collect(),
                warnings: vec![format!("no candidate dates remain in {}", quarter)],
                ..AssignmentPlan::default()
            };
        }

        let mut slot_plan = SlotPlan::build(&dates, self.grid_config);
        slot_plan.seed_occupancy(fleet.iter().filter_map(|server| {
            let schedule = server.schedules.get(quarter);
            schedule
                .patch_date
                .as_ref()
                .zip(schedule.patch_time.as_ref())
        }));

        // Bucket the unscheduled servers by group, preserving rule order
        let mut buckets: Vec<(String, Vec<&ServerRecord>)> = self
            .classifier
            .rules()
            .iter()
            .map(|rule| (rule.name.clone(), Vec::new()))
            .collect();
        buckets.push((UNCLASSIFIED.to_string(), Vec::new()));

        for server in fleet.iter().filter(|s| s.is_unscheduled(quarter)) {
            let group = self.classifier.classify(server);
            if let Some((_, members)) = buckets.iter_mut().find(|(name, _)| name == group) {
                members.push(server);
            }
        }

        let mut plan = AssignmentPlan::default();
        for (group, mut members) in buckets {
            if members.is_empty() {
                continue;
            }

            let rule = self.classifier.rule(&group);
            match rule.map(|r| r.ordering) {
                Some(GroupOrdering::Location) => members.sort_by(|a, b| {
                    (a.timezone.as_str(), a.name.as_str()).cmp(&(b.timezone.as_str(), b.name.as_str()))
                }),
                _ => members.sort_by(|a, b| a.name.cmp(&b.name)),
            }

            let preferred = rule.and_then(|r| r.preferred_window());
            info!(
                "Assigning {} server(s) in group '{}' ({} preference)",
                members.len(),
                group,
                if preferred.is_some() { "windowed" } else { "no" }
            );

            for server in members {
                let recommended = recommendations.get(&server.name).and_then(|&time| {
                    let window = (time, time + Duration::minutes(self.grid_config.step_minutes as i64));
                    slot_plan.claim_within(window)
                });
                let claimed = match recommended {
                    Some((date, time)) => Some((date, time, true)),
                    None => slot_plan.claim(preferred),
                };

                match claimed {
                    Some((date, time, in_window)) => {
                        let rationale = if recommended.is_some() {
                            "predicted low-load window".to_string()
                        } else if in_window {
                            format!("group '{}' preferred window, balanced by occupancy", group)
                        } else {
                            format!("group '{}' window full; fallback slot", group)
                        };
                        debug!("{} -> {} {} ({})", server.name, date, time, rationale);
                        plan.assignments.push(Assignment {
                            server_name: server.name.clone(),
                            date,
                            time,
                            group: group.clone(),
                            rationale,
                        });
                    }
                    None => {
                        let exhausted = CapacityExhausted {
                            server_name: server.name.clone(),
                            group: group.clone(),
                            slots_considered: slot_plan.len(),
                        };
                        warn!("{}", exhausted);
                        plan.warnings.push(exhausted.to_string());
                        plan.unassigned.push(server.name.clone());
                    }
                }
            }
        }

        info!(
            "Assignment plan for {}: {} assigned, {} left unassigned",
            quarter,
            plan.assignments.len(),
            plan.unassigned.len()
        );
        plan
    }

    /// Write a plan back onto the fleet records. Servers scheduled into
    /// the active quarter move to `scheduled` status.
    pub fn apply(
        &self,
        plan: &AssignmentPlan,
        fleet: &mut [ServerRecord],
        quarter: Quarter,
        active_quarter: Option<Quarter>,
    ) {
        for assignment in &plan.assignments {
            let Some(server) = fleet
                .iter_mut()
                .find(|record| record.name == assignment.server_name)
            else {
                warn!("Planned server {} vanished from the fleet", assignment.server_name);
                continue;
            };

            let schedule = server.schedules.get_mut(quarter);
            schedule.patch_date = Some(assignment.date);
            schedule.patch_time = Some(assignment.time);

            if active_quarter == Some(quarter) {
                server.status = ServerStatus::Scheduled;
            }
            server.touch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn fleet() -> Vec<ServerRecord> {
        vec![
            ServerRecord::new("db01", "America/New_York", "database", "alice"),
            ServerRecord::new("web01", "America/New_York", "application", "bob"),
            ServerRecord::new("dev01", "Europe/Berlin", "development", "carol"),
        ]
    }

    fn engine() -> AssignmentEngine {
        AssignmentEngine::new(
            Calendar::standard(),
            Classifier::standard(),
            SlotGridConfig::default(),
        )
    }

    #[test]
    fn every_server_assigned_when_capacity_suffices() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        let plan = engine().plan(&fleet(), Quarter::Q3, 2025, today, &HashMap::new());
        assert_eq!(plan.assignments.len(), 3);
        assert!(plan.unassigned.is_empty());
    }

    #[test]
    fn database_servers_get_late_window() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        let plan = engine().plan(&fleet(), Quarter::Q3, 2025, today, &HashMap::new());
        let db = plan
            .assignments
            .iter()
            .find(|a| a.server_name == "db01")
            .unwrap();
        assert_eq!(db.group, "database");
        assert!(db.time >= NaiveTime::from_hms_opt(21, 0, 0).unwrap());
        assert!((5..=7).contains(&db.date.month()));
    }

    #[test]
    fn apply_marks_active_quarter_scheduled() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let eng = engine();
        let mut servers = fleet();
        let plan = eng.plan(&servers, Quarter::Q3, 2025, today, &HashMap::new());
        eng.apply(&plan, &mut servers, Quarter::Q3, Some(Quarter::Q3));

        for server in &servers {
            assert!(!server.is_unscheduled(Quarter::Q3));
            assert_eq!(server.status, ServerStatus::Scheduled);
        }
    }

    #[test]
    fn predicted_time_overrides_group_window() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        let mut recommendations = HashMap::new();
        // Development group prefers 20:00-21:00, but prediction says 22:00
        recommendations.insert("dev01".to_string(), NaiveTime::from_hms_opt(22, 0, 0).unwrap());

        let plan = engine().plan(&fleet(), Quarter::Q3, 2025, today, &recommendations);
        let dev = plan
            .assignments
            .iter()
            .find(|a| a.server_name == "dev01")
            .unwrap();
        assert_eq!(dev.time, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert!(dev.rationale.contains("predicted"));
    }

    #[test]
    fn exhausted_quarter_reports_everyone_unassigned() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let plan = engine().plan(&fleet(), Quarter::Q3, 2025, today, &HashMap::new());
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.unassigned.len(), 3);
        assert!(!plan.warnings.is_empty());
    }
}
