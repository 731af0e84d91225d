//! Evening slot grid with per-slot capacity
//!
//! The planner builds a finite grid of (date, time) slots across the
//! quarter's candidate dates and tracks a running occupancy counter per
//! slot. Slot selection prefers a group's sub-window and breaks ties by
//! lowest current occupancy, which is what spreads the fleet across the
//! quarter instead of piling everyone onto the first Thursday.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;

/// One assignable (date, time) cell.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub assigned: u32,
}

/// Grid parameters, normally taken from the orchestrator config.
#[derive(Debug, Clone, Copy)]
pub struct SlotGridConfig {
    pub window_start_hour: u32,
    pub window_span_hours: u32,
    pub step_minutes: u32,
    pub slot_capacity: u32,
}

impl Default for SlotGridConfig {
    fn default() -> Self {
        use crate::constants::slots;
        Self {
            window_start_hour: slots::WINDOW_START_HOUR,
            window_span_hours: slots::WINDOW_SPAN_HOURS,
            step_minutes: slots::STEP_MINUTES,
            slot_capacity: slots::SLOT_CAPACITY,
        }
    }
}

/// Mutable slot inventory for one assignment run.
#[derive(Debug, Clone)]
pub struct SlotPlan {
    slots: Vec<TimeSlot>,
    capacity: u32,
}

impl SlotPlan {
    /// Build the full grid over the candidate dates. The grid is empty
    /// when no candidate dates remain in the quarter.
    pub fn build(dates: &[NaiveDate], config: SlotGridConfig) -> Self {
        let steps = (config.window_span_hours * 60) / config.step_minutes.max(1);
        let start = NaiveTime::from_hms_opt(config.window_start_hour.min(23), 0, 0)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(20, 0, 0).unwrap());

        let mut slots = Vec::with_capacity(dates.len() * steps as usize);
        for &date in dates {
            for step in 0..steps {
                let time = start + Duration::minutes((step * config.step_minutes) as i64);
                // Overflowing past midnight would land on the wrong date
                if time < start {
                    break;
                }
                slots.push(TimeSlot {
                    date,
                    time,
                    assigned: 0,
                });
            }
        }

        Self {
            slots,
            capacity: config.slot_capacity.max(1),
        }
    }

    /// Pre-load occupancy from schedules that already exist on the
    /// fleet, so a re-run does not double-book slots.
    pub fn seed_occupancy<'a>(
        &mut self,
        existing: impl IntoIterator<Item = (&'a NaiveDate, &'a NaiveTime)>,
    ) {
        for (date, time) in existing {
            if let Some(slot) = self
                .slots
                .iter_mut()
                .find(|slot| slot.date == *date && slot.time == *time)
            {
                slot.assigned += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Claim the best available slot: preferred-window slots first,
    /// lowest occupancy among equals, earliest (date, time) as the final
    /// tie-break. Falls back to any under-capacity slot when nothing in
    /// the preferred window is open. Returns None when the grid is full.
    pub fn claim(&mut self, preferred: Option<(NaiveTime, NaiveTime)>) -> Option<(NaiveDate, NaiveTime, bool)> {
        let index = self
            .best_index(preferred)
            .or_else(|| if preferred.is_some() { self.best_index(None) } else { None })?;

        let slot = &mut self.slots[index];
        slot.assigned += 1;
        let in_window = preferred
            .map(|(start, end)| slot.time >= start && slot.time <= end)
            .unwrap_or(true);
        Some((slot.date, slot.time, in_window))
    }

    /// Claim strictly inside a window, with no fallback. Used when a
    /// load prediction nominates a specific time-of-day.
    pub fn claim_within(&mut self, window: (NaiveTime, NaiveTime)) -> Option<(NaiveDate, NaiveTime)> {
        let index = self.best_index(Some(window))?;
        let slot = &mut self.slots[index];
        slot.assigned += 1;
        Some((slot.date, slot.time))
    }

    fn best_index(&self, preferred: Option<(NaiveTime, NaiveTime)>) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.assigned < self.capacity)
            .filter(|(_, slot)| match preferred {
                Some((start, end)) => slot.time >= start && slot.time <= end,
                None => true,
            })
            .min_by_key(|(_, slot)| (slot.assigned, slot.date, slot.time))
            .map(|(index, _)| index)
    }

    /// Least-occupied open slot, used by auto-approval for its default
    /// time assignment.
    pub fn least_occupied(&self) -> Option<(NaiveDate, NaiveTime)> {
        self.slots
            .iter()
            .filter(|slot| slot.assigned < self.capacity)
            .min_by_key(|slot| (slot.assigned, slot.date, slot.time))
            .map(|slot| (slot.date, slot.time))
    }
}
