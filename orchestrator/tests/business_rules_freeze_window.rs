//! Business Rule Tests: Weekly Freeze Window
//!
//! These tests verify that:
//! - Dates before next week's maintenance day cannot be (re)scheduled
//! - The freeze verdict is downward-closed: nothing frozen ever thaws
//!   for an earlier date
//! - Owner-supplied strings that do not parse are treated as frozen

mod common;

use chrono::{Duration, Weekday};
use common::fixtures::*;
use orchestrator::approval::freeze;

#[test]
fn test_freeze_covers_through_next_maintenance_week() {
    // Monday 2025-06-02: this week's Thursday is 06-05, so everything
    // before 06-12 is closed
    let today = date(2025, 6, 2);
    let boundary = freeze::freeze_boundary(today, Weekday::Thu);
    assert_eq!(boundary, date(2025, 6, 12));

    assert!(freeze::is_frozen(date(2025, 6, 5), today, Weekday::Thu));
    assert!(freeze::is_frozen(date(2025, 6, 11), today, Weekday::Thu));
    assert!(!freeze::is_frozen(date(2025, 6, 12), today, Weekday::Thu));
    assert!(!freeze::is_frozen(date(2025, 6, 19), today, Weekday::Thu));
}

#[test]
fn test_freeze_is_downward_closed() {
    let today = date(2025, 6, 2);
    let mut probe = date(2025, 5, 1);
    let mut seen_open = false;
    while probe < date(2025, 7, 15) {
        let frozen = freeze::is_frozen(probe, today, Weekday::Thu);
        if seen_open {
            assert!(!frozen, "{} frozen after an earlier open date", probe);
        }
        seen_open = seen_open || !frozen;
        probe += Duration::days(1);
    }
    assert!(seen_open);
}

#[test]
fn test_past_dates_are_always_frozen() {
    let today = date(2025, 6, 2);
    assert!(freeze::is_frozen(date(2025, 5, 29), today, Weekday::Thu));
    assert!(freeze::is_frozen(date(2024, 12, 25), today, Weekday::Thu));
}

#[test]
fn test_unparseable_date_strings_are_frozen() {
    let today = date(2025, 6, 2);
    assert!(freeze::is_frozen_str("not-a-date", today, Weekday::Thu));
    assert!(freeze::is_frozen_str("2025-13-40", today, Weekday::Thu));
    assert!(freeze::is_frozen_str("", today, Weekday::Thu));

    // Whitespace around a valid open date is tolerated
    assert!(!freeze::is_frozen_str(" 2025-06-19 ", today, Weekday::Thu));
}

#[test]
fn test_boundary_on_the_maintenance_day_itself() {
    // Thursday today: the freeze still reaches a full week ahead
    let today = date(2025, 6, 5);
    assert_eq!(freeze::freeze_boundary(today, Weekday::Thu), date(2025, 6, 12));
    assert!(freeze::is_frozen(today, today, Weekday::Thu));
}
