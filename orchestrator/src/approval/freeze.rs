//! Weekly freeze window
//!
//! Schedule changes close down for the stretch from the current week's
//! maintenance day through the day before next week's maintenance day.
//! Concretely: with `next_maint` the first maintenance weekday on or
//! after today, every date before `next_maint + 7 days` is frozen. Past
//! dates are always frozen, and unparseable date strings are treated as
//! frozen rather than mutable (fail-safe).

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// First date that is open for schedule changes.
pub fn freeze_boundary(today: NaiveDate, maintenance_weekday: Weekday) -> NaiveDate {
    let days_until = (maintenance_weekday.num_days_from_monday() + 7
        - today.weekday().num_days_from_monday())
        % 7;
    let next_maint = today + Duration::days(days_until as i64);
    next_maint + Duration::days(7)
}

/// Whether a date may not be (re)scheduled right now.
pub fn is_frozen(date: NaiveDate, today: NaiveDate, maintenance_weekday: Weekday) -> bool {
    date < freeze_boundary(today, maintenance_weekday)
}

/// Freeze check over an owner-supplied date string. Anything that does
/// not parse as `YYYY-MM-DD` counts as frozen.
pub fn is_frozen_str(date: &str, today: NaiveDate, maintenance_weekday: Weekday) -> bool {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(parsed) => is_frozen(parsed, today, maintenance_weekday),
        Err(_) => true,
    }
}
