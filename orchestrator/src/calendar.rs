//! Calendar engine for quarterly maintenance dates
//!
//! Fiscal quarters do not line up with calendar quarters: Q1 runs
//! November through January, so it spans two calendar years. The engine
//! enumerates candidate maintenance dates (a fixed weekday, Thursdays by
//! default) inside a quarter's month range, skipping anything not
//! strictly in the future.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::constants::calendar::MAINTENANCE_WEEKDAY;

/// One of the four fixed scheduling quarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Zero-based index for array-keyed quarter fields.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Quarter::Q1 => 0,
            Quarter::Q2 => 1,
            Quarter::Q3 => 2,
            Quarter::Q4 => 3,
        }
    }

    /// 1-based identifier used in logs and notifications.
    #[inline]
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_number(n: u8) -> Option<Quarter> {
        match n {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

/// Month range and display name for one quarter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterSpec {
    pub quarter: Quarter,
    pub name: String,
    /// Calendar months in scheduling order.
    pub months: [u32; 3],
    /// True when the month list crosses a calendar-year boundary; the
    /// trailing early months then belong to reference_year + 1.
    pub wraps_year: bool,
}

/// Calendar engine over a fixed quarter table.
#[derive(Debug, Clone)]
pub struct Calendar {
    quarters: Vec<QuarterSpec>,
    maintenance_weekday: Weekday,
}

impl Calendar {
    pub fn new(quarters: Vec<QuarterSpec>, maintenance_weekday: Weekday) -> Self {
        Self {
            quarters,
            maintenance_weekday,
        }
    }

    /// Stock quarter table: Q1 Nov-Jan (wraps), Q2 Feb-Apr, Q3 May-Jul,
    /// Q4 Aug-Oct. Every month 1-12 appears exactly once.
    pub fn standard() -> Self {
        Self::new(standard_quarters(), MAINTENANCE_WEEKDAY)
    }

    #[inline]
    pub fn maintenance_weekday(&self) -> Weekday {
        self.maintenance_weekday
    }

    pub fn quarter_spec(&self, quarter: Quarter) -> Option<&QuarterSpec> {
        self.quarters.iter().find(|spec| spec.quarter == quarter)
    }

    /// The quarter containing the given calendar month, if the table
    /// covers it.
    pub fn quarter_of_month(&self, month: u32) -> Option<Quarter> {
        self.quarters
            .iter()
            .find(|spec| spec.months.contains(&month))
            .map(|spec| spec.quarter)
    }

    /// The quarter that `today` falls into.
    pub fn active_quarter(&self, today: NaiveDate) -> Option<Quarter> {
        self.quarter_of_month(today.month())
    }

    /// Scheduling reference year as of `today`. Inside the wrapping
    /// quarter's early months (January in the stock table) the
    /// reference year is the previous calendar year.
    pub fn reference_year(&self, today: NaiveDate) -> i32 {
        match self.active_quarter(today).and_then(|q| self.quarter_spec(q)) {
            Some(spec) if spec.wraps_year && today.month() < spec.months[0] => today.year() - 1,
            _ => today.year(),
        }
    }

    /// All future maintenance-weekday dates inside the quarter, ascending.
    ///
    /// Dates on or before `today` are skipped; for a wrapping quarter the
    /// early months resolve to `reference_year + 1`. Returns an empty Vec
    /// rather than erroring when the quarter is exhausted.
    pub fn candidate_dates(
        &self,
        quarter: Quarter,
        reference_year: i32,
        today: NaiveDate,
    ) -> Vec<NaiveDate> {
        let Some(spec) = self.quarter_spec(quarter) else {
            return Vec::new();
        };

        let first_month = spec.months[0];
        let mut dates = Vec::new();

        for &month in &spec.months {
            let year = if spec.wraps_year && month < first_month {
                reference_year + 1
            } else {
                reference_year
            };

            for date in weekdays_in_month(year, month, self.maintenance_weekday) {
                if date > today {
                    dates.push(date);
                }
            }
        }

        dates.sort_unstable();
        dates
    }

    /// Earliest future maintenance date in the quarter, used by
    /// auto-approval when no date was ever proposed.
    pub fn earliest_candidate(
        &self,
        quarter: Quarter,
        reference_year: i32,
        today: NaiveDate,
    ) -> Option<NaiveDate> {
        self.candidate_dates(quarter, reference_year, today)
            .into_iter()
            .next()
    }
}

/// The stock quarter table.
pub fn standard_quarters() -> Vec<QuarterSpec> {
    vec![
        QuarterSpec {
            quarter: Quarter::Q1,
            name: "November - January".to_string(),
            months: [11, 12, 1],
            wraps_year: true,
        },
        QuarterSpec {
            quarter: Quarter::Q2,
            name: "February - April".to_string(),
            months: [2, 3, 4],
            wraps_year: false,
        },
        QuarterSpec {
            quarter: Quarter::Q3,
            name: "May - July".to_string(),
            months: [5, 6, 7],
            wraps_year: false,
        },
        QuarterSpec {
            quarter: Quarter::Q4,
            name: "August - October".to_string(),
            months: [8, 9, 10],
            wraps_year: false,
        },
    ]
}

/// Every date in (year, month) whose weekday matches.
fn weekdays_in_month(year: i32, month: u32, weekday: Weekday) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    let offset =
        (weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    let mut date = first + Duration::days(offset as i64);

    let mut dates = Vec::with_capacity(5);
    while date.month() == month {
        dates.push(date);
        date += Duration::days(7);
    }
    dates
}
