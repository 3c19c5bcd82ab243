//! Recurrence pattern resolution for recurring task templates.
//!
//! This module implements the calendar arithmetic that advances a recurring
//! template from one occurrence date to the next. It is deliberately pure:
//! no storage access, no clock access, no side effects. Everything time- or
//! state-dependent lives in the jobs layer, which makes this the easiest
//! part of the pipeline to test exhaustively.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::RecurrenceError;

/// How often a recurring task template produces a new task instance.
///
/// Stored in the database as a lowercase text tag (`daily`, `weekly`,
/// `monthly`, `yearly`). Parsing happens at the point of use so that a
/// template carrying an unknown tag fails only that template, never the
/// whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Yearly => "yearly",
        }
    }
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrencePattern {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(RecurrencePattern::Daily),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            "yearly" => Ok(RecurrencePattern::Yearly),
            other => Err(RecurrenceError::InvalidPattern {
                pattern: other.to_string(),
            }),
        }
    }
}

/// Compute the next occurrence date strictly after `from`.
///
/// - `daily`: +1 day
/// - `weekly`: +7 days
/// - `monthly`: same day-of-month next month, clipped to the last valid day
///   when the target month is shorter (Jan 31 -> Feb 28, or Feb 29 in a leap
///   year)
/// - `yearly`: same month/day next year, with Feb 29 clipped to Feb 28 on
///   non-leap years
///
/// Saturates at `NaiveDate::MAX`, which is unreachable for calendar data.
pub fn next_occurrence(pattern: RecurrencePattern, from: NaiveDate) -> NaiveDate {
    match pattern {
        RecurrencePattern::Daily => from
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX),
        RecurrencePattern::Weekly => from
            .checked_add_days(Days::new(7))
            .unwrap_or(NaiveDate::MAX),
        RecurrencePattern::Monthly => from
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX),
        RecurrencePattern::Yearly => from
            .checked_add_months(Months::new(12))
            .unwrap_or(NaiveDate::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_and_weekly_are_fixed_offsets() {
        assert_eq!(
            next_occurrence(RecurrencePattern::Daily, date(2025, 1, 10)),
            date(2025, 1, 11)
        );
        assert_eq!(
            next_occurrence(RecurrencePattern::Daily, date(2024, 12, 31)),
            date(2025, 1, 1)
        );
        assert_eq!(
            next_occurrence(RecurrencePattern::Weekly, date(2025, 1, 28)),
            date(2025, 2, 4)
        );
    }

    #[test]
    fn test_monthly_clips_to_last_valid_day() {
        // Non-leap February
        assert_eq!(
            next_occurrence(RecurrencePattern::Monthly, date(2025, 1, 31)),
            date(2025, 2, 28)
        );
        // Leap February
        assert_eq!(
            next_occurrence(RecurrencePattern::Monthly, date(2024, 1, 31)),
            date(2024, 2, 29)
        );
        // 31-day month into a 30-day month
        assert_eq!(
            next_occurrence(RecurrencePattern::Monthly, date(2025, 3, 31)),
            date(2025, 4, 30)
        );
        // Day-of-month is preserved when the target month is long enough
        assert_eq!(
            next_occurrence(RecurrencePattern::Monthly, date(2025, 4, 15)),
            date(2025, 5, 15)
        );
    }

    #[test]
    fn test_yearly_clips_leap_day() {
        assert_eq!(
            next_occurrence(RecurrencePattern::Yearly, date(2024, 2, 29)),
            date(2025, 2, 28)
        );
        assert_eq!(
            next_occurrence(RecurrencePattern::Yearly, date(2025, 6, 1)),
            date(2026, 6, 1)
        );
    }

    #[test]
    fn test_next_occurrence_is_strictly_greater() {
        let patterns = [
            RecurrencePattern::Daily,
            RecurrencePattern::Weekly,
            RecurrencePattern::Monthly,
            RecurrencePattern::Yearly,
        ];
        for pattern in patterns {
            let from = date(2025, 1, 31);
            assert!(next_occurrence(pattern, from) > from, "pattern {pattern}");
        }
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(
            "daily".parse::<RecurrencePattern>().unwrap(),
            RecurrencePattern::Daily
        );
        assert_eq!(
            "yearly".parse::<RecurrencePattern>().unwrap(),
            RecurrencePattern::Yearly
        );
        let err = "fortnightly".parse::<RecurrencePattern>().unwrap_err();
        assert!(err.to_string().contains("fortnightly"));
    }

    #[test]
    fn test_pattern_round_trips_through_display() {
        for tag in ["daily", "weekly", "monthly", "yearly"] {
            let pattern: RecurrencePattern = tag.parse().unwrap();
            assert_eq!(pattern.to_string(), tag);
        }
    }
}
