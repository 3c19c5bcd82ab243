//! Property-based tests for recurrence resolution invariants.
//!
//! Uses `proptest` to generate arbitrary valid calendar dates and verify the
//! resolver's contract: the next occurrence is always strictly later, fixed
//! offsets are exact, and month/year arithmetic clips instead of skipping.

use chrono::{Datelike, NaiveDate};
use duepulse::recurrence::{RecurrencePattern, next_occurrence};
use proptest::prelude::*;

static PATTERNS: [RecurrencePattern; 4] = [
    RecurrencePattern::Daily,
    RecurrencePattern::Weekly,
    RecurrencePattern::Monthly,
    RecurrencePattern::Yearly,
];

/// Generate an arbitrary valid date between 1970 and 2100.
fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (1970i32..2100, 1u32..=12, 1u32..=31)
        .prop_filter_map("invalid calendar date", |(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d)
        })
}

fn arb_pattern() -> impl Strategy<Value = RecurrencePattern> {
    prop::sample::select(&PATTERNS[..])
}

proptest! {
    #[test]
    fn next_occurrence_is_strictly_greater(from in arb_date(), pattern in arb_pattern()) {
        let next = next_occurrence(pattern, from);
        prop_assert!(next > from, "{pattern} from {from} gave {next}");
    }

    #[test]
    fn daily_and_weekly_offsets_are_exact(from in arb_date()) {
        let daily = next_occurrence(RecurrencePattern::Daily, from);
        prop_assert_eq!((daily - from).num_days(), 1);

        let weekly = next_occurrence(RecurrencePattern::Weekly, from);
        prop_assert_eq!((weekly - from).num_days(), 7);
    }

    #[test]
    fn monthly_lands_in_the_next_month(from in arb_date()) {
        let next = next_occurrence(RecurrencePattern::Monthly, from);
        let expected_month = if from.month() == 12 { 1 } else { from.month() + 1 };
        prop_assert_eq!(next.month(), expected_month);

        // Clipping only ever moves the day down, never up.
        prop_assert!(next.day() <= from.day());
        if from.day() <= 28 {
            prop_assert_eq!(next.day(), from.day());
        }
    }

    #[test]
    fn yearly_preserves_month(from in arb_date()) {
        let next = next_occurrence(RecurrencePattern::Yearly, from);
        prop_assert_eq!(next.year(), from.year() + 1);
        prop_assert_eq!(next.month(), from.month());

        // Only Feb 29 is ever clipped.
        if from.month() == 2 && from.day() == 29 {
            prop_assert_eq!(next.day(), 28);
        } else {
            prop_assert_eq!(next.day(), from.day());
        }
    }

    #[test]
    fn repeated_advance_stays_monotonic(from in arb_date(), pattern in arb_pattern()) {
        let mut current = from;
        for _ in 0..12 {
            let next = next_occurrence(pattern, current);
            prop_assert!(next > current);
            current = next;
        }
    }

    #[test]
    fn pattern_tags_round_trip(pattern in arb_pattern()) {
        let parsed: RecurrencePattern = pattern.as_str().parse().unwrap();
        prop_assert_eq!(parsed, pattern);
    }
}
