//! Business-day calendar.

use anyhow::anyhow;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use engine_core::error::AppError;
use std::collections::HashSet;

/// Upper bound on consecutive non-business days. Holiday runs are short in
/// practice; hitting this bound means the holiday data is broken.
const MAX_POSTPONE_DAYS: u32 = 14;

/// Answers business-day questions for one jurisdiction, backed by a
/// pre-fetched holiday set covering the projection horizon.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    holidays: HashSet<NaiveDate>,
}

impl BusinessCalendar {
    pub fn new(holidays: HashSet<NaiveDate>) -> Self {
        Self { holidays }
    }

    /// True unless the date is a Saturday, Sunday, or configured holiday.
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// The date itself if it is a business day, otherwise the next one.
    pub fn next_business_day(&self, date: NaiveDate) -> Result<NaiveDate, AppError> {
        let mut adjusted = date;
        for _ in 0..=MAX_POSTPONE_DAYS {
            if self.is_business_day(adjusted) {
                return Ok(adjusted);
            }
            adjusted += Duration::days(1);
        }
        Err(AppError::CalendarError(anyhow!(
            "no business day within {MAX_POSTPONE_DAYS} days after {date}"
        )))
    }
}

/// The holiday years a run must cover so that postponement never falls off
/// the edge of the set: one year back through the projection horizon plus one.
pub fn years_to_cover(current_year: i32, lookahead_months: u32) -> Vec<i32> {
    let horizon = current_year + lookahead_months.div_ceil(12) as i32 + 1;
    (current_year - 1..=horizon).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calendar_with_holiday(holiday: NaiveDate) -> BusinessCalendar {
        BusinessCalendar::new(HashSet::from([holiday]))
    }

    #[test]
    fn weekends_are_not_business_days() {
        let cal = BusinessCalendar::new(HashSet::new());
        assert!(!cal.is_business_day(date(2024, 6, 1))); // Saturday
        assert!(!cal.is_business_day(date(2024, 6, 2))); // Sunday
        assert!(cal.is_business_day(date(2024, 6, 3))); // Monday
    }

    #[test]
    fn holidays_are_not_business_days() {
        let cal = calendar_with_holiday(date(2024, 6, 3));
        assert!(!cal.is_business_day(date(2024, 6, 3)));
    }

    #[test]
    fn next_business_day_skips_weekend_and_holiday() {
        // Saturday + Monday holiday -> Tuesday
        let cal = calendar_with_holiday(date(2024, 6, 3));
        assert_eq!(cal.next_business_day(date(2024, 6, 1)).unwrap(), date(2024, 6, 4));
    }

    #[test]
    fn next_business_day_is_idempotent() {
        let cal = calendar_with_holiday(date(2024, 6, 3));
        let first = cal.next_business_day(date(2024, 6, 1)).unwrap();
        assert_eq!(cal.next_business_day(first).unwrap(), first);
    }

    #[test]
    fn unbroken_holiday_run_errors_out() {
        let start = date(2024, 6, 3);
        let holidays: HashSet<NaiveDate> =
            (0..60).map(|i| start + Duration::days(i)).collect();
        let cal = BusinessCalendar::new(holidays);
        assert!(cal.next_business_day(start).is_err());
    }

    #[test]
    fn year_coverage_includes_boundaries() {
        assert_eq!(years_to_cover(2024, 24), vec![2023, 2024, 2025, 2026, 2027]);
        // Partial years round up: a 6-month horizon started in December
        // still reaches into the following year.
        assert_eq!(years_to_cover(2024, 6), vec![2023, 2024, 2025, 2026]);
        assert_eq!(years_to_cover(2024, 13), vec![2023, 2024, 2025, 2026, 2027]);
    }
}
