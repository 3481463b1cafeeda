//! Cycle date computation for one statement period.

use anyhow::anyhow;
use chrono::{Datelike, Duration, Months, NaiveDate};
use engine_core::error::AppError;
use tracing::warn;

use crate::calendar::BusinessCalendar;
use crate::models::{CardCycleConfig, StatementPeriod};

/// The three dates defining one billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDates {
    pub opening: NaiveDate,
    pub closing: NaiveDate,
    pub due: NaiveDate,
}

/// Compute opening/closing/due dates for `period`.
///
/// `previous_closing` is the closing date of the card's immediately
/// preceding cycle; periods must therefore be computed in strictly
/// increasing order per card, threading each closing date into the next
/// call. When it is unknown (a card's very first projected period) the
/// opening date is estimated from this period's closing date shifted back
/// one month.
pub fn compute_cycle_dates(
    card: &CardCycleConfig,
    period: StatementPeriod,
    previous_closing: Option<NaiveDate>,
    calendar: &BusinessCalendar,
) -> Result<CycleDates, AppError> {
    let nominal_due =
        match NaiveDate::from_ymd_opt(period.year(), period.month(), card.due_day as u32) {
            Some(date) => date,
            None => {
                // Due day beyond the end of the month (e.g. 31 in April):
                // clamp to the last day. Configuration edge case, not an error.
                let clamped = last_day_of_month(period)?;
                warn!(
                    card_id = card.card_id,
                    due_day = card.due_day,
                    period = %period,
                    clamped_to = clamped.day(),
                    "Due day does not exist in month, clamping to last day"
                );
                clamped
            }
        };

    let due = if card.postpone_due_date {
        calendar.next_business_day(nominal_due)?
    } else {
        nominal_due
    };

    let closing_reference = if card.postpone_due_date { due } else { nominal_due };
    let closing = closing_reference - Duration::days(card.closing_offset_days as i64);

    let opening = match previous_closing {
        Some(previous) => previous + Duration::days(1),
        None => {
            let estimated_previous = closing
                .checked_sub_months(Months::new(1))
                .ok_or_else(|| AppError::InvalidData(anyhow!("closing date {closing} underflows")))?;
            estimated_previous + Duration::days(1)
        }
    };

    Ok(CycleDates { opening, closing, due })
}

fn last_day_of_month(period: StatementPeriod) -> Result<NaiveDate, AppError> {
    let first = NaiveDate::from_ymd_opt(period.year(), period.month(), 1)
        .ok_or_else(|| AppError::InvalidData(anyhow!("invalid period {period}")))?;
    let next_month = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| AppError::InvalidData(anyhow!("period {period} overflows")))?;
    Ok(next_month - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period(y: i32, m: u32) -> StatementPeriod {
        StatementPeriod::new(y, m).unwrap()
    }

    fn card(due_day: i16, closing_offset_days: i16, postpone: bool) -> CardCycleConfig {
        CardCycleConfig {
            card_id: 1,
            user_id: 10,
            due_day,
            closing_offset_days,
            postpone_due_date: postpone,
            active: true,
        }
    }

    fn empty_calendar() -> BusinessCalendar {
        BusinessCalendar::new(HashSet::new())
    }

    #[test]
    fn due_day_31_clamps_in_april() {
        let dates = compute_cycle_dates(
            &card(31, 7, false),
            period(2024, 4),
            Some(date(2024, 3, 24)),
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(dates.due, date(2024, 4, 30));
        assert_eq!(dates.closing, date(2024, 4, 23));
        assert_eq!(dates.opening, date(2024, 3, 25));
    }

    #[test]
    fn due_day_clamps_in_leap_and_non_leap_february() {
        let leap = compute_cycle_dates(
            &card(30, 7, false),
            period(2024, 2),
            Some(date(2024, 1, 20)),
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(leap.due, date(2024, 2, 29));

        let non_leap = compute_cycle_dates(
            &card(30, 7, false),
            period(2023, 2),
            Some(date(2023, 1, 20)),
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(non_leap.due, date(2023, 2, 28));
    }

    #[test]
    fn postponement_shifts_due_and_closing_together() {
        // 2024-06-15 is a Saturday; next business day is Monday the 17th.
        let dates = compute_cycle_dates(
            &card(15, 7, true),
            period(2024, 6),
            Some(date(2024, 5, 9)),
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(dates.due, date(2024, 6, 17));
        assert_eq!(dates.closing, date(2024, 6, 10));
    }

    #[test]
    fn without_postponement_due_stays_nominal() {
        let dates = compute_cycle_dates(
            &card(15, 7, false),
            period(2024, 6),
            Some(date(2024, 5, 7)),
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(dates.due, date(2024, 6, 15));
        assert_eq!(dates.closing, date(2024, 6, 8));
    }

    #[test]
    fn postponement_may_cross_month_boundary() {
        // Due day 31 in August 2024: the 31st is a Saturday, so the due
        // date lands in September.
        let dates = compute_cycle_dates(
            &card(31, 7, true),
            period(2024, 8),
            Some(date(2024, 7, 26)),
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(dates.due, date(2024, 9, 2));
        assert_eq!(dates.closing, date(2024, 8, 26));
    }

    #[test]
    fn first_period_estimates_opening_from_closing() {
        let dates = compute_cycle_dates(
            &card(10, 7, false),
            period(2024, 5),
            None,
            &empty_calendar(),
        )
        .unwrap();
        assert_eq!(dates.closing, date(2024, 5, 3));
        assert_eq!(dates.opening, date(2024, 4, 4));
    }

    #[test]
    fn chained_periods_form_increasing_contiguous_intervals() {
        let config = card(15, 10, true);
        let calendar = empty_calendar();
        let mut previous_closing = None;
        let mut cycles = Vec::new();
        let mut target = period(2024, 1);
        for _ in 0..12 {
            let dates =
                compute_cycle_dates(&config, target, previous_closing, &calendar).unwrap();
            previous_closing = Some(dates.closing);
            cycles.push(dates);
            target = target.next();
        }
        for pair in cycles.windows(2) {
            assert!(pair[0].closing < pair[1].closing);
            assert!(pair[0].due < pair[1].due);
            // Opening of the next cycle is the day after this closing.
            assert_eq!(pair[1].opening, pair[0].closing + Duration::days(1));
        }
        for cycle in &cycles {
            assert!(cycle.opening <= cycle.closing);
            assert!(cycle.closing <= cycle.due);
        }
    }
}
