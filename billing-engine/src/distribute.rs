//! Rounding-safe distribution of a monetary total into installments.

use rust_decimal::{Decimal, RoundingStrategy};

/// Split `total` into `parts` values that sum back to `total` to the cent.
///
/// The first `parts - 1` values are `total / parts` rounded to 2 decimal
/// places; the last value absorbs the rounding remainder. Asymmetric on
/// purpose: the rule is simple to audit and deterministic.
pub fn distribute(total: Decimal, parts: u32) -> Vec<Decimal> {
    if parts == 0 {
        return Vec::new();
    }
    if parts == 1 {
        return vec![total];
    }

    let per_part = (total / Decimal::from(parts))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let mut values = vec![per_part; (parts - 1) as usize];
    let last = (total - per_part * Decimal::from(parts - 1))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    values.push(last);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn zero_parts_yields_empty() {
        assert!(distribute(dec("10.00"), 0).is_empty());
    }

    #[test]
    fn one_part_returns_total_unchanged() {
        assert_eq!(distribute(dec("10.00"), 1), vec![dec("10.00")]);
    }

    #[test]
    fn remainder_lands_on_last_part() {
        assert_eq!(
            distribute(dec("100.00"), 3),
            vec![dec("33.33"), dec("33.33"), dec("33.34")]
        );
    }

    #[test]
    fn even_split_has_no_remainder() {
        assert_eq!(
            distribute(dec("100.00"), 4),
            vec![dec("25.00"), dec("25.00"), dec("25.00"), dec("25.00")]
        );
    }

    #[test]
    fn last_part_can_absorb_a_shortfall() {
        // 0.10 / 3 rounds up to 0.03 per part; the last part compensates down.
        assert_eq!(
            distribute(dec("0.10"), 3),
            vec![dec("0.03"), dec("0.03"), dec("0.04")]
        );
        assert_eq!(
            distribute(dec("0.20"), 3),
            vec![dec("0.07"), dec("0.07"), dec("0.06")]
        );
    }

    #[test]
    fn sums_are_exact_across_samples() {
        let totals = ["0.01", "0.10", "1.00", "99.99", "100.00", "123.45", "2500.37"];
        for total in totals {
            let total = dec(total);
            for parts in 1..=24u32 {
                let values = distribute(total, parts);
                assert_eq!(values.len(), parts as usize);
                let sum: Decimal = values.iter().sum();
                assert_eq!(sum, total, "total {total} over {parts} parts");
            }
        }
    }
}
