//! Installment planning: split settled multi-installment purchases into one
//! row per statement period, anchored to already-existing invoices.

use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use crate::distribute::distribute;
use crate::ids;
use crate::models::{CardTransaction, ExistingInstallments, NewInstallment, StatementPeriod};

/// Accumulated per-row rounding tolerance: one cent per installment.
const PER_ROW_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const DEFAULT_DESCRIPTION: &str = "Compra parcelada";

/// How many missing periods a gap warning spells out before summarizing.
const GAP_LOG_DETAIL_LIMIT: usize = 5;

/// A required invoice that does not exist. Never fabricated here; logged
/// with enough context to action manually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceGap {
    pub transaction_id: String,
    pub card_id: i64,
    pub period: StatementPeriod,
}

/// Planned inserts for one batch of transactions, plus the gaps that kept
/// some installment numbers from being created.
#[derive(Debug, Default)]
pub struct InstallmentPlan {
    pub inserts: Vec<NewInstallment>,
    pub gaps: Vec<InvoiceGap>,
}

/// Whether a transaction's persisted installments need a recompute pass:
/// no rows, fewer rows than the installment count, or persisted sums that
/// drifted past the accumulated rounding tolerance.
pub fn needs_regeneration(transaction: &CardTransaction, existing: &ExistingInstallments) -> bool {
    let count = existing.by_number.len() as i32;
    if count == 0 || count < transaction.installment_count {
        return true;
    }

    let tolerance = PER_ROW_TOLERANCE * Decimal::from(count);
    let base_drift = (transaction.base_value - existing.base_sum).abs();
    let fees_drift = (transaction.fees_taxes - existing.fees_sum).abs();
    if base_drift > tolerance || fees_drift > tolerance {
        info!(
            transaction_id = %transaction.transaction_id,
            base_drift = %base_drift,
            fees_drift = %fees_drift,
            "Installment sums drifted from transaction totals, regenerating"
        );
        return true;
    }
    false
}

/// Every (card, period) an installment of this batch could land on, for
/// invoice-id prefetching. Numbers that already have a row are excluded.
pub fn required_periods(
    transactions: &[CardTransaction],
    existing: &HashMap<String, ExistingInstallments>,
) -> BTreeSet<(i64, StatementPeriod)> {
    let mut periods = BTreeSet::new();
    for transaction in transactions {
        let Ok(anchor) = transaction.statement_period.parse::<StatementPeriod>() else {
            continue;
        };
        let existing_numbers = existing.get(&transaction.transaction_id);
        for number in 1..=transaction.installment_count.max(0) {
            if existing_numbers.is_some_and(|e| e.by_number.contains_key(&number)) {
                continue;
            }
            periods.insert((transaction.card_id, anchor.plus_months(number as u32 - 1)));
        }
    }
    periods
}

/// Plan the installment rows to insert for one batch of transactions.
///
/// Existing rows are never overwritten; numbers whose invoice is missing are
/// skipped and reported as gaps. Base value and fees are distributed
/// independently with the remainder on the last installment.
pub fn plan_installments(
    transactions: &[CardTransaction],
    existing: &HashMap<String, ExistingInstallments>,
    invoice_ids: &HashMap<(i64, StatementPeriod), String>,
) -> InstallmentPlan {
    let mut plan = InstallmentPlan::default();

    for transaction in transactions {
        let no_rows = ExistingInstallments::default();
        let existing_rows = existing
            .get(&transaction.transaction_id)
            .unwrap_or(&no_rows);

        if !needs_regeneration(transaction, existing_rows) {
            continue;
        }
        if transaction.installment_count < 1 {
            warn!(
                transaction_id = %transaction.transaction_id,
                installment_count = transaction.installment_count,
                "Transaction has no installments to generate"
            );
            continue;
        }

        let anchor = match transaction.statement_period.parse::<StatementPeriod>() {
            Ok(anchor) => anchor,
            Err(e) => {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    statement_period = %transaction.statement_period,
                    error = %e,
                    "Transaction has an unparseable anchor period, skipping"
                );
                continue;
            }
        };

        let count = transaction.installment_count as u32;
        let base_values = distribute(transaction.base_value, count);
        let fees_values = if transaction.fees_taxes > Decimal::ZERO {
            distribute(transaction.fees_taxes, count)
        } else {
            vec![Decimal::ZERO; count as usize]
        };

        let description = transaction
            .description
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        let mut missing = Vec::new();
        for number in 1..=transaction.installment_count {
            if existing_rows.by_number.contains_key(&number) {
                continue;
            }

            let target = anchor.plus_months(number as u32 - 1);
            let Some(invoice_id) = invoice_ids.get(&(transaction.card_id, target)) else {
                missing.push(target);
                plan.gaps.push(InvoiceGap {
                    transaction_id: transaction.transaction_id.clone(),
                    card_id: transaction.card_id,
                    period: target,
                });
                continue;
            };

            plan.inserts.push(NewInstallment {
                installment_id: ids::new_installment_id(),
                transaction_id: transaction.transaction_id.clone(),
                invoice_id: invoice_id.clone(),
                number,
                statement_period: target.to_string(),
                observations: format!(
                    "{description} - Parcela {number}/{}",
                    transaction.installment_count
                ),
                base_value: base_values[number as usize - 1],
                fees_taxes: fees_values[number as usize - 1],
            });
        }

        if !missing.is_empty() {
            warn!(
                transaction_id = %transaction.transaction_id,
                card_id = transaction.card_id,
                missing_periods = %summarize_periods(&missing),
                "Missing invoices for installment periods; run invoice \
                 reconciliation to create them"
            );
        }
    }

    plan
}

fn summarize_periods(periods: &[StatementPeriod]) -> String {
    let mut summary = periods
        .iter()
        .take(GAP_LOG_DETAIL_LIMIT)
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if periods.len() > GAP_LOG_DETAIL_LIMIT {
        summary.push_str(&format!(" and {} more", periods.len() - GAP_LOG_DETAIL_LIMIT));
    }
    summary
}
