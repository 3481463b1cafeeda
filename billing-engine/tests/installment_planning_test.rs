//! Installment planning tests over in-memory fixture state.

use billing_engine::models::{CardTransaction, ExistingInstallments, StatementPeriod};
use billing_engine::reconcile::installments::{
    needs_regeneration, plan_installments, required_periods,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn period(s: &str) -> StatementPeriod {
    s.parse().unwrap()
}

fn transaction(id: &str, anchor: &str, count: i32, base: &str, fees: &str) -> CardTransaction {
    CardTransaction {
        transaction_id: id.to_string(),
        user_id: 7,
        card_id: 42,
        occurred_utc: Utc::now(),
        statement_period: anchor.to_string(),
        installment_count: count,
        base_value: dec(base),
        fees_taxes: dec(fees),
        description: Some("Notebook".to_string()),
    }
}

fn invoice_ids(periods: &[&str]) -> HashMap<(i64, StatementPeriod), String> {
    periods
        .iter()
        .enumerate()
        .map(|(i, p)| ((42, period(p)), format!("INV-{i}")))
        .collect()
}

fn existing_rows(
    transaction_id: &str,
    rows: &[(i32, &str, &str)],
) -> HashMap<String, ExistingInstallments> {
    let mut summary = ExistingInstallments::default();
    for (number, base, fees) in rows {
        summary
            .by_number
            .insert(*number, format!("{transaction_id}-{number}-P"));
        summary.base_sum += dec(base);
        summary.fees_sum += dec(fees);
    }
    HashMap::from([(transaction_id.to_string(), summary)])
}

#[test]
fn missing_invoice_becomes_a_gap_not_an_invoice() {
    // Three installments anchored at 2024-01, but no invoice for 2024-03.
    let transactions = vec![transaction("TX-1", "2024-01", 3, "100.00", "0.00")];
    let invoices = invoice_ids(&["2024-01", "2024-02"]);

    let plan = plan_installments(&transactions, &HashMap::new(), &invoices);

    assert_eq!(plan.inserts.len(), 2);
    assert_eq!(plan.gaps.len(), 1);
    assert_eq!(plan.gaps[0].transaction_id, "TX-1");
    assert_eq!(plan.gaps[0].card_id, 42);
    assert_eq!(plan.gaps[0].period, period("2024-03"));

    let numbers: Vec<i32> = plan.inserts.iter().map(|i| i.number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(plan.inserts[0].base_value, dec("33.33"));
    assert_eq!(plan.inserts[1].base_value, dec("33.33"));
}

#[test]
fn installment_rows_carry_period_invoice_and_observation() {
    let transactions = vec![transaction("TX-1", "2024-11", 3, "100.00", "0.00")];
    let invoices = invoice_ids(&["2024-11", "2024-12", "2025-01"]);

    let plan = plan_installments(&transactions, &HashMap::new(), &invoices);
    assert_eq!(plan.inserts.len(), 3);
    assert!(plan.gaps.is_empty());

    let third = &plan.inserts[2];
    assert_eq!(third.number, 3);
    assert_eq!(third.statement_period, "2025-01");
    assert_eq!(third.invoice_id, invoices[&(42, period("2025-01"))]);
    assert_eq!(third.observations, "Notebook - Parcela 3/3");
    assert_eq!(third.base_value, dec("33.34"));

    let total: Decimal = plan.inserts.iter().map(|i| i.base_value).sum();
    assert_eq!(total, dec("100.00"));
}

#[test]
fn default_description_is_used_when_absent() {
    let mut tx = transaction("TX-1", "2024-01", 1, "50.00", "0.00");
    tx.description = None;
    let plan = plan_installments(&[tx], &HashMap::new(), &invoice_ids(&["2024-01"]));
    assert_eq!(plan.inserts[0].observations, "Compra parcelada - Parcela 1/1");
}

#[test]
fn existing_numbers_are_never_overwritten() {
    let transactions = vec![transaction("TX-1", "2024-01", 3, "100.00", "0.00")];
    let existing = existing_rows("TX-1", &[(1, "33.33", "0.00"), (2, "33.33", "0.00")]);
    let invoices = invoice_ids(&["2024-01", "2024-02", "2024-03"]);

    let plan = plan_installments(&transactions, &existing, &invoices);

    assert_eq!(plan.inserts.len(), 1);
    assert_eq!(plan.inserts[0].number, 3);
    assert_eq!(plan.inserts[0].base_value, dec("33.34"));
    assert_eq!(plan.inserts[0].statement_period, "2024-03");
}

#[test]
fn complete_and_consistent_transaction_is_left_alone() {
    let transactions = vec![transaction("TX-1", "2024-01", 3, "100.00", "0.00")];
    let existing = existing_rows(
        "TX-1",
        &[(1, "33.33", "0.00"), (2, "33.33", "0.00"), (3, "33.34", "0.00")],
    );
    let invoices = invoice_ids(&["2024-01", "2024-02", "2024-03"]);

    let plan = plan_installments(&transactions, &existing, &invoices);
    assert!(plan.inserts.is_empty());
    assert!(plan.gaps.is_empty());
}

#[test]
fn sum_drift_triggers_regeneration_but_only_inserts_missing_rows() {
    // All three rows exist but their sum is far off the transaction total.
    // Regeneration recomputes and inserts missing numbers; existing rows are
    // never edited, so a fully-populated drifted transaction yields nothing.
    let tx = transaction("TX-1", "2024-01", 3, "100.00", "0.00");
    let existing = existing_rows(
        "TX-1",
        &[(1, "20.00", "0.00"), (2, "20.00", "0.00"), (3, "20.00", "0.00")],
    );
    assert!(needs_regeneration(&tx, &existing["TX-1"]));

    let plan = plan_installments(&[tx], &existing, &invoice_ids(&["2024-01", "2024-02", "2024-03"]));
    assert!(plan.inserts.is_empty());
    assert!(plan.gaps.is_empty());
}

#[test]
fn drift_within_per_row_tolerance_does_not_regenerate() {
    let tx = transaction("TX-1", "2024-01", 3, "100.00", "0.00");
    // Off by 2 cents in total: within the 3-cent accumulated tolerance.
    let existing = existing_rows(
        "TX-1",
        &[(1, "33.33", "0.00"), (2, "33.33", "0.00"), (3, "33.32", "0.00")],
    );
    assert!(!needs_regeneration(&tx, &existing["TX-1"]));
}

#[test]
fn fees_are_distributed_independently_and_zero_fees_stay_zero() {
    let with_fees = transaction("TX-1", "2024-01", 3, "100.00", "10.00");
    let invoices = invoice_ids(&["2024-01", "2024-02", "2024-03"]);

    let plan = plan_installments(&[with_fees], &HashMap::new(), &invoices);
    let fees: Vec<Decimal> = plan.inserts.iter().map(|i| i.fees_taxes).collect();
    assert_eq!(fees, vec![dec("3.33"), dec("3.33"), dec("3.34")]);

    let without_fees = transaction("TX-2", "2024-01", 3, "100.00", "0.00");
    let plan = plan_installments(&[without_fees], &HashMap::new(), &invoices);
    assert!(plan.inserts.iter().all(|i| i.fees_taxes == Decimal::ZERO));
}

#[test]
fn required_periods_skip_numbers_that_already_exist() {
    let transactions = vec![transaction("TX-1", "2024-11", 3, "100.00", "0.00")];
    let existing = existing_rows("TX-1", &[(1, "33.33", "0.00")]);

    let required = required_periods(&transactions, &existing);
    let expected: BTreeSet<(i64, StatementPeriod)> =
        BTreeSet::from([(42, period("2024-12")), (42, period("2025-01"))]);
    assert_eq!(required, expected);
}

#[test]
fn unparseable_anchor_period_skips_the_transaction() {
    let mut tx = transaction("TX-1", "2024-01", 2, "100.00", "0.00");
    tx.statement_period = "January-2024".to_string();
    let plan = plan_installments(&[tx], &HashMap::new(), &invoice_ids(&["2024-01", "2024-02"]));
    assert!(plan.inserts.is_empty());
    assert!(plan.gaps.is_empty());
}
