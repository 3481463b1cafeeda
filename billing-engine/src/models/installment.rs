//! Installment model.

use rust_decimal::Decimal;
use std::collections::HashMap;

/// Input for inserting one installment of a purchase.
///
/// Installments are created once and never updated or deleted by the engine;
/// value drift triggers a recompute-and-insert-missing pass instead.
#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub installment_id: String,
    pub transaction_id: String,
    pub invoice_id: String,
    /// 1-indexed installment number, unique per transaction.
    pub number: i32,
    pub statement_period: String,
    pub observations: String,
    pub base_value: Decimal,
    pub fees_taxes: Decimal,
}

/// Summary of the installment rows already persisted for one transaction.
#[derive(Debug, Clone, Default)]
pub struct ExistingInstallments {
    /// Installment number -> persisted installment id.
    pub by_number: HashMap<i32, String>,
    pub base_sum: Decimal,
    pub fees_sum: Decimal,
}
