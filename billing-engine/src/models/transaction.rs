//! Card transaction model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Settled,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Settled => "settled",
            TransactionStatus::Reversed => "reversed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "settled" => TransactionStatus::Settled,
            "reversed" => TransactionStatus::Reversed,
            _ => TransactionStatus::Pending,
        }
    }
}

/// A settled multi-installment purchase pending installment generation.
/// Read-only input to installment reconciliation; never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardTransaction {
    pub transaction_id: String,
    pub user_id: i64,
    pub card_id: i64,
    pub occurred_utc: DateTime<Utc>,
    /// Anchor period of the first installment, as `YYYY-MM`.
    pub statement_period: String,
    pub installment_count: i32,
    pub base_value: Decimal,
    pub fees_taxes: Decimal,
    pub description: Option<String>,
}
