//! Invoice model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Closed,
    Paid,
    PartiallyPaid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Closed => "closed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "closed" => InvoiceStatus::Closed,
            "paid" => InvoiceStatus::Paid,
            "partially_paid" => InvoiceStatus::PartiallyPaid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Open,
        }
    }
}

/// A persisted invoice row.
///
/// At most one invoice exists per (card_id, statement_period). The engine
/// owns the three cycle date fields only while the invoice is still open and
/// no statement file has been issued; it never touches amounts or status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: String,
    pub card_id: i64,
    pub user_id: i64,
    pub statement_period: String,
    pub opening_date: NaiveDate,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    pub status: String,
    pub file_url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// Whether the engine may still rewrite this invoice's cycle dates.
    /// Issued statements (a file exists) and non-open invoices are frozen.
    pub fn dates_are_mutable(&self) -> bool {
        self.status == InvoiceStatus::Open.as_str() && self.file_url.is_none()
    }
}

/// Input for inserting a projected invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_id: String,
    pub card_id: i64,
    pub user_id: i64,
    pub statement_period: String,
    pub opening_date: NaiveDate,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Date correction for an invoice that drifted after a configuration change.
/// Only the three cycle dates are written, never amounts or status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDateCorrection {
    pub invoice_id: String,
    pub opening_date: NaiveDate,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
}
