//! Typed records for the reconciliation engine.

mod card;
mod installment;
mod invoice;
mod period;
mod transaction;

pub use card::CardCycleConfig;
pub use installment::{ExistingInstallments, NewInstallment};
pub use invoice::{Invoice, InvoiceDateCorrection, InvoiceStatus, NewInvoice};
pub use period::StatementPeriod;
pub use transaction::{CardTransaction, TransactionStatus};
