//! Pure reconciliation logic: desired state vs persisted state, expressed as
//! insert/update/delete diffs over pre-fetched data. No I/O happens here.

pub mod installments;
pub mod invoices;
