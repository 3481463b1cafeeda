//! Credit-card billing cycle and installment reconciliation engine.
//!
//! Two batch jobs share this library:
//!
//! - `reconcile-invoices` projects a rolling window of statement periods for
//!   every card and reconciles the projection against persisted invoices.
//! - `reconcile-installments` splits settled multi-installment purchases into
//!   one installment row per statement period, anchored to existing invoices.
//!
//! The reconcilers themselves are pure functions over pre-fetched data; all
//! I/O lives in [`services::Database`] and is orchestrated per batch by
//! [`batch`].

pub mod batch;
pub mod calendar;
pub mod config;
pub mod cycle;
pub mod distribute;
pub mod ids;
pub mod models;
pub mod reconcile;
pub mod services;
