//! engine-core: Shared infrastructure for the billing reconciliation engine.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use tracing;
