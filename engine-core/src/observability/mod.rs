//! Observability utilities shared by the engine binaries.

pub mod logging;

pub use logging::init_tracing;
