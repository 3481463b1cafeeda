//! Service layer: the persistence collaborator.

pub mod database;

pub use database::Database;
