//! Configuration for the reconciliation binaries.

use anyhow::anyhow;
use chrono::NaiveDate;
use engine_core::config as core_config;
use engine_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub database: DatabaseConfig,
    /// Consecutive statement periods projected per card, starting at the
    /// current month.
    pub lookahead_months: u32,
    /// Pins "today" for deterministic reruns; defaults to the current UTC
    /// date when unset.
    pub run_as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

const DEFAULT_LOOKAHEAD_MONTHS: u32 = 24;

impl EngineConfig {
    pub fn from_env(default_service_name: &str) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let common = core_config::Config::load()?;

        let lookahead_months = match env::var("LOOKAHEAD_MONTHS") {
            Ok(raw) => raw.parse::<u32>().ok().filter(|m| *m >= 1).ok_or_else(|| {
                AppError::ConfigError(anyhow!("LOOKAHEAD_MONTHS must be a positive integer"))
            })?,
            Err(_) => DEFAULT_LOOKAHEAD_MONTHS,
        };

        let run_as_of = match env::var("RUN_AS_OF") {
            Ok(raw) => Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                AppError::ConfigError(anyhow!("RUN_AS_OF must be a YYYY-MM-DD date"))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| default_service_name.to_string()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| AppError::ConfigError(anyhow!("DATABASE_URL is required")))?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            },
            lookahead_months,
            run_as_of,
        })
    }
}
