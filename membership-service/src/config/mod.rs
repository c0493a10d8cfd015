//! Configuration module for membership-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::models::InvoiceNumbering;

#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub ledger: LedgerPolicy,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Ledger constants injected into the engines at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPolicy {
    pub numbering: InvoiceNumbering,
    pub voucher_code_length: usize,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            numbering: InvoiceNumbering::default(),
            voucher_code_length: 6,
        }
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl LedgerPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            numbering: InvoiceNumbering {
                prefix: env::var("INVOICE_CODE_PREFIX").unwrap_or(defaults.numbering.prefix),
                starting_number: parsed_or(
                    "INVOICE_STARTING_NUMBER",
                    defaults.numbering.starting_number,
                ),
            },
            voucher_code_length: parsed_or("VOUCHER_CODE_LENGTH", defaults.voucher_code_length)
                .max(4),
        }
    }
}

impl MembershipConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "membership-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            ledger: LedgerPolicy::from_env(),
        })
    }
}
