//! Service configuration
//!
//! Defaults overridden by `STAYS_*` environment variables, e.g.
//! `STAYS_BIND_ADDRESS=127.0.0.1:8080` or `STAYS_STORAGE=memory`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where domain state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// API service settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Socket address to listen on
    pub bind_address: String,
    /// HS256 secret bearer tokens are signed with
    pub jwt_secret: String,
    pub storage: StorageBackend,
    /// Whether host-blocked ranges reject bookings
    pub enforce_host_blocks: bool,
    /// Base URL checkout sessions are served from
    pub checkout_base_url: String,
    pub currency: String,
    /// Cron expression for draining the outbox
    pub outbox_schedule: String,
    /// Cron expression for polling open payment sessions
    pub reconcile_schedule: String,
    pub outbox_batch_size: usize,
}

impl Settings {
    /// Load settings from defaults and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_address", "0.0.0.0:3001")?
            .set_default("storage", "postgres")?
            .set_default("enforce_host_blocks", true)?
            .set_default("checkout_base_url", "http://localhost:3001/checkout")?
            .set_default("currency", "usd")?
            .set_default("outbox_schedule", "*/5 * * * * *")?
            .set_default("reconcile_schedule", "*/30 * * * * *")?
            .set_default("outbox_batch_size", 100)?
            .add_source(Environment::with_prefix("STAYS").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
