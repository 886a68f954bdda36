use std::{env, time::Duration};

use log::*;
use ppg_common::Secret;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ppg_store.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_WEBHOOK_SECRET: &str = "default_secret";

/// Engine-level configuration. Everything can be supplied via environment variables; missing or malformed values
/// fall back to documented defaults with a logged warning.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long the engine waits for the authorization provider before treating the attempt as declined.
    pub provider_timeout: Duration,
    /// The key used to sign webhook payloads.
    pub webhook_secret: Secret<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            provider_timeout: Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS),
            webhook_secret: Secret::new(DEFAULT_WEBHOOK_SECRET.to_string()),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("PPG_DATABASE_URL").unwrap_or_else(|_| {
            info!("🪛️ PPG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env::var("PPG_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .map_err(|e| {
                        warn!("🪛️ {s} is not a valid value for PPG_MAX_CONNECTIONS. {e}. Using the default.");
                        e
                    })
                    .ok()
            })
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let provider_timeout = env::var("PPG_PROVIDER_TIMEOUT_MS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| {
                        warn!("🪛️ {s} is not a valid value for PPG_PROVIDER_TIMEOUT_MS. {e}. Using the default.");
                        e
                    })
                    .ok()
            })
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_PROVIDER_TIMEOUT_MS));
        let webhook_secret = match env::var("PPG_WEBHOOK_SECRET") {
            Ok(s) => Secret::new(s),
            Err(_) => {
                warn!(
                    "🪛️ PPG_WEBHOOK_SECRET is not set. Webhook signatures will use a well-known default secret. Do \
                     not do this in production."
                );
                Secret::new(DEFAULT_WEBHOOK_SECRET.to_string())
            },
        };
        Self { database_url, max_connections, provider_timeout, webhook_secret }
    }
}
