//! TOML configuration for the client.
//!
//! Every section has defaults so a missing file or a partial file still
//! yields a usable [`Config`]:
//!
//! ```toml
//! [services.central]
//! url = "http://localhost:5005/api"
//!
//! [services.search]
//! url = "http://localhost:5000/api"
//!
//! [services.updates]
//! url = "http://localhost:5001/api"
//!
//! [readiness]
//! timeout_secs = 60
//! retry_delay_ms = 1000
//! request_timeout_secs = 10
//!
//! [updates]
//! poll_interval_ms = 2200
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default = "default_central")]
    pub central: ServiceConfig,
    #[serde(default = "default_search")]
    pub search: ServiceConfig,
    #[serde(default = "default_updates")]
    pub updates: ServiceConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            central: default_central(),
            search: default_search(),
            updates: default_updates(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub url: String,
}

fn default_central() -> ServiceConfig {
    ServiceConfig {
        url: "http://localhost:5005/api".to_string(),
    }
}
fn default_search() -> ServiceConfig {
    ServiceConfig {
        url: "http://localhost:5000/api".to_string(),
    }
}
fn default_updates() -> ServiceConfig {
    ServiceConfig {
        url: "http://localhost:5001/api".to_string(),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    /// Global deadline for the whole readiness sequence.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Per-request socket timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdatesConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2200
}

impl UpdatesConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to defaults.
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!("config {} not found, using defaults", path.display());
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.readiness.timeout_secs == 0 {
        anyhow::bail!("readiness.timeout_secs must be > 0");
    }
    if config.readiness.retry_delay_ms == 0 {
        anyhow::bail!("readiness.retry_delay_ms must be > 0");
    }
    if config.updates.poll_interval_ms == 0 {
        anyhow::bail!("updates.poll_interval_ms must be > 0");
    }

    for (name, service) in [
        ("central", &config.services.central),
        ("search", &config.services.search),
        ("updates", &config.services.updates),
    ] {
        if !(service.url.starts_with("http://") || service.url.starts_with("https://")) {
            anyhow::bail!(
                "services.{}.url must start with http:// or https:// (got '{}')",
                name,
                service.url
            );
        }
    }

    Ok(())
}
