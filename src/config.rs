use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::fetch::FetchOptions;

pub const CONFIG_ENV: &str = "DRIVEFETCH_CONFIG";
pub const LISTEN_ENV: &str = "LISTEN";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub writable: bool,
    /// Follows `writable` when unset
    pub extension_messages: Option<bool>,
    pub timeout_ms: u64,
    pub max_drives: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            writable: false,
            extension_messages: None,
            timeout_ms: 5000,
            max_drives: None,
        }
    }
}

impl FetchConfig {
    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            writable: self.writable,
            extension_messages: self.extension_messages.unwrap_or(self.writable),
            timeout: Duration::from_millis(self.timeout_ms),
            max_drives: self.max_drives,
        }
    }
}

impl Config {
    /// Reads the YAML file named by `DRIVEFETCH_CONFIG`, if set, then applies
    /// the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&raw).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };
        Ok(config.with_listen_override(std::env::var(LISTEN_ENV).ok()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn with_listen_override(mut self, listen_addr: Option<String>) -> Self {
        if let Some(addr) = listen_addr.filter(|addr| !addr.is_empty()) {
            self.server.listen_addr = addr;
        }
        self
    }
}
