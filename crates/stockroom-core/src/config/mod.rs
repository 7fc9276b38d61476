//! Client configuration.
//!
//! `ClientConfig` is stored as JSON and can be overridden per process through
//! `STOCKROOM_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::offline::DEFAULT_CACHE_GENERATION;
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_API_URL: &str = "STOCKROOM_API_URL";
pub const ENV_DB_PATH: &str = "STOCKROOM_DB_PATH";
pub const ENV_SYNC_INTERVAL_SECS: &str = "STOCKROOM_SYNC_INTERVAL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "STOCKROOM_REQUEST_TIMEOUT_SECS";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Keys accepted by [`ClientConfig::set`].
pub const CONFIG_KEYS: &[&str] = &[
    "api_base_url",
    "db_path",
    "sync_interval_secs",
    "request_timeout_secs",
    "cache_generation",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// CRM server, e.g. `https://crm.example.com`
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Local database file; the platform data dir is used when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cache_generation")]
    pub cache_generation: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            db_path: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_generation: default_cache_generation(),
        }
    }
}

impl ClientConfig {
    /// Load a config file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.normalized()
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        std::fs::write(path, format!("{payload}\n"))?;
        Ok(())
    }

    /// Apply `STOCKROOM_*` overrides read through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = normalize_text_option(lookup(ENV_SYNC_INTERVAL_SECS)) {
            self.sync_interval_secs = parse_secs(ENV_SYNC_INTERVAL_SECS, &secs)?;
        }
        if let Some(secs) = normalize_text_option(lookup(ENV_REQUEST_TIMEOUT_SECS)) {
            self.request_timeout_secs = parse_secs(ENV_REQUEST_TIMEOUT_SECS, &secs)?;
        }
        self.normalized()
    }

    /// Set one key from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_base_url" => self.api_base_url = Some(value.to_string()),
            "db_path" => self.db_path = normalize_text_option(Some(value.to_string())).map(PathBuf::from),
            "sync_interval_secs" => self.sync_interval_secs = parse_secs(key, value)?,
            "request_timeout_secs" => self.request_timeout_secs = parse_secs(key, value)?,
            "cache_generation" => self.cache_generation = value.trim().to_string(),
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown config key '{other}' (expected one of: {})",
                    CONFIG_KEYS.join(", ")
                )))
            }
        }
        *self = self.clone().normalized()?;
        Ok(())
    }

    /// Trim values, drop empties and validate the API URL.
    pub fn normalized(mut self) -> Result<Self> {
        self.api_base_url = match normalize_text_option(self.api_base_url) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(_) => {
                return Err(Error::InvalidInput(
                    "api_base_url must include http:// or https://".to_string(),
                ))
            }
            None => None,
        };
        if self.sync_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "sync_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.cache_generation = normalize_text_option(Some(self.cache_generation))
            .unwrap_or_else(default_cache_generation);
        Ok(self)
    }

    pub fn require_api_base_url(&self) -> Result<&str> {
        self.api_base_url.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "API URL is not configured; run `stockroom config set api_base_url <url>` or set {ENV_API_URL}"
            ))
        })
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_cache_generation() -> String {
    DEFAULT_CACHE_GENERATION.to_string()
}

fn parse_secs(field: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::InvalidInput(format!("{field} must be a whole number of seconds")))
}
