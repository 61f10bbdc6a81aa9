use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use courier_api::{ApiClientConfig, DEFAULT_BASE_URL, MAX_RETRY_LIMIT};
use courier_core::{ResourceCacheConfig, DEFAULT_PAGE_SIZE};
use courier_ws::ChannelConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub photos: PhotoConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per history or chat-list request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PhotoConfig {
    #[serde(default = "default_photo_concurrency")]
    pub max_concurrent: usize,
    /// How long a missing photo is remembered before asking again.
    #[serde(default = "default_negative_ttl_secs")]
    pub negative_ttl_secs: u64,
    #[serde(default = "default_photo_cache_entries")]
    pub max_entries: u64,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_photo_concurrency(),
            negative_ttl_secs: default_negative_ttl_secs(),
            max_entries: default_photo_cache_entries(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_retries() -> u32 {
    3
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_photo_concurrency() -> usize {
    3
}
fn default_negative_ttl_secs() -> u64 {
    600
}
fn default_photo_cache_entries() -> u64 {
    512
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Courier Client Configuration
# Generated automatically on first run. Edit as needed.

[backend]
# Companion backend serving /chats, /send and /ws.
base_url = "{base_url}"
timeout_secs = {timeout_secs}
max_retries = {max_retries}

[feed]
# Messages per history page.
page_size = {page_size}

[realtime]
# Reconnect delay doubles from initial_backoff_ms up to max_backoff_ms.
initial_backoff_ms = {initial_backoff_ms}
max_backoff_ms = {max_backoff_ms}
connect_timeout_secs = {connect_timeout_secs}

[photos]
max_concurrent = {photo_concurrency}
# Seconds a missing contact photo is remembered.
negative_ttl_secs = {negative_ttl_secs}
max_entries = {photo_entries}
"#,
        base_url = config.backend.base_url,
        timeout_secs = config.backend.timeout_secs,
        max_retries = config.backend.max_retries,
        page_size = config.feed.page_size,
        initial_backoff_ms = config.realtime.initial_backoff_ms,
        max_backoff_ms = config.realtime.max_backoff_ms,
        connect_timeout_secs = config.realtime.connect_timeout_secs,
        photo_concurrency = config.photos.max_concurrent,
        negative_ttl_secs = config.photos.negative_ttl_secs,
        photo_entries = config.photos.max_entries,
    )
}

// ── Config Loading ───────────────────────────────────────────────────────────

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(path, "config file not found, generating defaults");
            let config = Config::default();
            if let Some(parent) = Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, generate_config_template(&config))?;
            tracing::info!(path, "generated default config");
            config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `COURIER_*` overrides. Values that fail to parse are ignored
    /// with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("COURIER_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_TIMEOUT_SECS") {
            self.backend.timeout_secs = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_MAX_RETRIES") {
            self.backend.max_retries = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_PAGE_SIZE") {
            self.feed.page_size = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_INITIAL_BACKOFF_MS") {
            self.realtime.initial_backoff_ms = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_MAX_BACKOFF_MS") {
            self.realtime.max_backoff_ms = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_CONNECT_TIMEOUT_SECS") {
            self.realtime.connect_timeout_secs = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_PHOTO_CONCURRENCY") {
            self.photos.max_concurrent = value;
        }
        if let Some(value) = parsed(&lookup, "COURIER_PHOTO_NEGATIVE_TTL_SECS") {
            self.photos.negative_ttl_secs = value;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.backend.max_retries == 0 || self.backend.max_retries > MAX_RETRY_LIMIT {
            bail!("backend.max_retries must be between 1 and {MAX_RETRY_LIMIT}");
        }
        if self.feed.page_size == 0 {
            bail!("feed.page_size must be at least 1");
        }
        if self.photos.max_concurrent == 0 {
            bail!("photos.max_concurrent must be at least 1");
        }
        if self.realtime.initial_backoff_ms == 0
            || self.realtime.initial_backoff_ms > self.realtime.max_backoff_ms
        {
            bail!("realtime.initial_backoff_ms must be between 1 and max_backoff_ms");
        }
        Ok(())
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.backend.base_url.clone(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
            max_retries: self.backend.max_retries,
            ..ApiClientConfig::default()
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            initial_backoff: Duration::from_millis(self.realtime.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.realtime.max_backoff_ms),
            connect_timeout: Duration::from_secs(self.realtime.connect_timeout_secs),
        }
    }

    pub fn photo_cache_config(&self) -> ResourceCacheConfig {
        ResourceCacheConfig {
            max_concurrent: self.photos.max_concurrent,
            negative_ttl: Duration::from_secs(self.photos.negative_ttl_secs),
            max_entries: self.photos.max_entries,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
