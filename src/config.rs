//! Layered configuration.
//!
//! Uses Figment to merge built-in defaults, an optional `docsite.toml`, and
//! `DOCSITE_*` environment variables (nested keys separated by `__`, e.g.
//! `DOCSITE_CACHE__MAX_SIZE=20`).

use anyhow::{Context, anyhow, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "docsite.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DOCSITE_";

/// Top-level configuration for a documentation site search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root URL of the documentation site (without a version segment).
    pub base_url: String,
    /// Path of the per-version search corpus, relative to the versioned root.
    pub index_path: String,
    /// Path of the version manifest, relative to `base_url`.
    pub versions_path: String,
    pub cache: CacheConfig,
    pub versions: VersionsConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            index_path: "search/search_index.json".to_string(),
            versions_path: "versions.json".to_string(),
            cache: CacheConfig::default(),
            versions: VersionsConfig::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Bounds for the in-memory index cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached indices.
    pub max_size: usize,
    /// Maximum aggregate estimated size of all cached indices.
    pub max_memory_mb: u64,
    /// Entries older than this are treated as absent.
    pub ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            max_memory_mb: 500,
            ttl_minutes: 60,
        }
    }
}

impl CacheConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }

    pub const fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb * 1024 * 1024
    }
}

/// Version manifest caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    /// How long a fetched manifest is reused before it is fetched again.
    pub cache_timeout_secs: u64,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            cache_timeout_secs: 300,
        }
    }
}

impl VersionsConfig {
    pub const fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }
}

/// Retry policy for remote fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Create a default configuration for the given site.
    pub fn for_site(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// The provider chain used by [`Config::load`].
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration from defaults, `docsite.toml`, and the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(&Self::figment())
    }

    /// Extract and validate configuration from an arbitrary provider chain.
    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        let config: Self = figment
            .extract()
            .context("Failed to read docsite configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the search core cannot operate with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.max_size == 0 {
            bail!("cache.max_size must be at least 1");
        }
        if self.retry.attempts == 0 {
            bail!("retry.attempts must be at least 1");
        }

        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| anyhow!("base_url '{}' is not a valid URL: {}", self.base_url, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            bail!(
                "base_url '{}' must use http or https, not {}",
                self.base_url,
                parsed.scheme()
            );
        }

        Ok(())
    }
}
