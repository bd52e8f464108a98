//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFSHELL_*)
//! 2. TOML config file (if OFFSHELL_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFSHELL_*)
/// 2. TOML config file (if OFFSHELL_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the application the worker shadows.
    ///
    /// Precached paths are resolved against this origin, and cache misses
    /// are forwarded to it. Set via OFFSHELL_ORIGIN.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Socket address the gateway binds.
    ///
    /// Set via OFFSHELL_LISTEN_ADDR.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Root-relative asset paths making up the application shell.
    ///
    /// Fixed at deploy time; every path is fetched and stored during
    /// install. Set via config file (env override uses TOML array syntax).
    #[serde(default = "default_precache_paths")]
    pub precache_paths: Vec<String>,

    /// Name prefix shared by all cache instances of this deployment.
    ///
    /// Set via OFFSHELL_CACHE_PREFIX.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag distinguishing cache instances across deployments.
    ///
    /// Must be bumped whenever the asset list changes so that activation
    /// prunes the previous instance. Set via OFFSHELL_CACHE_VERSION.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path to the SQLite file backing the cache store.
    ///
    /// Set via OFFSHELL_DB_PATH.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFSHELL_USER_AGENT.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFSHELL_TIMEOUT_MS.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via OFFSHELL_MAX_BYTES.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of redirects to follow.
    ///
    /// Set via OFFSHELL_MAX_REDIRECTS.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_precache_paths() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/app.css".into(), "/app.ts".into()]
}

fn default_cache_prefix() -> String {
    "offshell-shell".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offshell-cache.sqlite")
}

fn default_user_agent() -> String {
    "offshell/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            precache_paths: default_precache_paths(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// The version-tagged name of the current cache instance.
    ///
    /// Every other enumerable instance name is stale and eligible for
    /// removal during activation.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFSHELL_`
    /// 2. TOML file from `OFFSHELL_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFSHELL_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFSHELL_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
