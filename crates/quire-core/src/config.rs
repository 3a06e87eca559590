//! Configuration for Quire document stores.
//!
//! Provides the [`QuireConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `config_path` argument
//! 2. `QUIRE_CONFIG` environment variable
//! 3. XDG default: `~/.config/quire/config.toml`
//! 4. Built-in defaults
//!
//! Environment variables named `QUIRE_<SECTION>_<KEY>` override file values.

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Error, Result};

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for a Quire document store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuireConfig {
    /// Vector index service connection.
    pub index: IndexConfig,

    /// Document store behaviour.
    pub store: StoreConfig,

    /// Default embedding provider.
    pub embedding: EmbeddingConfig,
}

/// Vector index service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the Qdrant HTTP API.
    pub url: String,

    /// API key sent in the `api-key` header.
    pub api_key: Option<String>,
}

/// Document store tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of points per upsert request.
    pub batch_size: usize,

    /// Page size for filter-only scrolls (`must_search`, `get_all`).
    pub scroll_limit: usize,

    /// Result limit used when a search does not pass one.
    pub default_limit: usize,

    /// Maximum number of query keywords used for hybrid pre-filtering.
    pub max_keywords: usize,
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "openai", "ollama", "fastembed" or "mock".
    pub provider: String,

    /// Model name passed to the provider.
    pub model: String,

    /// Base URL for HTTP providers.
    pub url: Option<String>,

    /// API key for remote providers.
    pub api_key: Option<String>,

    /// Vector dimension produced by the model.
    pub dimension: usize,

    /// Model cache directory for in-process providers.
    pub cache_path: Option<String>,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            scroll_limit: 1000,
            default_limit: 3,
            max_keywords: 20,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            url: None,
            api_key: None,
            dimension: 1536,
            cache_path: None,
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl QuireConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                log::debug!("Loading configuration from {}", path.display());
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("QUIRE");
        env_opts.add_section("index");
        env_opts.add_section("store");
        env_opts.add_section("embedding");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from explicit argument, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("QUIRE_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("quire").join("config.toml"))
    }

    /// Reject values the store cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.store.batch_size == 0 {
            return Err(Error::config("store.batch_size must be greater than zero"));
        }
        if self.store.scroll_limit == 0 {
            return Err(Error::config("store.scroll_limit must be greater than zero"));
        }
        if self.index.url.trim().is_empty() {
            return Err(Error::config("index.url must not be empty"));
        }
        Ok(())
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
