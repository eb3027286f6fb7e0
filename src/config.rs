use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MnemosConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub consolidation: ConsolidationConfig,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub default_namespace: String,
    /// SQLite busy timeout in milliseconds before the internal retry loop kicks in.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"hashed"` (deterministic, offline) or `"remote"` (HTTP provider with
    /// hashed fallback).
    pub provider: String,
    /// Endpoint for the remote provider. Ignored when provider = "hashed".
    pub endpoint: String,
    /// Timeout for a single remote embed call, in milliseconds.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    /// KNN candidate pool size fed into the MMR ranker.
    pub candidate_pool: usize,
    pub min_confidence: f64,
    /// Pairwise cosine similarity above which two results count as near-duplicates.
    pub near_duplicate_threshold: f64,
    /// Half-life of the recency score, in days.
    pub recency_half_life_days: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Patterns below this confidence with negligible usage are pruned.
    pub confidence_floor: f64,
    /// `usage_count` at or below this value counts as negligible.
    pub negligible_usage: u32,
    /// Pairwise cosine similarity at or above which two patterns are merged.
    pub merge_threshold: f64,
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            consolidation: ConsolidationConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnemos_dir()
            .join("patterns.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_namespace: "global".into(),
            busy_timeout_ms: 2_000,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashed".into(),
            endpoint: "http://127.0.0.1:8756/embed".into(),
            timeout_ms: 1_500,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            candidate_pool: 50,
            min_confidence: 0.05,
            near_duplicate_threshold: 0.92,
            recency_half_life_days: 7.0,
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.2,
            negligible_usage: 1,
            merge_threshold: 0.95,
        }
    }
}

/// Returns `~/.mnemos/`
pub fn default_mnemos_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".mnemos")
}

/// Returns the default config file path: `~/.mnemos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemos_dir().join("config.toml")
}

impl MnemosConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemosConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (MNEMOS_DB, MNEMOS_NAMESPACE, MNEMOS_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMOS_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_NAMESPACE") {
            self.storage.default_namespace = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
