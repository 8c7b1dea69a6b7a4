use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "products";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 512;
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "PSEARCH_CONFIG";
/// Config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "psearch.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Per-user config file location.
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("psearch").join("config.toml"))
    }

    /// Resolve which config file to read, if any.
    ///
    /// Order: explicit path, `PSEARCH_CONFIG`, `./psearch.toml`, per-user file.
    /// The first two are returned even when missing so that a typo is reported.
    pub fn find_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.trim().is_empty()
        {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        Self::global_path().filter(|p| p.exists())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Path(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load file, `.env` and process environment, then validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match Self::find_path(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PSEARCH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PSEARCH_DATASET_PATH") {
            self.dataset.path = PathBuf::from(v);
        }
        if let Some(v) = get("PSEARCH_DATASET_FORMAT") {
            self.dataset.format = parse_env("PSEARCH_DATASET_FORMAT", &v)?;
        }
        if let Some(v) = get("PSEARCH_BATCH_SIZE") {
            self.pipeline.batch_size = parse_env("PSEARCH_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("PSEARCH_CHECKPOINT_PATH") {
            self.pipeline.checkpoint_path = PathBuf::from(v);
        }
        if let Some(v) = get("PSEARCH_MAX_ATTEMPTS") {
            self.pipeline.max_attempts = parse_env("PSEARCH_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("PSEARCH_BACKOFF_BASE_MS") {
            self.pipeline.backoff_base_ms = parse_env("PSEARCH_BACKOFF_BASE_MS", &v)?;
        }
        if let Some(v) = get("PSEARCH_JOB_TIMEOUT_SECS") {
            self.pipeline.job_timeout_secs = parse_env("PSEARCH_JOB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("PSEARCH_EMBEDDING_URL") {
            self.embedding.url = v;
        }
        if let Some(v) = get("PSEARCH_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_env("PSEARCH_EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = get("PSEARCH_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Some(v) = get("PSEARCH_QDRANT_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Some(v) = get("PSEARCH_QDRANT_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::Validation(
                "pipeline.batch_size must be a positive integer".to_string(),
            ));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "pipeline.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.pipeline.checkpoint_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "pipeline.checkpoint_path must not be empty".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Validation(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(ConfigError::Validation(
                "vector_store.collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// On-disk layout of the dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// Decide from the extension, then from the first byte.
    #[default]
    Auto,
    /// A single JSON array of records.
    Json,
    /// One JSON record per line.
    Jsonl,
}

impl FromStr for DatasetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DatasetFormat::Auto),
            "json" => Ok(DatasetFormat::Json),
            "jsonl" | "ndjson" => Ok(DatasetFormat::Jsonl),
            _ => Err(format!("unknown dataset format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub format: DatasetFormat,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/products.json")
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            format: DatasetFormat::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Overall deadline for a run; 0 disables it.
    #[serde(default)]
    pub job_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoint/checkpoint.txt")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_path: default_checkpoint_path(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            job_timeout_secs: 0,
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.backoff_base_ms))
            .with_max_delay(Duration::from_millis(
                self.backoff_max_ms.max(self.backoff_base_ms),
            ))
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            dimension: default_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
}

fn default_limit() -> u64 {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}
