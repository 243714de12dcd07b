use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::Cli;
use super::constants::{
    CONFIG_FILE_NAME, DB_POOL_DEFAULT_MAX, DB_POOL_DEFAULT_MIN, DEFAULT_CHUNK_OVERLAP_CHARS,
    DEFAULT_CHUNK_SIZE_CHARS, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_TIMEOUT_SECS,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_CRAWL_DEPTH, DEFAULT_QUEUE_POP_TIMEOUT_SECS,
    DEFAULT_REAPER_INTERVAL_SECS, DEFAULT_REAPER_STUCK_AFTER_SECS, DEFAULT_REASONING_TIMEOUT_SECS,
    DEFAULT_RELEVANCE_GATE_THRESHOLD, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_WORKERS_PER_STAGE, MAX_WORKERS_PER_STAGE,
};

// =============================================================================
// Blob Backend Enum
// =============================================================================

/// Storage backend type for document blobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    #[default]
    Filesystem,
    S3,
}

impl fmt::Display for BlobBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobBackend::Filesystem => write!(f, "filesystem"),
            BlobBackend::S3 => write!(f, "s3"),
        }
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Pipeline tuning section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PipelineFileConfig {
    pub queue_pop_timeout_seconds: Option<u64>,
    pub relevance_gate_threshold: Option<f64>,
    pub chunk_size_chars: Option<usize>,
    pub chunk_overlap_chars: Option<usize>,
    pub embedding_dim: Option<usize>,
    pub max_crawl_depth: Option<u32>,
    pub retry_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub http_timeout_s: Option<u64>,
    pub embedding_timeout_s: Option<u64>,
    pub reasoning_timeout_s: Option<u64>,
}

/// Per-stage worker counts
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WorkersFileConfig {
    pub crawl: Option<usize>,
    pub chunk: Option<usize>,
    pub embed: Option<usize>,
    pub evaluate: Option<usize>,
    pub extract: Option<usize>,
    pub resolve: Option<usize>,
}

/// PostgreSQL configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PostgresFileConfig {
    pub url: Option<String>,
    pub pool_min: Option<u32>,
    pub pool_max: Option<u32>,
}

/// Redis queue configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RedisFileConfig {
    pub url: Option<String>,
}

/// Filesystem blob storage settings
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BlobsFilesystemFileConfig {
    pub path: Option<String>,
}

/// S3 blob storage settings
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BlobsS3FileConfig {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// Blob storage configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BlobsFileConfig {
    pub backend: Option<BlobBackend>,
    pub filesystem: Option<BlobsFilesystemFileConfig>,
    pub s3: Option<BlobsS3FileConfig>,
}

/// Model endpoint configuration (embedding or reasoning)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ModelFileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Reaper configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReaperFileConfig {
    pub interval_s: Option<u64>,
    pub stuck_after_s: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub pipeline: Option<PipelineFileConfig>,
    pub workers: Option<WorkersFileConfig>,
    pub postgres: Option<PostgresFileConfig>,
    pub redis: Option<RedisFileConfig>,
    pub blobs: Option<BlobsFileConfig>,
    pub embedding: Option<ModelFileConfig>,
    pub reasoning: Option<ModelFileConfig>,
    pub reaper: Option<ReaperFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Pipeline tuning (final/runtime)
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_pop_timeout_seconds: u64,
    pub relevance_gate_threshold: f64,
    pub chunk_size_chars: usize,
    pub chunk_overlap_chars: usize,
    pub embedding_dim: usize,
    pub max_crawl_depth: u32,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub http_timeout_s: u64,
    pub embedding_timeout_s: u64,
    pub reasoning_timeout_s: u64,
}

/// Per-stage worker counts, each clamped to 1..=4
#[derive(Debug, Clone)]
pub struct WorkersConfig {
    pub crawl: usize,
    pub chunk: usize,
    pub embed: usize,
    pub evaluate: usize,
    pub extract: usize,
    pub resolve: usize,
}

/// PostgreSQL configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

/// S3 blob settings (final/runtime)
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// Blob storage configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct BlobsConfig {
    pub backend: BlobBackend,
    pub filesystem_path: Option<String>,
    pub s3: Option<S3Config>,
}

/// Model endpoint configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Reaper configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval_s: u64,
    pub stuck_after_s: u64,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub workers: WorkersConfig,
    pub postgres: PostgresConfig,
    /// None selects the in-process queue backend
    pub redis_url: Option<String>,
    pub blobs: BlobsConfig,
    pub embedding: ModelConfig,
    pub reasoning: ModelConfig,
    pub reaper: ReaperConfig,
}

fn clamp_workers(n: Option<usize>) -> usize {
    n.unwrap_or(DEFAULT_WORKERS_PER_STAGE)
        .clamp(1, MAX_WORKERS_PER_STAGE)
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Config file (CLI-specified path or ./dtcgraph.json)
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                FileConfig::load_from_file(path)?
            }
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.exists() {
                    FileConfig::load_from_file(local)?
                } else {
                    FileConfig::default()
                }
            }
        };
        file_config.warn_unknown_fields();

        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let file_workers = file_config.workers.unwrap_or_default();
        let file_postgres = file_config.postgres.unwrap_or_default();
        let file_redis = file_config.redis.unwrap_or_default();
        let file_blobs = file_config.blobs.unwrap_or_default();
        let file_embedding = file_config.embedding.unwrap_or_default();
        let file_reasoning = file_config.reasoning.unwrap_or_default();
        let file_reaper = file_config.reaper.unwrap_or_default();

        let pipeline = PipelineConfig {
            queue_pop_timeout_seconds: file_pipeline
                .queue_pop_timeout_seconds
                .unwrap_or(DEFAULT_QUEUE_POP_TIMEOUT_SECS),
            relevance_gate_threshold: file_pipeline
                .relevance_gate_threshold
                .unwrap_or(DEFAULT_RELEVANCE_GATE_THRESHOLD),
            chunk_size_chars: file_pipeline
                .chunk_size_chars
                .unwrap_or(DEFAULT_CHUNK_SIZE_CHARS),
            chunk_overlap_chars: file_pipeline
                .chunk_overlap_chars
                .unwrap_or(DEFAULT_CHUNK_OVERLAP_CHARS),
            embedding_dim: file_pipeline.embedding_dim.unwrap_or(DEFAULT_EMBEDDING_DIM),
            max_crawl_depth: cli
                .max_crawl_depth
                .or(file_pipeline.max_crawl_depth)
                .unwrap_or(DEFAULT_MAX_CRAWL_DEPTH),
            retry_attempts: file_pipeline
                .retry_attempts
                .unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            retry_backoff_ms: file_pipeline
                .retry_backoff_ms
                .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            http_timeout_s: file_pipeline
                .http_timeout_s
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            embedding_timeout_s: file_pipeline
                .embedding_timeout_s
                .unwrap_or(DEFAULT_EMBEDDING_TIMEOUT_SECS),
            reasoning_timeout_s: file_pipeline
                .reasoning_timeout_s
                .unwrap_or(DEFAULT_REASONING_TIMEOUT_SECS),
        };

        let workers = WorkersConfig {
            crawl: clamp_workers(file_workers.crawl),
            chunk: clamp_workers(file_workers.chunk),
            embed: clamp_workers(file_workers.embed),
            evaluate: clamp_workers(file_workers.evaluate),
            extract: clamp_workers(file_workers.extract),
            resolve: clamp_workers(file_workers.resolve),
        };

        let postgres = PostgresConfig {
            url: cli
                .postgres_url
                .clone()
                .or(file_postgres.url)
                .unwrap_or_default(),
            pool_min: file_postgres.pool_min.unwrap_or(DB_POOL_DEFAULT_MIN),
            pool_max: file_postgres.pool_max.unwrap_or(DB_POOL_DEFAULT_MAX),
        };

        let redis_url = cli.redis_url.clone().or(file_redis.url);

        let blob_backend = cli.blob_backend.or(file_blobs.backend).unwrap_or_default();
        let s3_config = if blob_backend == BlobBackend::S3 {
            file_blobs.s3.as_ref().and_then(|s3| {
                s3.bucket
                    .as_ref()
                    .filter(|b| !b.is_empty())
                    .map(|bucket| S3Config {
                        bucket: bucket.clone(),
                        prefix: s3.prefix.clone().unwrap_or_else(|| "documents".to_string()),
                        region: s3.region.clone(),
                        endpoint: s3.endpoint.clone(),
                    })
            })
        } else {
            None
        };

        let blobs = BlobsConfig {
            backend: blob_backend,
            filesystem_path: file_blobs.filesystem.and_then(|f| f.path),
            s3: s3_config,
        };

        let api_key = cli.llm_api_key.clone();

        let embedding = ModelConfig {
            base_url: cli
                .embedding_url
                .clone()
                .or(file_embedding.base_url)
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            model: file_embedding
                .model
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            api_key: api_key.clone(),
        };

        let reasoning = ModelConfig {
            base_url: cli
                .reasoning_url
                .clone()
                .or(file_reasoning.base_url)
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            model: file_reasoning
                .model
                .unwrap_or_else(|| "qwen2.5:14b".to_string()),
            api_key,
        };

        let reaper = ReaperConfig {
            interval_s: file_reaper.interval_s.unwrap_or(DEFAULT_REAPER_INTERVAL_SECS),
            stuck_after_s: file_reaper
                .stuck_after_s
                .unwrap_or(DEFAULT_REAPER_STUCK_AFTER_SECS),
        };

        let config = Self {
            pipeline,
            workers,
            postgres,
            redis_url,
            blobs,
            embedding,
            reasoning,
            reaper,
        };

        config.validate()?;

        tracing::debug!(
            chunk_size = config.pipeline.chunk_size_chars,
            chunk_overlap = config.pipeline.chunk_overlap_chars,
            embedding_dim = config.pipeline.embedding_dim,
            relevance_gate = config.pipeline.relevance_gate_threshold,
            max_crawl_depth = config.pipeline.max_crawl_depth,
            blob_backend = %config.blobs.backend,
            queue_backend = if config.redis_url.is_some() { "redis" } else { "memory" },
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.postgres.url.is_empty() {
            anyhow::bail!("Configuration error: postgres.url is required");
        }
        if self.postgres.pool_min == 0 || self.postgres.pool_min > self.postgres.pool_max {
            anyhow::bail!(
                "Configuration error: postgres pool bounds invalid (min {}, max {})",
                self.postgres.pool_min,
                self.postgres.pool_max
            );
        }
        if self.pipeline.chunk_size_chars == 0 {
            anyhow::bail!("Configuration error: chunk_size_chars must be greater than 0");
        }
        if self.pipeline.chunk_overlap_chars >= self.pipeline.chunk_size_chars {
            anyhow::bail!(
                "Configuration error: chunk_overlap_chars ({}) must be smaller than chunk_size_chars ({})",
                self.pipeline.chunk_overlap_chars,
                self.pipeline.chunk_size_chars
            );
        }
        if !(0.0..=1.0).contains(&self.pipeline.relevance_gate_threshold) {
            anyhow::bail!(
                "Configuration error: relevance_gate_threshold must lie in [0, 1], got {}",
                self.pipeline.relevance_gate_threshold
            );
        }
        if self.pipeline.embedding_dim == 0 {
            anyhow::bail!("Configuration error: embedding_dim must be greater than 0");
        }
        if self.blobs.backend == BlobBackend::S3 && self.blobs.s3.is_none() {
            anyhow::bail!("Configuration error: blobs.s3.bucket is required for the s3 backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_with_postgres() -> Cli {
        Cli::parse_from(["dtcgraph", "--postgres-url", "postgres://localhost/dtc"])
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::load(&cli_with_postgres()).unwrap();
        assert_eq!(config.pipeline.chunk_size_chars, 500);
        assert_eq!(config.pipeline.chunk_overlap_chars, 50);
        assert_eq!(config.pipeline.embedding_dim, 768);
        assert!((config.pipeline.relevance_gate_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.workers.resolve, 1);
        assert_eq!(config.blobs.backend, BlobBackend::Filesystem);
    }

    #[test]
    fn test_missing_postgres_url_rejected() {
        let cli = Cli::parse_from(["dtcgraph"]);
        // A bare CLI may still pick up settings from a local config file or
        // the environment; only assert when nothing supplied a URL.
        if std::env::var("DTCGRAPH_POSTGRES_URL").is_err()
            && !Path::new(CONFIG_FILE_NAME).exists()
        {
            assert!(AppConfig::load(&cli).is_err());
        }
    }

    #[test]
    fn test_worker_counts_clamped() {
        assert_eq!(clamp_workers(Some(0)), 1);
        assert_eq!(clamp_workers(Some(9)), 4);
        assert_eq!(clamp_workers(None), 1);
    }

    #[test]
    fn test_blob_backend_display() {
        assert_eq!(BlobBackend::Filesystem.to_string(), "filesystem");
        assert_eq!(BlobBackend::S3.to_string(), "s3");
    }
}
