use clap::Parser;

use std::path::PathBuf;

use super::config::BlobBackend;
use super::constants::{
    ENV_BLOB_BACKEND, ENV_CONFIG, ENV_EMBEDDING_URL, ENV_LLM_API_KEY, ENV_POSTGRES_URL,
    ENV_REASONING_URL, ENV_REDIS_URL,
};

#[derive(Parser, Debug)]
#[command(name = "dtcgraph")]
#[command(version, about = "Automotive diagnostic knowledge pipeline", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL
    #[arg(long, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// Redis queue URL (omit to use the in-process queue)
    #[arg(long, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// Blob storage backend (filesystem or s3)
    #[arg(long, env = ENV_BLOB_BACKEND, value_parser = parse_blob_backend)]
    pub blob_backend: Option<BlobBackend>,

    /// Embedding service base URL (OpenAI-compatible)
    #[arg(long, env = ENV_EMBEDDING_URL)]
    pub embedding_url: Option<String>,

    /// Reasoning service base URL (OpenAI-compatible)
    #[arg(long, env = ENV_REASONING_URL)]
    pub reasoning_url: Option<String>,

    /// API key for the embedding and reasoning services
    #[arg(long, env = ENV_LLM_API_KEY)]
    pub llm_api_key: Option<String>,

    /// Maximum crawl depth for link discovery
    #[arg(long)]
    pub max_crawl_depth: Option<u32>,

    /// Comma-separated stages to run (default: all six)
    #[arg(long, value_delimiter = ',')]
    pub stages: Option<Vec<String>>,
}

fn parse_blob_backend(s: &str) -> Result<BlobBackend, String> {
    match s.to_lowercase().as_str() {
        "filesystem" => Ok(BlobBackend::Filesystem),
        "s3" => Ok(BlobBackend::S3),
        _ => Err(format!(
            "Invalid blob backend: {}. Valid values: filesystem, s3",
            s
        )),
    }
}

/// Parse command-line arguments
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blob_backend_valid() {
        assert_eq!(parse_blob_backend("s3"), Ok(BlobBackend::S3));
        assert_eq!(
            parse_blob_backend("Filesystem"),
            Ok(BlobBackend::Filesystem)
        );
    }

    #[test]
    fn test_parse_blob_backend_invalid() {
        assert!(parse_blob_backend("gcs").is_err());
    }

    #[test]
    fn test_stages_flag_splits_on_comma() {
        let cli = Cli::parse_from(["dtcgraph", "--stages", "crawl,chunk"]);
        assert_eq!(
            cli.stages,
            Some(vec!["crawl".to_string(), "chunk".to_string()])
        );
    }
}
