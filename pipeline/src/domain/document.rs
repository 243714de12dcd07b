//! Document lifecycle types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing stage of a document.
///
/// Stable enum values on the document row; a document moves strictly
/// forward through the pipeline and terminates in `Complete` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Pending,
    Chunking,
    Embedding,
    Evaluating,
    Extracting,
    Resolving,
    Complete,
    Error,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Evaluating => "evaluating",
            Self::Extracting => "extracting",
            Self::Resolving => "resolving",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// The stage a document enters after this one completes, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Chunking),
            Self::Chunking => Some(Self::Embedding),
            Self::Embedding => Some(Self::Evaluating),
            Self::Evaluating => Some(Self::Extracting),
            Self::Extracting => Some(Self::Resolving),
            Self::Resolving => Some(Self::Complete),
            Self::Complete | Self::Error => None,
        }
    }

    /// Whether a document in this stage can never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// The queue feeding the stage that processes documents in this state.
    pub fn queue(&self) -> Option<&'static str> {
        use crate::core::constants::{
            QUEUE_CHUNK, QUEUE_EMBED, QUEUE_EVALUATE, QUEUE_EXTRACT, QUEUE_RESOLVE,
        };
        match self {
            Self::Chunking => Some(QUEUE_CHUNK),
            Self::Embedding => Some(QUEUE_EMBED),
            Self::Evaluating => Some(QUEUE_EVALUATE),
            Self::Extracting => Some(QUEUE_EXTRACT),
            Self::Resolving => Some(QUEUE_RESOLVE),
            Self::Pending | Self::Complete | Self::Error => None,
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessingStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "chunking" => Ok(Self::Chunking),
            "embedding" => Ok(Self::Embedding),
            "evaluating" => Ok(Self::Evaluating),
            "extracting" => Ok(Self::Extracting),
            "resolving" => Ok(Self::Resolving),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown processing stage: {}", other)),
        }
    }
}

/// One ingested source document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub source_url: Option<String>,
    pub content_hash: String,
    pub mime_type: String,
    pub blob_location: String,
    pub stage: ProcessingStage,
    pub error_message: Option<String>,
    pub chunk_count: i32,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Crawl request lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A URL queued for crawling. Unique on URL; completed and failed rows
/// remain for audit.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub id: Uuid,
    pub url: String,
    pub status: CrawlStatus,
    pub depth: u32,
    pub max_depth: u32,
    pub parent_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_chain_reaches_complete() {
        let mut stage = ProcessingStage::Pending;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(stage, ProcessingStage::Complete);
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn test_terminal_stages_have_no_queue() {
        assert_eq!(ProcessingStage::Complete.queue(), None);
        assert_eq!(ProcessingStage::Error.queue(), None);
        assert!(ProcessingStage::Error.is_terminal());
    }

    #[test]
    fn test_stage_round_trips_through_strings() {
        for s in [
            "pending",
            "chunking",
            "embedding",
            "evaluating",
            "extracting",
            "resolving",
            "complete",
            "error",
        ] {
            let stage: ProcessingStage = s.parse().unwrap();
            assert_eq!(stage.as_str(), s);
        }
        assert!("finished".parse::<ProcessingStage>().is_err());
    }

    #[test]
    fn test_stage_queue_names() {
        assert_eq!(ProcessingStage::Chunking.queue(), Some("jobs:chunk"));
        assert_eq!(ProcessingStage::Resolving.queue(), Some("jobs:resolve"));
    }
}
