//! Chunk and evaluation types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An indexed, immutable substring of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    pub char_start: i32,
    pub char_end: i32,
    pub token_count: i32,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// Closed set of automotive domains an evaluation may assign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutomotiveDomain {
    Obd,
    Electrical,
    Engine,
    Transmission,
    Brakes,
    Suspension,
    Hvac,
    Body,
    General,
    #[default]
    Unknown,
}

impl AutomotiveDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Obd => "obd",
            Self::Electrical => "electrical",
            Self::Engine => "engine",
            Self::Transmission => "transmission",
            Self::Brakes => "brakes",
            Self::Suspension => "suspension",
            Self::Hvac => "hvac",
            Self::Body => "body",
            Self::General => "general",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse: anything outside the closed set maps to `Unknown`
    /// rather than erroring, per the element-drop policy for model output.
    pub fn parse_lenient(s: &str) -> Self {
        s.trim().to_ascii_lowercase().parse().unwrap_or_default()
    }
}

impl fmt::Display for AutomotiveDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AutomotiveDomain {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "obd" => Ok(Self::Obd),
            "electrical" => Ok(Self::Electrical),
            "engine" => Ok(Self::Engine),
            "transmission" => Ok(Self::Transmission),
            "brakes" => Ok(Self::Brakes),
            "suspension" => Ok(Self::Suspension),
            "hvac" => Ok(Self::Hvac),
            "body" => Ok(Self::Body),
            "general" => Ok(Self::General),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

/// One-to-one evaluation of a chunk. Scores always lie in [0, 1].
#[derive(Debug, Clone)]
pub struct ChunkEvaluation {
    pub chunk_id: Uuid,
    pub trust_score: f64,
    pub relevance_score: f64,
    pub domain: AutomotiveDomain,
    pub reasoning: String,
    pub model: String,
}

impl ChunkEvaluation {
    /// The evaluation recorded when all parse fallbacks fail: scores of
    /// zero keep the chunk below every relevance gate without failing the
    /// document.
    pub fn parse_failed(chunk_id: Uuid, model: &str) -> Self {
        Self {
            chunk_id,
            trust_score: 0.0,
            relevance_score: 0.0,
            domain: AutomotiveDomain::Unknown,
            reasoning: "parse failed".to_string(),
            model: model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_round_trip() {
        for s in [
            "obd",
            "electrical",
            "engine",
            "transmission",
            "brakes",
            "suspension",
            "hvac",
            "body",
            "general",
            "unknown",
        ] {
            assert_eq!(AutomotiveDomain::parse_lenient(s).as_str(), s);
        }
    }

    #[test]
    fn test_unknown_domain_falls_back() {
        assert_eq!(
            AutomotiveDomain::parse_lenient("flux capacitor"),
            AutomotiveDomain::Unknown
        );
        assert_eq!(
            AutomotiveDomain::parse_lenient(" ENGINE "),
            AutomotiveDomain::Engine
        );
    }

    #[test]
    fn test_parse_failed_evaluation_is_zeroed() {
        let eval = ChunkEvaluation::parse_failed(Uuid::new_v4(), "test-model");
        assert_eq!(eval.trust_score, 0.0);
        assert_eq!(eval.relevance_score, 0.0);
        assert_eq!(eval.domain, AutomotiveDomain::Unknown);
        assert_eq!(eval.reasoning, "parse failed");
    }
}
