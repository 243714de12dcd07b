//! Queue-driven pipeline that distills automotive diagnostic documents
//! into a provenance-tracked DTC knowledge graph.
//!
//! Six stages connected by durable FIFO queues (Crawl → Chunk → Embed →
//! Evaluate → Extract → Resolve), a deterministic scoring and
//! conflict-resolution engine in Resolve, and a relevance gate that keeps
//! low-value chunks away from model spend. The relational store is the
//! single source of truth; queues only hand off work.

pub mod app;
pub mod clients;
pub mod core;
pub mod data;
pub mod domain;
pub mod stages;
pub mod utils;
