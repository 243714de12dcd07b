//! Domain types and pure logic: documents, chunks, extractions, vehicles,
//! fingerprints, and the shared scoring library.

pub mod chunk;
pub mod document;
pub mod dtc;
pub mod extraction;
pub mod fingerprint;
pub mod scoring;
pub mod vehicle;

pub use chunk::{AutomotiveDomain, Chunk, ChunkEvaluation};
pub use document::{CrawlRequest, CrawlStatus, Document, ProcessingStage};
pub use dtc::DtcCode;
pub use extraction::{DocumentCategory, Extraction, Likelihood, RawExtraction, Severity};
pub use vehicle::{VehicleContext, VehicleMatch, VehicleTie};
