//! Per-aggregate query modules
//!
//! Free functions over `PgPool`/`Transaction`, one module per aggregate.
//! Stage workers compose these; nothing here owns a connection.

pub mod chunks;
pub mod crawl_requests;
pub mod documents;
pub mod knowledge;
pub mod logs;
pub mod staging;
pub mod vehicles;
