// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "dtcgraph";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "dtcgraph.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "DTCGRAPH_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "DTCGRAPH_LOG";

// =============================================================================
// Environment Variables - External Services
// =============================================================================

/// Environment variable for the PostgreSQL connection URL
pub const ENV_POSTGRES_URL: &str = "DTCGRAPH_POSTGRES_URL";

/// Environment variable for the Redis queue URL
pub const ENV_REDIS_URL: &str = "DTCGRAPH_REDIS_URL";

/// Environment variable for the blob storage backend (filesystem or s3)
pub const ENV_BLOB_BACKEND: &str = "DTCGRAPH_BLOB_BACKEND";

/// Environment variable for the embedding service base URL
pub const ENV_EMBEDDING_URL: &str = "DTCGRAPH_EMBEDDING_URL";

/// Environment variable for the reasoning service base URL
pub const ENV_REASONING_URL: &str = "DTCGRAPH_REASONING_URL";

/// Environment variable for the API key sent to embedding/reasoning services
pub const ENV_LLM_API_KEY: &str = "DTCGRAPH_LLM_API_KEY";

// =============================================================================
// Job Queues
// =============================================================================

/// Queue names are stable wire contracts; payloads are single UUIDs.
pub const QUEUE_CRAWL: &str = "jobs:crawl";
pub const QUEUE_CHUNK: &str = "jobs:chunk";
pub const QUEUE_EMBED: &str = "jobs:embed";
pub const QUEUE_EVALUATE: &str = "jobs:evaluate";
pub const QUEUE_EXTRACT: &str = "jobs:extract";
pub const QUEUE_RESOLVE: &str = "jobs:resolve";

/// All pipeline queues in stage order
pub const ALL_QUEUES: [&str; 6] = [
    QUEUE_CRAWL,
    QUEUE_CHUNK,
    QUEUE_EMBED,
    QUEUE_EVALUATE,
    QUEUE_EXTRACT,
    QUEUE_RESOLVE,
];

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Default blocking pop timeout in seconds
pub const DEFAULT_QUEUE_POP_TIMEOUT_SECS: u64 = 5;

/// Chunks below this relevance score are excluded from extraction
pub const DEFAULT_RELEVANCE_GATE_THRESHOLD: f64 = 0.3;

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE_CHARS: usize = 500;

/// Default chunk overlap in characters
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 50;

/// Default embedding dimension (must match the chunks schema)
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Default maximum crawl depth for link discovery
pub const DEFAULT_MAX_CRAWL_DEPTH: u32 = 1;

/// Default worker count per stage
pub const DEFAULT_WORKERS_PER_STAGE: usize = 1;

/// Upper bound on per-stage worker count
pub const MAX_WORKERS_PER_STAGE: usize = 4;

// =============================================================================
// Database Defaults
// =============================================================================

/// Default minimum pool connections for workers
pub const DB_POOL_DEFAULT_MIN: u32 = 1;

/// Default maximum pool connections for workers
pub const DB_POOL_DEFAULT_MAX: u32 = 5;

/// Default retry attempts for connection-class database errors
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Default backoff between retries in milliseconds
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

// =============================================================================
// External Call Timeouts
// =============================================================================

/// Default timeout for crawl HTTP fetches in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default timeout for embedding requests in seconds
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 120;

/// Default timeout for reasoning requests in seconds
pub const DEFAULT_REASONING_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Reaper Defaults
// =============================================================================

/// Default interval between reaper sweeps in seconds
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

/// Default age after which a document counts as stuck in its stage
pub const DEFAULT_REAPER_STUCK_AFTER_SECS: u64 = 300;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for worker tasks to drain during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
