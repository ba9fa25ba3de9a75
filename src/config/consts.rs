/// Default number of concurrent embedding provider calls
pub const DEFAULT_EMBEDDING_CONCURRENCY_LIMIT: usize = 5;
/// Default number of texts per embedding provider call
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 16;
/// Default pause a dispatch worker takes between consecutive batches
pub const DEFAULT_INTER_BATCH_DELAY_MS: u64 = 100;
/// Default timeout for a single embedding provider call
pub const DEFAULT_EMBEDDING_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default number of concurrent partitions of a parallel-safe task
pub const DEFAULT_TASK_PARALLEL_CONCURRENCY_LIMIT: usize = 4;
/// Default number of work items per partition of a parallel-safe task
pub const DEFAULT_TASK_PARTITION_SIZE: usize = 32;

/// Default attempts per unit of work, first attempt included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Default fraction of failed write batches tolerated before a run fails
pub const DEFAULT_PARTIAL_FAILURE_THRESHOLD: f64 = 0.5;
/// Default timeout for a single storage backend write
pub const DEFAULT_STORAGE_WRITE_TIMEOUT_MS: u64 = 10_000;

/// Default time a finished run stays queryable
pub const DEFAULT_RUN_RETENTION_SECS: u64 = 3_600;

/// Default dimensionality of the local hashing embedder
pub const DEFAULT_HASHING_DIMENSIONS: usize = 64;
/// Default number of words per chunk produced by `chunk_text`
pub const DEFAULT_CHUNK_WORDS: usize = 64;

/// Pipeline name used when a config does not set one
pub const DEFAULT_PIPELINE_NAME: &str = "default";
