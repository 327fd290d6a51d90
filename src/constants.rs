// src/constants.rs
//
// Centralized constants for s3purge to avoid hardcoded values throughout the codebase

/// Default region used when neither the environment nor the profile supplies one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default number of concurrent delete workers per operation
pub const DEFAULT_WORKER_COUNT: usize = 16;

/// Default retry count for transient storage errors
pub const DEFAULT_RETRY_COUNT: usize = 3;

/// Base delay for exponential backoff between retries (doubles per attempt)
pub const RETRY_BASE_DELAY_MS: u64 = 200;

/// Default per-call operation timeout (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 120;

/// Connect timeout for the S3 client (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
