use anyhow::{Result, bail};

use crate::constants::DEFAULT_WORKER_COUNT;

/// Immutable per-operation configuration for a bucket.
///
/// Each delete worker derives its own independent client connection from this
/// context; the context itself is never mutated after construction.
#[derive(Debug, Clone)]
pub struct BucketContext {
    /// Target bucket name (no `s3://` prefix).
    pub bucket: String,
    /// AWS credentials profile. `None` falls back to environment credentials.
    pub profile: Option<String>,
    /// Number of concurrent delete workers.
    pub worker_count: usize,
}

impl BucketContext {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            profile: None,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            bail!("bucket name must not be empty");
        }
        if self.worker_count == 0 {
            bail!("worker_count must be a positive integer");
        }
        Ok(())
    }
}
