// src/bucket.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Bucket facade: enumerate candidates, feed the queue, run the pool.
//!
//! Every public operation follows the same template: establish the
//! enumeration store (setup errors abort here, before anything is deleted),
//! spawn the worker pool, stream enumeration pages into the queue, wait for
//! the queue to drain, shut the pool down, return the tally.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::BucketContext;
use crate::s3_store::S3StoreFactory;
use crate::stats::{PurgeStats, PurgeSummary};
use crate::store::StoreFactory;
use crate::strategy::PurgeMode;
use crate::work_queue::WorkQueue;
use crate::worker::DeletePool;

pub struct Bucket {
    ctx: BucketContext,
    factory: Arc<dyn StoreFactory>,
}

impl Bucket {
    /// Facade over an S3 bucket, validated at construction.
    pub fn new(ctx: BucketContext) -> Result<Self> {
        ctx.validate()?;
        let factory: Arc<dyn StoreFactory> = Arc::new(S3StoreFactory::new(ctx.clone()));
        Ok(Self { ctx, factory })
    }

    /// Same facade with an injected store factory (used by the test suite
    /// and by callers fronting non-AWS stores).
    pub fn with_store_factory(ctx: BucketContext, factory: Arc<dyn StoreFactory>) -> Result<Self> {
        ctx.validate()?;
        Ok(Self { ctx, factory })
    }

    pub fn context(&self) -> &BucketContext {
        &self.ctx
    }

    /// One store connection, e.g. for listings outside the delete pipeline.
    pub async fn connect_store(&self) -> Result<Arc<dyn crate::store::VersionStore>> {
        self.factory.connect().await
    }

    /// Delete all non-latest versions and delete-markers under `prefix`,
    /// keeping the current version of every object.
    pub async fn prune_versions(&self, prefix: &str) -> Result<PurgeSummary> {
        self.run(PurgeMode::PruneVersions, prefix, None, Arc::new(PurgeStats::default()))
            .await
    }

    /// Delete every object, every version, and every delete-marker under
    /// `prefix`.
    pub async fn delete_all(&self, prefix: &str) -> Result<PurgeSummary> {
        self.run(PurgeMode::DeleteAll, prefix, None, Arc::new(PurgeStats::default()))
            .await
    }

    /// Fully purge keys under `prefix` whose newest history entry is a
    /// delete-marker; keys with a live current version are left untouched.
    pub async fn reclaim_delete_markers(&self, prefix: &str) -> Result<PurgeSummary> {
        self.run(PurgeMode::ReclaimMarkers, prefix, None, Arc::new(PurgeStats::default()))
            .await
    }

    /// Shared pipeline behind the three operations. `pattern` optionally
    /// narrows enumeration with a client-side regex on the key; `stats` is
    /// caller-supplied so a progress display can watch it live.
    pub async fn run(
        &self,
        mode: PurgeMode,
        prefix: &str,
        pattern: Option<&str>,
        stats: Arc<PurgeStats>,
    ) -> Result<PurgeSummary> {
        let filter = pattern
            .map(Regex::new)
            .transpose()
            .context("invalid key filter pattern")?;

        let lister = self
            .factory
            .connect()
            .await
            .context("unable to establish storage session")?;

        let queue = Arc::new(WorkQueue::new());
        // Workers start first and park on pop; enumeration feeds them below.
        let pool = DeletePool::spawn(
            self.ctx.worker_count,
            self.factory.as_ref(),
            Arc::clone(&queue),
            mode,
            Arc::clone(&stats),
        )
        .await?;

        let fed = async {
            let mut entries = match mode {
                PurgeMode::PruneVersions => lister.list_objects(prefix),
                PurgeMode::DeleteAll | PurgeMode::ReclaimMarkers => {
                    lister.list_all_versions(prefix)
                }
            };
            let mut enumerated = 0u64;
            while let Some(entry) = entries.try_next().await? {
                if let Some(re) = &filter {
                    if !re.is_match(&entry.key) {
                        continue;
                    }
                }
                queue.push(entry);
                enumerated += 1;
            }
            Ok::<u64, anyhow::Error>(enumerated)
        }
        .await;

        match fed {
            Ok(enumerated) => {
                debug!(
                    "enumerated {enumerated} entries under s3://{}/{prefix}",
                    self.ctx.bucket
                );
                queue.join().await;
                pool.shutdown().await;
                let summary = stats.snapshot();
                info!(
                    "s3://{}/{prefix}: {} processed, {} versions and {} delete-markers removed, {} skipped, {} failed",
                    self.ctx.bucket,
                    summary.processed,
                    summary.versions_deleted,
                    summary.markers_deleted,
                    summary.skipped,
                    summary.failures.len()
                );
                Ok(summary)
            }
            Err(err) => {
                // Enumeration broke mid-stream: stop the workers without
                // waiting for the remaining queue contents.
                pool.shutdown().await;
                Err(err).with_context(|| {
                    format!("enumeration failed for s3://{}/{prefix}", self.ctx.bucket)
                })
            }
        }
    }
}
