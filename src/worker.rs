// src/worker.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Fixed-size pool of delete workers.
//!
//! Each worker owns its own store connection (the underlying client is not
//! assumed safe to share between concurrent logical callers), pulls entries
//! from the shared queue, applies the operation's handler, and records the
//! outcome. Per-item failures never kill the loop and never break the
//! queue's completion accounting.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stats::PurgeStats;
use crate::store::{ObjectEntry, StoreFactory, VersionStore};
use crate::strategy::PurgeMode;
use crate::work_queue::WorkQueue;

pub struct DeletePool {
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl DeletePool {
    /// Start `count` workers bound to `mode`. Workers park on `pop` right
    /// away, so the pool may be spawned before the queue holds anything.
    pub async fn spawn(
        count: usize,
        factory: &dyn StoreFactory,
        queue: Arc<WorkQueue<ObjectEntry>>,
        mode: PurgeMode,
        stats: Arc<PurgeStats>,
    ) -> Result<Self> {
        // Connect every store before spawning anything so a failed connect
        // cannot leave half a pool running.
        let mut stores = Vec::with_capacity(count);
        for id in 0..count {
            let store = factory
                .connect()
                .await
                .with_context(|| format!("worker {id}: unable to connect store"))?;
            stores.push(store);
        }

        let cancel = CancellationToken::new();
        let mut workers = Vec::with_capacity(count);
        for (id, store) in stores.into_iter().enumerate() {
            let queue = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            let token = cancel.clone();
            workers.push(tokio::spawn(worker_loop(id, store, queue, mode, stats, token)));
        }
        Ok(Self { workers, cancel })
    }

    /// Stop the workers and wait for them to exit. Called by the
    /// orchestrator once `join()` has drained the queue (or on abort).
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(
    id: usize,
    store: Arc<dyn VersionStore>,
    queue: Arc<WorkQueue<ObjectEntry>>,
    mode: PurgeMode,
    stats: Arc<PurgeStats>,
    cancel: CancellationToken,
) {
    debug!("delete worker {id} started");
    loop {
        let entry = tokio::select! {
            _ = cancel.cancelled() => break,
            entry = queue.pop() => entry,
        };
        // Completion must be accounted on every exit path, including a panic
        // inside the handler.
        let _done = queue.completion_guard();
        match mode.apply(store.as_ref(), &entry).await {
            Ok(outcome) => stats.record(outcome),
            Err(err) => {
                warn!("worker {id}: {entry} failed: {err:#}");
                stats.record_failure(&entry, &err);
            }
        }
    }
    debug!("delete worker {id} stopped");
}
