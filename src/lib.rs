// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: public re-exports.

pub mod constants;
pub mod config;
pub mod progress;

pub mod store;
pub mod s3_client;
pub mod s3_store;

pub mod work_queue;
pub mod worker;
pub mod strategy;
pub mod stats;
pub mod bucket;

// ===== Re-exports expected by src/bin/cli.rs and library consumers =====
pub use crate::bucket::Bucket;
pub use crate::config::BucketContext;
pub use crate::constants::DEFAULT_WORKER_COUNT;
pub use crate::stats::{ItemFailure, PurgeStats, PurgeSummary};
pub use crate::store::{
    EntryStream, ObjectEntry, ObjectHead, StoreFactory, VersionInfo, VersionListing, VersionStore,
};
pub use crate::strategy::{ItemOutcome, PurgeMode, Removed};
pub use crate::s3_store::{S3StoreFactory, S3VersionStore};
pub use crate::work_queue::WorkQueue;
pub use crate::worker::DeletePool;
