// src/store.rs
//
// Version-aware storage abstraction consumed by the deletion pipeline.
// The S3 adapter (s3_store.rs) is the production implementation; the test
// suite plugs an in-memory implementation into the same seam.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, pinned, sendable async stream of fallible enumeration entries.
pub type EntryStream = Pin<Box<dyn Stream<Item = Result<ObjectEntry>> + Send + 'static>>;

/// One enumerable unit of work: a current object, a historical version, or a
/// delete-marker. Immutable once enqueued; consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectEntry {
    /// Entry for a current object (no version pinned).
    pub fn object(key: impl Into<String>) -> Self {
        Self { key: key.into(), version_id: None }
    }

    /// Entry pinned to a specific version or delete-marker.
    pub fn version(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self { key: key.into(), version_id: Some(version_id.into()) }
    }
}

impl fmt::Display for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(v) => write!(f, "{}@{}", self.key, v),
            None => write!(f, "{}", self.key),
        }
    }
}

/// One record from a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub is_delete_marker: bool,
}

/// Version history of a single key, split the way S3 reports it.
#[derive(Debug, Clone, Default)]
pub struct VersionListing {
    pub versions: Vec<VersionInfo>,
    pub delete_markers: Vec<VersionInfo>,
}

/// Result of a metadata probe against one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectHead {
    /// A readable object version.
    Live,
    /// The probed entry is a delete-marker.
    DeleteMarker,
    /// Nothing there (already deleted).
    Missing,
}

/// Version-aware store operations needed by the deletion strategies.
///
/// `delete_version` must be idempotent per version_id: deleting an
/// already-deleted version is success, not an error.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Lazily enumerate current objects under `prefix` (no version_id set).
    fn list_objects(&self, prefix: &str) -> EntryStream;

    /// Lazily enumerate every version and every delete-marker under `prefix`.
    fn list_all_versions(&self, prefix: &str) -> EntryStream;

    /// Full version history of exactly `key`.
    async fn list_versions_of(&self, key: &str) -> Result<VersionListing>;

    /// Delete one version (or the current object when `version_id` is None).
    async fn delete_version(&self, key: &str, version_id: Option<&str>) -> Result<()>;

    /// Metadata probe classifying `entry` as live, delete-marker, or missing.
    async fn head(&self, entry: &ObjectEntry) -> Result<ObjectHead>;

    /// Check whether `entry` exists as a live object.
    async fn exists(&self, entry: &ObjectEntry) -> Result<bool> {
        Ok(matches!(self.head(entry).await?, ObjectHead::Live))
    }
}

/// Produces one store connection per caller. Workers call this once at spawn
/// so that no client is ever shared across concurrent workers.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn VersionStore>>;
}
