// src/strategy.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! The three per-item deletion handlers. Each is invoked once per popped
//! entry with the worker's own store connection.

use anyhow::Result;

use crate::store::{ObjectEntry, ObjectHead, VersionListing, VersionStore};

/// Which deletion handler the worker pool applies to each entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeMode {
    /// Delete every non-latest version and every delete-marker; the current
    /// version of each object survives.
    PruneVersions,
    /// Delete exactly the enumerated version or marker the entry points at.
    DeleteAll,
    /// Fully purge keys whose newest entry is a delete-marker; leave
    /// everything else untouched.
    ReclaimMarkers,
}

/// What removing one entry amounted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Removed {
    pub versions: usize,
    pub markers: usize,
}

/// Typed per-item result recorded by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Removed(Removed),
    Skipped,
}

impl PurgeMode {
    pub(crate) async fn apply(
        self,
        store: &dyn VersionStore,
        entry: &ObjectEntry,
    ) -> Result<ItemOutcome> {
        match self {
            PurgeMode::PruneVersions => prune_versions(store, &entry.key).await,
            PurgeMode::DeleteAll => delete_enumerated(store, entry).await,
            PurgeMode::ReclaimMarkers => reclaim_marker(store, entry).await,
        }
    }
}

/// Delete every non-latest version of `key`, then its delete-markers.
/// Version deletions run before marker deletions for each key.
async fn prune_versions(store: &dyn VersionStore, key: &str) -> Result<ItemOutcome> {
    let listing = store.list_versions_of(key).await?;
    let mut removed = Removed::default();
    for version in &listing.versions {
        if version.is_latest {
            continue;
        }
        store
            .delete_version(&version.key, Some(&version.version_id))
            .await?;
        removed.versions += 1;
    }
    removed.markers = delete_markers(store, &listing).await?;
    Ok(ItemOutcome::Removed(removed))
}

/// The entry was produced by version-aware enumeration, so one direct delete
/// suffices; no secondary listing call.
async fn delete_enumerated(store: &dyn VersionStore, entry: &ObjectEntry) -> Result<ItemOutcome> {
    store
        .delete_version(&entry.key, entry.version_id.as_deref())
        .await?;
    Ok(ItemOutcome::Removed(Removed { versions: 1, markers: 0 }))
}

/// Purge the whole key only when its newest history entry is a delete-marker.
/// A live version sitting above an older marker means the object was
/// restored; such keys are left untouched.
async fn reclaim_marker(store: &dyn VersionStore, entry: &ObjectEntry) -> Result<ItemOutcome> {
    match store.head(entry).await? {
        ObjectHead::DeleteMarker => {}
        ObjectHead::Live | ObjectHead::Missing => return Ok(ItemOutcome::Skipped),
    }

    let listing = store.list_versions_of(&entry.key).await?;
    if !listing.delete_markers.iter().any(|m| m.is_latest) {
        return Ok(ItemOutcome::Skipped);
    }

    let mut removed = Removed::default();
    for version in &listing.versions {
        store
            .delete_version(&version.key, Some(&version.version_id))
            .await?;
        removed.versions += 1;
    }
    removed.markers = delete_markers(store, &listing).await?;
    Ok(ItemOutcome::Removed(removed))
}

/// Marker-cleanup substep shared by the prune and reclaim handlers.
async fn delete_markers(store: &dyn VersionStore, listing: &VersionListing) -> Result<usize> {
    let mut deleted = 0;
    for marker in &listing.delete_markers {
        store
            .delete_version(&marker.key, Some(&marker.version_id))
            .await?;
        deleted += 1;
    }
    Ok(deleted)
}
