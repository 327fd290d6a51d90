// tests/test_purge_ops.rs
//
// End-to-end pipeline tests against an in-memory version store: the three
// operations, prefix/pattern scoping, idempotence, failure isolation, and
// the per-worker connection rule.

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::stream;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use s3purge::{
    Bucket, BucketContext, EntryStream, ObjectEntry, ObjectHead, PurgeMode, PurgeStats,
    StoreFactory, VersionInfo, VersionListing, VersionStore,
};

/// One entry in a key's history, oldest first; the last element is latest.
#[derive(Clone)]
struct Rev {
    id: String,
    marker: bool,
}

#[derive(Default)]
struct MockState {
    keys: BTreeMap<String, Vec<Rev>>,
    fail_deletes: HashSet<String>,
    next_marker_id: usize,
}

struct MockStore {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl VersionStore for MockStore {
    fn list_objects(&self, prefix: &str) -> EntryStream {
        let entries: Vec<Result<ObjectEntry>> = self
            .state
            .lock()
            .unwrap()
            .keys
            .iter()
            .filter(|(key, revs)| {
                key.starts_with(prefix) && revs.last().map(|r| !r.marker).unwrap_or(false)
            })
            .map(|(key, _)| Ok(ObjectEntry::object(key.clone())))
            .collect();
        Box::pin(stream::iter(entries))
    }

    fn list_all_versions(&self, prefix: &str) -> EntryStream {
        let entries: Vec<Result<ObjectEntry>> = self
            .state
            .lock()
            .unwrap()
            .keys
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .flat_map(|(key, revs)| {
                revs.iter()
                    .map(|rev| Ok(ObjectEntry::version(key.clone(), rev.id.clone())))
                    .collect::<Vec<_>>()
            })
            .collect();
        Box::pin(stream::iter(entries))
    }

    async fn list_versions_of(&self, key: &str) -> Result<VersionListing> {
        let state = self.state.lock().unwrap();
        let mut listing = VersionListing::default();
        if let Some(revs) = state.keys.get(key) {
            let last = revs.len().saturating_sub(1);
            for (i, rev) in revs.iter().enumerate() {
                let info = VersionInfo {
                    key: key.to_string(),
                    version_id: rev.id.clone(),
                    is_latest: i == last,
                    is_delete_marker: rev.marker,
                };
                if rev.marker {
                    listing.delete_markers.push(info);
                } else {
                    listing.versions.push(info);
                }
            }
        }
        Ok(listing)
    }

    async fn delete_version(&self, key: &str, version_id: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes.contains(key) {
            bail!("injected delete failure for {key}");
        }
        match version_id {
            Some(id) => {
                let emptied = match state.keys.get_mut(key) {
                    // Deleting a missing key/version is success (idempotent).
                    None => return Ok(()),
                    Some(revs) => {
                        revs.retain(|rev| rev.id != id);
                        revs.is_empty()
                    }
                };
                if emptied {
                    state.keys.remove(key);
                }
            }
            None => {
                // Versionless delete lays a new delete-marker on top.
                let id = format!("marker-{}", state.next_marker_id);
                state.next_marker_id += 1;
                state
                    .keys
                    .entry(key.to_string())
                    .or_default()
                    .push(Rev { id, marker: true });
            }
        }
        Ok(())
    }

    async fn head(&self, entry: &ObjectEntry) -> Result<ObjectHead> {
        let state = self.state.lock().unwrap();
        let Some(revs) = state.keys.get(&entry.key) else {
            return Ok(ObjectHead::Missing);
        };
        let rev = match &entry.version_id {
            Some(id) => revs.iter().find(|rev| rev.id == *id),
            None => revs.last(),
        };
        Ok(match rev {
            Some(rev) if rev.marker => ObjectHead::DeleteMarker,
            Some(_) => ObjectHead::Live,
            None => ObjectHead::Missing,
        })
    }
}

#[derive(Default)]
struct MockFactory {
    state: Arc<Mutex<MockState>>,
    connections: AtomicUsize,
}

#[async_trait]
impl StoreFactory for MockFactory {
    async fn connect(&self) -> Result<Arc<dyn VersionStore>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockStore { state: Arc::clone(&self.state) }))
    }
}

impl MockFactory {
    fn seed(&self, key: &str, revs: &[(&str, bool)]) {
        self.state.lock().unwrap().keys.insert(
            key.to_string(),
            revs.iter()
                .map(|(id, marker)| Rev { id: id.to_string(), marker: *marker })
                .collect(),
        );
    }

    fn fail_deletes_of(&self, key: &str) {
        self.state.lock().unwrap().fail_deletes.insert(key.to_string());
    }

    fn revision_ids(&self, key: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .keys
            .get(key)
            .map(|revs| revs.iter().map(|r| r.id.clone()).collect())
    }

    fn key_count(&self) -> usize {
        self.state.lock().unwrap().keys.len()
    }
}

fn test_bucket(factory: &Arc<MockFactory>, workers: usize) -> Bucket {
    let ctx = BucketContext::new("test-bucket").with_worker_count(workers);
    Bucket::with_store_factory(ctx, Arc::clone(factory) as Arc<dyn StoreFactory>).unwrap()
}

// ---------------------------------------------------------------------------
// prune-versions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prune_keeps_only_the_latest_version() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("logs/a.txt", &[("v1", false), ("v2", false), ("v3", false)]);

    let bucket = test_bucket(&factory, 4);
    let summary = bucket.prune_versions("logs/").await.unwrap();

    assert_eq!(factory.revision_ids("logs/a.txt").unwrap(), vec!["v3"]);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.versions_deleted, 2);
    assert_eq!(summary.markers_deleted, 0);
    assert!(summary.is_clean());
}

#[tokio::test]
async fn prune_also_removes_old_delete_markers() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("doc.pdf", &[("v1", false), ("m1", true), ("v2", false)]);

    let bucket = test_bucket(&factory, 2);
    let summary = bucket.prune_versions("").await.unwrap();

    assert_eq!(factory.revision_ids("doc.pdf").unwrap(), vec!["v2"]);
    assert_eq!(summary.versions_deleted, 1);
    assert_eq!(summary.markers_deleted, 1);
}

#[tokio::test]
async fn prune_is_scoped_to_the_prefix() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("logs/a.txt", &[("v1", false), ("v2", false)]);
    factory.seed("data/b.txt", &[("v1", false), ("v2", false)]);

    let bucket = test_bucket(&factory, 2);
    bucket.prune_versions("logs/").await.unwrap();

    assert_eq!(factory.revision_ids("logs/a.txt").unwrap(), vec!["v2"]);
    assert_eq!(
        factory.revision_ids("data/b.txt").unwrap(),
        vec!["v1", "v2"],
        "keys outside the prefix must be untouched"
    );
}

// ---------------------------------------------------------------------------
// delete-all
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_all_leaves_nothing_behind() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("a.txt", &[("v1", false), ("v2", false)]);
    factory.seed("b.txt", &[("v1", false), ("m1", true)]);
    factory.seed("c.txt", &[("m1", true)]);

    let bucket = test_bucket(&factory, 4);
    let summary = bucket.delete_all("").await.unwrap();

    assert_eq!(factory.key_count(), 0);
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.versions_deleted, 5);
    assert!(summary.is_clean());
}

#[tokio::test]
async fn delete_all_honors_a_key_pattern() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("keep.dat", &[("v1", false)]);
    factory.seed("scratch/one.tmp", &[("v1", false), ("v2", false)]);
    factory.seed("scratch/two.tmp", &[("v1", false)]);

    let bucket = test_bucket(&factory, 2);
    let stats = Arc::new(PurgeStats::default());
    let summary = bucket
        .run(PurgeMode::DeleteAll, "", Some(r"\.tmp$"), stats)
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert!(factory.revision_ids("keep.dat").is_some());
    assert!(factory.revision_ids("scratch/one.tmp").is_none());
    assert!(factory.revision_ids("scratch/two.tmp").is_none());
}

#[tokio::test]
async fn rejects_an_invalid_pattern_before_deleting() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("a.txt", &[("v1", false)]);

    let bucket = test_bucket(&factory, 2);
    let stats = Arc::new(PurgeStats::default());
    let err = bucket
        .run(PurgeMode::DeleteAll, "", Some("(unclosed"), stats)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("pattern"));
    assert!(factory.revision_ids("a.txt").is_some());
}

// ---------------------------------------------------------------------------
// reclaim delete-markers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reclaim_purges_a_marker_topped_key() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("b.txt", &[("v1", false), ("m1", true)]);

    let bucket = test_bucket(&factory, 1);
    let summary = bucket.reclaim_delete_markers("").await.unwrap();

    assert_eq!(factory.revision_ids("b.txt"), None, "key must be fully purged");
    assert_eq!(summary.versions_deleted, 1);
    assert_eq!(summary.markers_deleted, 1);
    assert!(summary.is_clean());
}

#[tokio::test]
async fn reclaim_leaves_restored_objects_untouched() {
    // A live version sits above the old marker: the object was un-deleted.
    let factory = Arc::new(MockFactory::default());
    factory.seed("c.txt", &[("v1", false), ("m1", true), ("v2", false)]);

    let bucket = test_bucket(&factory, 1);
    let summary = bucket.reclaim_delete_markers("").await.unwrap();

    assert_eq!(
        factory.revision_ids("c.txt").unwrap(),
        vec!["v1", "m1", "v2"],
        "restored keys keep their full history"
    );
    assert_eq!(summary.versions_deleted, 0);
    assert_eq!(summary.markers_deleted, 0);
    assert_eq!(summary.skipped, 3);
}

#[tokio::test]
async fn reclaim_only_touches_marker_topped_keys_in_a_mixed_bucket() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("gone.txt", &[("v1", false), ("v2", false), ("m1", true)]);
    factory.seed("alive.txt", &[("v1", false), ("v2", false)]);

    let bucket = test_bucket(&factory, 4);
    let summary = bucket.reclaim_delete_markers("").await.unwrap();

    assert_eq!(factory.revision_ids("gone.txt"), None);
    assert_eq!(factory.revision_ids("alive.txt").unwrap(), vec!["v1", "v2"]);
    assert_eq!(summary.versions_deleted, 2);
    assert_eq!(summary.markers_deleted, 1);
}

// ---------------------------------------------------------------------------
// idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_all_twice_has_an_empty_second_pass() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("a.txt", &[("v1", false), ("v2", false)]);

    let bucket = test_bucket(&factory, 2);
    bucket.delete_all("").await.unwrap();
    let second = bucket.delete_all("").await.unwrap();

    assert_eq!(second.processed, 0);
    assert!(second.is_clean());
}

#[tokio::test]
async fn prune_twice_removes_nothing_on_the_second_pass() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("a.txt", &[("v1", false), ("v2", false), ("v3", false)]);

    let bucket = test_bucket(&factory, 2);
    bucket.prune_versions("").await.unwrap();
    let second = bucket.prune_versions("").await.unwrap();

    assert_eq!(second.versions_deleted, 0);
    assert_eq!(second.markers_deleted, 0);
    assert!(second.is_clean());
}

// ---------------------------------------------------------------------------
// failure isolation and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_failing_key_is_recorded_without_stopping_the_rest() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("good1.txt", &[("v1", false), ("v2", false)]);
    factory.seed("bad.txt", &[("v1", false), ("v2", false)]);
    factory.seed("good2.txt", &[("v1", false), ("v2", false)]);
    factory.fail_deletes_of("bad.txt");

    let bucket = test_bucket(&factory, 3);
    let summary = bucket.prune_versions("").await.unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].key, "bad.txt");
    assert!(summary.failures[0].error.contains("injected delete failure"));
    assert_eq!(factory.revision_ids("good1.txt").unwrap(), vec!["v2"]);
    assert_eq!(factory.revision_ids("good2.txt").unwrap(), vec!["v2"]);
    assert_eq!(summary.processed, 3, "the failed item still counts as processed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_entry_is_processed_for_any_worker_count() {
    for workers in [1usize, 4, 32] {
        let factory = Arc::new(MockFactory::default());
        for i in 0..40 {
            factory.seed(
                &format!("bulk/obj-{i:03}"),
                &[("v1", false), ("v2", false), ("v3", false)],
            );
        }

        let bucket = test_bucket(&factory, workers);
        let summary = bucket.delete_all("bulk/").await.unwrap();

        assert_eq!(summary.processed, 120, "workers={workers}");
        assert_eq!(factory.key_count(), 0, "workers={workers}");
        assert!(summary.is_clean(), "workers={workers}");
    }
}

#[tokio::test]
async fn each_worker_gets_its_own_store_connection() {
    let factory = Arc::new(MockFactory::default());
    factory.seed("a.txt", &[("v1", false)]);

    let bucket = test_bucket(&factory, 5);
    bucket.delete_all("").await.unwrap();

    // One connection per worker plus the enumeration connection.
    assert_eq!(factory.connections.load(Ordering::SeqCst), 6);
}
