//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// src/s3_store.rs
//! AWS implementation of the version-aware store.
//!
//! Pagination is wrapped into lazy entry streams, transient provider errors
//! are retried with exponential backoff, and delete-marker classification
//! reads the exact `x-amz-delete-marker` response header rather than
//! guessing from status codes.

use anyhow::{Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BucketContext;
use crate::constants::{DEFAULT_RETRY_COUNT, RETRY_BASE_DELAY_MS};
use crate::s3_client::client_for;
use crate::store::{
    EntryStream, ObjectEntry, ObjectHead, StoreFactory, VersionInfo, VersionListing, VersionStore,
};

/// Retry budget for transient errors, overridable per environment.
fn retry_count() -> usize {
    std::env::var("S3PURGE_RETRY_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1)
}

/// Throttling and infrastructure failures worth retrying. Anything else
/// (access denied, bad bucket, missing key) surfaces to the caller.
fn is_transient<E>(err: &SdkError<E, HttpResponse>) -> bool
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(_) => matches!(
            err.code(),
            Some("SlowDown")
                | Some("Throttling")
                | Some("ThrottlingException")
                | Some("RequestTimeout")
                | Some("InternalError")
                | Some("ServiceUnavailable")
        ),
        _ => false,
    }
}

/// The version (or key) is already gone; callers treat that as success.
fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool
where
    E: ProvideErrorMetadata,
{
    matches!(
        err.code(),
        Some("NoSuchKey") | Some("NoSuchVersion") | Some("NotFound")
    ) || err
        .raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false)
}

/// The provider's delete-marker signal: a failure response carrying the
/// `x-amz-delete-marker: true` header. Status codes alone are not trusted.
fn delete_marker_signal<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .and_then(|r| r.headers().get("x-amz-delete-marker"))
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Run `call` until it succeeds, a non-transient error appears, or the retry
/// budget runs out. Backoff doubles per attempt starting at
/// `RETRY_BASE_DELAY_MS`.
async fn with_retries<T, E, F, Fut>(op: &'static str, mut call: F) -> Result<T, SdkError<E, HttpResponse>>
where
    E: ProvideErrorMetadata,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SdkError<E, HttpResponse>>>,
{
    let mut attempt = 0usize;
    loop {
        match call().await {
            Ok(out) => return Ok(out),
            Err(err) if attempt + 1 < retry_count() && is_transient(&err) => {
                attempt += 1;
                let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << (attempt - 1));
                warn!(
                    "{op}: transient error ({}), retry {attempt} in {delay:?}",
                    err.code().unwrap_or("no code")
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Version-aware S3 store bound to one bucket and one client connection.
pub struct S3VersionStore {
    client: Client,
    bucket: String,
}

impl S3VersionStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }
}

#[async_trait]
impl VersionStore for S3VersionStore {
    /// Current objects only, paginated via ListObjectsV2.
    fn list_objects(&self, prefix: &str) -> EntryStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = prefix.to_string();
        Box::pin(try_stream! {
            let mut cont: Option<String> = None;
            loop {
                let resp = with_retries("list_objects_v2", || {
                    client
                        .list_objects_v2()
                        .bucket(&bucket)
                        .prefix(&prefix)
                        .set_continuation_token(cont.clone())
                        .send()
                })
                .await
                .with_context(|| format!("list_objects_v2 failed for s3://{bucket}/{prefix}"))?;

                for obj in resp.contents() {
                    if let Some(key) = obj.key() {
                        yield ObjectEntry::object(key);
                    }
                }

                match resp.next_continuation_token() {
                    Some(token) => cont = Some(token.to_string()),
                    None => break,
                }
            }
        })
    }

    /// Every version and every delete-marker, paginated via ListObjectVersions.
    fn list_all_versions(&self, prefix: &str) -> EntryStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = prefix.to_string();
        Box::pin(try_stream! {
            let mut key_marker: Option<String> = None;
            let mut version_marker: Option<String> = None;
            loop {
                let resp = with_retries("list_object_versions", || {
                    client
                        .list_object_versions()
                        .bucket(&bucket)
                        .prefix(&prefix)
                        .set_key_marker(key_marker.clone())
                        .set_version_id_marker(version_marker.clone())
                        .send()
                })
                .await
                .with_context(|| {
                    format!("list_object_versions failed for s3://{bucket}/{prefix}")
                })?;

                for v in resp.versions() {
                    if let (Some(key), Some(id)) = (v.key(), v.version_id()) {
                        yield ObjectEntry::version(key, id);
                    }
                }
                for m in resp.delete_markers() {
                    if let (Some(key), Some(id)) = (m.key(), m.version_id()) {
                        yield ObjectEntry::version(key, id);
                    }
                }

                if resp.is_truncated().unwrap_or(false) {
                    key_marker = resp.next_key_marker().map(str::to_string);
                    version_marker = resp.next_version_id_marker().map(str::to_string);
                } else {
                    break;
                }
            }
        })
    }

    /// Version history of exactly `key`. The listing call is prefix-based, so
    /// sibling keys sharing the prefix are filtered out here.
    async fn list_versions_of(&self, key: &str) -> Result<VersionListing> {
        let mut listing = VersionListing::default();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let resp = with_retries("list_object_versions", || {
                self.client
                    .list_object_versions()
                    .bucket(&self.bucket)
                    .prefix(key)
                    .set_key_marker(key_marker.clone())
                    .set_version_id_marker(version_marker.clone())
                    .send()
            })
            .await
            .with_context(|| {
                format!("list_object_versions failed for s3://{}/{key}", self.bucket)
            })?;

            for v in resp.versions() {
                if v.key() != Some(key) {
                    continue;
                }
                if let Some(id) = v.version_id() {
                    listing.versions.push(VersionInfo {
                        key: key.to_string(),
                        version_id: id.to_string(),
                        is_latest: v.is_latest().unwrap_or(false),
                        is_delete_marker: false,
                    });
                }
            }
            for m in resp.delete_markers() {
                if m.key() != Some(key) {
                    continue;
                }
                if let Some(id) = m.version_id() {
                    listing.delete_markers.push(VersionInfo {
                        key: key.to_string(),
                        version_id: id.to_string(),
                        is_latest: m.is_latest().unwrap_or(false),
                        is_delete_marker: true,
                    });
                }
            }

            if resp.is_truncated().unwrap_or(false) {
                key_marker = resp.next_key_marker().map(str::to_string);
                version_marker = resp.next_version_id_marker().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(listing)
    }

    async fn delete_version(&self, key: &str, version_id: Option<&str>) -> Result<()> {
        let result = with_retries("delete_object", || {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .set_version_id(version_id.map(String::from))
                .send()
        })
        .await;

        match result {
            Ok(_) => {
                debug!("deleted s3://{}/{key} version {:?}", self.bucket, version_id);
                Ok(())
            }
            // Already absent: the desired end state is reached.
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("delete_object failed for s3://{}/{key} version {version_id:?}", self.bucket)
            }),
        }
    }

    async fn head(&self, entry: &ObjectEntry) -> Result<ObjectHead> {
        let result = with_retries("head_object", || {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(&entry.key)
                .set_version_id(entry.version_id.clone())
                .send()
        })
        .await;

        match result {
            Ok(_) => Ok(ObjectHead::Live),
            // Marker check comes first: a marker probe also reports 404/405.
            Err(err) if delete_marker_signal(&err) => Ok(ObjectHead::DeleteMarker),
            Err(err) if is_not_found(&err) => Ok(ObjectHead::Missing),
            Err(err) => {
                Err(err).with_context(|| format!("head_object failed for s3://{}/{entry}", self.bucket))
            }
        }
    }
}

/// Builds one fresh client connection per call (one per worker).
pub struct S3StoreFactory {
    ctx: BucketContext,
}

impl S3StoreFactory {
    pub fn new(ctx: BucketContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StoreFactory for S3StoreFactory {
    async fn connect(&self) -> Result<Arc<dyn VersionStore>> {
        let client = client_for(&self.ctx).await?;
        Ok(Arc::new(S3VersionStore::new(client, &self.ctx.bucket)))
    }
}
