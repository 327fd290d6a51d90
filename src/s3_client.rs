// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Per-context construction of `aws_sdk_s3::Client`.
//!
//! Every delete worker gets its own client, built once at worker start and
//! owned for that worker's lifetime. Nothing here is shared or cached.

use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::{Client, config::Region};
use std::{env, time::Duration};

use crate::config::BucketContext;
use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_REGION};

/// Per-call operation timeout, overridable for slow or throttled endpoints.
fn operation_timeout() -> Duration {
    env::var("S3PURGE_OPERATION_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS))
}

/// Build a fresh S3 client for `ctx`.
///
/// Resolution order matches the rest of the tooling: explicit profile when the
/// context names one, otherwise the default environment credential chain.
/// `AWS_REGION` and `AWS_ENDPOINT_URL` are honored, and path-style addressing
/// is forced so S3-compatible services (MinIO, Ceph, etc.) work unchanged.
pub async fn client_for(ctx: &BucketContext) -> Result<Client> {
    // Load .env first so AWS_* vars are available.
    dotenvy::dotenv().ok();

    let region = RegionProviderChain::first_try(env::var("AWS_REGION").ok().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(profile) = &ctx.profile {
        loader = loader.profile_name(profile);
    }
    if let Ok(endpoint) = env::var("AWS_ENDPOINT_URL") {
        if !endpoint.is_empty() {
            loader = loader.endpoint_url(endpoint);
        }
    }

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .operation_timeout(operation_timeout())
        .build();

    let cfg = loader.timeout_config(timeout_config).load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&cfg)
        .force_path_style(true)
        .build();
    Ok(Client::from_conf(s3_config))
}
