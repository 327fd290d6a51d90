//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `prune`, `delete-all`, `reclaim`, and `ls`.
//!
//! Examples:
//! ```bash
//! purge-cli prune      my-bucket --prefix logs/       # drop old versions, keep current objects
//! purge-cli delete-all my-bucket                      # empty the bucket, versions included
//! purge-cli reclaim    my-bucket -j 32                # purge keys hidden behind delete-markers
//! purge-cli ls         my-bucket --prefix logs/ -V    # list every version and marker
//! ```

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use futures::TryStreamExt;
use std::io::{self, ErrorKind, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use s3purge::progress::PurgeProgress;
use s3purge::{Bucket, BucketContext, DEFAULT_WORKER_COUNT, PurgeMode, PurgeStats, PurgeSummary};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete every non-latest version and delete-marker under the prefix,
    /// keeping the current version of each object.
    Prune {
        /// Bucket name (a leading s3:// is tolerated).
        bucket: String,

        /// Only touch keys starting with this prefix.
        #[arg(short = 'p', long, default_value = "")]
        prefix: String,

        /// Number of concurrent delete workers.
        #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_WORKER_COUNT)]
        jobs: usize,

        /// AWS credentials profile (default: environment credentials).
        #[arg(long)]
        profile: Option<String>,

        /// Optional regex applied client-side to candidate keys.
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Delete every object, every version, and every delete-marker under the
    /// prefix.
    DeleteAll {
        bucket: String,

        #[arg(short = 'p', long, default_value = "")]
        prefix: String,

        #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_WORKER_COUNT)]
        jobs: usize,

        #[arg(long)]
        profile: Option<String>,

        #[arg(long)]
        pattern: Option<String>,
    },
    /// Fully purge keys whose newest history entry is a delete-marker;
    /// restored objects (live version above an old marker) are untouched.
    Reclaim {
        bucket: String,

        #[arg(short = 'p', long, default_value = "")]
        prefix: String,

        #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_WORKER_COUNT)]
        jobs: usize,

        #[arg(long)]
        profile: Option<String>,

        #[arg(long)]
        pattern: Option<String>,
    },
    /// List keys under a prefix, optionally every version and marker.
    Ls {
        bucket: String,

        #[arg(short = 'p', long, default_value = "")]
        prefix: String,

        /// List every version and delete-marker, not just current objects.
        #[arg(short = 'V', long)]
        versions: bool,

        #[arg(long)]
        profile: Option<String>,
    },
}

/// Check if AWS credentials are available when no profile was named.
fn check_aws_credentials(profile: &Option<String>) -> Result<()> {
    if profile.is_none()
        && (std::env::var("AWS_ACCESS_KEY_ID").is_err()
            || std::env::var("AWS_SECRET_ACCESS_KEY").is_err())
    {
        bail!(
            "Missing required AWS environment variables. Please set AWS_ACCESS_KEY_ID and \
            AWS_SECRET_ACCESS_KEY (and optionally AWS_REGION) in your environment or .env file, \
            or pass --profile."
        );
    }
    Ok(())
}

/// Strip the protocol prefix and any trailing slashes from a bucket argument.
fn clean_bucket_name(bucket: &str) -> &str {
    bucket
        .strip_prefix("s3://")
        .unwrap_or(bucket)
        .trim_end_matches('/')
}

fn bucket_for(
    bucket: &str,
    jobs: usize,
    profile: Option<String>,
) -> Result<Bucket> {
    let mut ctx = BucketContext::new(clean_bucket_name(bucket)).with_worker_count(jobs);
    if let Some(profile) = profile {
        ctx = ctx.with_profile(profile);
    }
    Bucket::new(ctx)
}

/// Shared driver behind the three purge subcommands: progress display, the
/// pipeline run, and the final summary (non-zero exit when items failed).
async fn purge_cmd(
    operation: &str,
    mode: PurgeMode,
    bucket: &Bucket,
    prefix: &str,
    pattern: Option<&str>,
) -> Result<()> {
    let stats = Arc::new(PurgeStats::default());
    let progress = PurgeProgress::spinner(operation);
    let ticker = progress.watch(Arc::clone(&stats));

    let started = Instant::now();
    let result = bucket.run(mode, prefix, pattern, Arc::clone(&stats)).await;
    ticker.abort();

    let summary = result?;
    let elapsed = Duration::from_secs(started.elapsed().as_secs());
    progress.finish(format!(
        "done in {}: {} objects processed, {} versions / {} markers removed, {} skipped",
        humantime::format_duration(elapsed),
        summary.processed,
        summary.versions_deleted,
        summary.markers_deleted,
        summary.skipped,
    ));

    report_failures(&summary)
}

fn report_failures(summary: &PurgeSummary) -> Result<()> {
    if summary.is_clean() {
        return Ok(());
    }
    for failure in &summary.failures {
        match &failure.version_id {
            Some(v) => eprintln!("FAILED {}@{}: {}", failure.key, v, failure.error),
            None => eprintln!("FAILED {}: {}", failure.key, failure.error),
        }
    }
    bail!("{} item(s) failed; see messages above", summary.failures.len());
}

async fn ls_cmd(bucket: &Bucket, prefix: &str, versions: bool) -> Result<()> {
    let store = bucket.connect_store().await?;
    let mut entries = if versions {
        store.list_all_versions(prefix)
    } else {
        store.list_objects(prefix)
    };

    let mut total = 0usize;
    while let Some(entry) = entries.try_next().await? {
        match &entry.version_id {
            Some(v) => safe_println!("{}\t{}", entry.key, v),
            None => safe_println!("{}", entry.key),
        }
        total += 1;
    }
    safe_println!("\nTotal entries: {}", total);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialise logging once, based on how many `-v` flags were given:
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Capture log-crate messages from dependencies too.
    tracing_log::LogTracer::init().ok();

    match cli.cmd {
        Command::Prune { bucket, prefix, jobs, profile, pattern } => {
            check_aws_credentials(&profile)?;
            let bucket = bucket_for(&bucket, jobs, profile)?;
            purge_cmd("prune", PurgeMode::PruneVersions, &bucket, &prefix, pattern.as_deref())
                .await
                .context("prune failed")?;
        }
        Command::DeleteAll { bucket, prefix, jobs, profile, pattern } => {
            check_aws_credentials(&profile)?;
            let bucket = bucket_for(&bucket, jobs, profile)?;
            purge_cmd("delete-all", PurgeMode::DeleteAll, &bucket, &prefix, pattern.as_deref())
                .await
                .context("delete-all failed")?;
        }
        Command::Reclaim { bucket, prefix, jobs, profile, pattern } => {
            check_aws_credentials(&profile)?;
            let bucket = bucket_for(&bucket, jobs, profile)?;
            purge_cmd("reclaim", PurgeMode::ReclaimMarkers, &bucket, &prefix, pattern.as_deref())
                .await
                .context("reclaim failed")?;
        }
        Command::Ls { bucket, prefix, versions, profile } => {
            check_aws_credentials(&profile)?;
            let bucket = bucket_for(&bucket, DEFAULT_WORKER_COUNT, profile)?;
            ls_cmd(&bucket, &prefix, versions).await?;
        }
    }

    Ok(())
}
