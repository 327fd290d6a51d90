use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use crate::stats::PurgeStats;

/// Live progress line for a purge operation, fed from the shared stats.
#[derive(Clone)]
pub struct PurgeProgress {
    bar: ProgressBar,
}

impl PurgeProgress {
    /// Spinner for operations whose total size is unknown until the queue
    /// drains.
    pub fn spinner(operation: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template(&format!("{}: {{spinner:.green}} {{msg}}", operation))
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn update(&self, stats: &PurgeStats) {
        self.bar.set_message(format!(
            "{} objects processed, {} versions / {} markers removed",
            stats.processed(),
            stats.versions_deleted(),
            stats.markers_deleted()
        ));
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }

    /// Background task refreshing the message until aborted by the caller.
    pub fn watch(&self, stats: Arc<PurgeStats>) -> tokio::task::JoinHandle<()> {
        let progress = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(250));
            loop {
                interval.tick().await;
                progress.update(&stats);
            }
        })
    }
}
