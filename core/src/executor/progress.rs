use indicatif::{ProgressBar, ProgressStyle};

use super::types::{BatchResult, ProgressSnapshot};

/// Visual progress monitor for a batch run
///
/// Renders a single bar fed from [`ProgressSnapshot`]s polled off the
/// aggregator; per-task spinners do not scale to batches of thousands.
pub struct ProgressMonitor {
    /// Overall progress bar
    bar: ProgressBar,
    /// Whether monitoring is enabled
    enabled: bool,
}

impl ProgressMonitor {
    /// Create a new progress monitor
    ///
    /// # Arguments
    ///
    /// * `total_tasks` - Total number of tasks in the batch
    /// * `enabled` - Whether to enable visual progress (disabled for jsonl output)
    pub fn new(total_tasks: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
                enabled: false,
            };
        }

        let bar = ProgressBar::new(total_tasks as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▓▒░  "));
        }
        bar.set_message("Starting...");

        Self { bar, enabled: true }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reflect a progress snapshot on the bar
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        if !self.enabled {
            return;
        }
        self.bar.set_position(snapshot.finished() as u64);
        self.bar.set_message(Self::status_line(snapshot));
    }

    /// Finish overall progress
    pub fn finish(&self, result: &BatchResult) {
        if !self.enabled {
            return;
        }
        self.bar.set_position(result.entries.len() as u64);
        let icon = if result.completed && result.failed == 0 {
            "✅"
        } else if result.completed {
            "⚠️"
        } else {
            "❌"
        };
        self.bar
            .finish_with_message(format!("{} {}", icon, result.summary()));
    }

    /// Clear the bar (cleanup)
    pub fn clear(&self) {
        if self.enabled {
            self.bar.finish_and_clear();
        }
    }

    fn status_line(snapshot: &ProgressSnapshot) -> String {
        format!(
            "ok {} | failed {} | in flight {} | pending {}",
            snapshot.succeeded, snapshot.failed, snapshot.in_flight, snapshot.pending
        )
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if self.enabled && !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
