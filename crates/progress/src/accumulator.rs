use std::collections::{HashMap, HashSet};

use pacnotify_protocol::events::{DownloadEvent, DownloadResult, ItemProgress};
use pacnotify_protocol::PackageChange;
use tracing::debug;

use crate::rate::RateEstimator;
use crate::weights::{Scenario, Stage, StageWeights};

/// Folds per-stage engine reports into one global fraction.
///
/// The reported value is clamped to `[0, 1]` and never decreases.
pub struct ProgressAccumulator {
    weights: StageWeights,
    finished: HashSet<Stage>,
    completed: f64,
    current: Option<Stage>,
    current_fraction: f64,
    reported: f64,
    downloads: DownloadTracker,
    commit: CommitTracker,
}

impl ProgressAccumulator {
    pub fn new(scenario: Scenario) -> Self {
        Self::with_weights(scenario.weights())
    }

    pub fn with_weights(weights: StageWeights) -> Self {
        Self {
            weights,
            finished: HashSet::new(),
            completed: 0.0,
            current: None,
            current_fraction: 0.0,
            reported: 0.0,
            downloads: DownloadTracker::default(),
            commit: CommitTracker::default(),
        }
    }

    /// Sets the engine-reported number of bytes to download.
    pub fn set_total_download(&mut self, total: u64) {
        self.downloads.total = total;
    }

    /// Weights commit progress by each package's installed size.
    pub fn set_changes(&mut self, changes: &[PackageChange]) {
        self.commit.sizes = changes
            .iter()
            .map(|c| (c.name.clone(), c.commit_weight()))
            .collect();
        self.commit.total = self.commit.sizes.values().sum();
    }

    /// Feeds a download report; returns the global fraction.
    pub fn on_download(&mut self, file: &str, event: &DownloadEvent) -> f64 {
        let fraction = match event {
            DownloadEvent::Init { .. } => None,
            DownloadEvent::Progress { downloaded, total } => {
                Some(self.downloads.progress(file, *downloaded, *total))
            }
            DownloadEvent::Retry => Some(self.downloads.retry(file)),
            DownloadEvent::Completed { total, result } => match result {
                DownloadResult::Success => Some(self.downloads.progress(file, *total, *total)),
                DownloadResult::UpToDate | DownloadResult::Failed => None,
            },
        };
        if let Some(fraction) = fraction {
            self.update(Stage::Download, fraction);
        }
        self.fraction()
    }

    /// Feeds an item progress report; returns the global fraction.
    pub fn on_progress(&mut self, progress: &ItemProgress) -> f64 {
        let stage = Stage::from_progress(progress.kind);
        let fraction = if stage == Stage::Commit {
            self.commit.progress(progress)
        } else {
            // Non-commit stages report an overall percentage.
            f64::from(progress.percent) / 100.0
        };
        self.update(stage, fraction);
        self.fraction()
    }

    /// Marks the run as complete.
    pub fn finish(&mut self) -> f64 {
        self.reported = 1.0;
        self.reported
    }

    /// Last reported global fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        self.reported
    }

    /// Last reported global progress as a whole percentage.
    pub fn percent(&self) -> u8 {
        (self.reported * 100.0).floor() as u8
    }

    /// Download rate in bytes per second.
    pub fn download_rate(&self) -> f64 {
        self.downloads.rate.bytes_per_second()
    }

    fn update(&mut self, stage: Stage, fraction: f64) {
        if self.current != Some(stage) {
            if self.finished.contains(&stage) {
                return;
            }
            if let Some(previous) = self.current.take() {
                self.completed += self.weights.weight(previous);
                self.finished.insert(previous);
                debug!(?previous, next = ?stage, completed = self.completed, "progress stage finished");
            }
            self.current = Some(stage);
            self.current_fraction = 0.0;
        }

        self.current_fraction = self.current_fraction.max(fraction.clamp(0.0, 1.0));
        let global = self.completed + self.weights.weight(stage) * self.current_fraction;
        self.reported = self.reported.max(global.clamp(0.0, 1.0));
    }
}

#[derive(Default)]
struct DownloadTracker {
    total: u64,
    files: HashMap<String, u64>,
    /// Bytes counted earlier and thrown away by mirror retries.
    carried: u64,
    rate: RateEstimator,
}

impl DownloadTracker {
    fn progress(&mut self, file: &str, downloaded: u64, file_total: u64) -> f64 {
        let previous = self.files.insert(file.to_string(), downloaded).unwrap_or(0);
        if downloaded < previous {
            // Transferred count went backwards: another mirror took over.
            debug!(file, previous, downloaded, file_total, "download restarted");
            self.carried += previous - downloaded;
        } else {
            self.rate.record(downloaded - previous);
        }
        self.fraction()
    }

    fn retry(&mut self, file: &str) -> f64 {
        if let Some(previous) = self.files.insert(file.to_string(), 0) {
            self.carried += previous;
        }
        self.fraction()
    }

    fn fraction(&self) -> f64 {
        let transferred: u64 = self.files.values().sum();
        let denominator = self.total + self.carried;
        if denominator == 0 {
            return 0.0;
        }
        ((transferred + self.carried) as f64 / denominator as f64).min(1.0)
    }
}

#[derive(Default)]
struct CommitTracker {
    sizes: HashMap<String, u64>,
    total: u64,
    percents: HashMap<String, u8>,
    done: u64,
}

impl CommitTracker {
    fn progress(&mut self, progress: &ItemProgress) -> f64 {
        if self.total == 0 {
            if progress.howmany == 0 {
                return 0.0;
            }
            let current = progress.current.saturating_sub(1) as f64;
            return (current + f64::from(progress.percent.min(100)) / 100.0)
                / progress.howmany as f64;
        }

        let percent = progress.percent.min(100);
        let weight = self.sizes.get(&progress.package).copied().unwrap_or(0);
        let previous = self.percents.entry(progress.package.clone()).or_insert(0);
        if percent > *previous {
            self.done += weight * u64::from(percent - *previous);
            *previous = percent;
        }
        self.done as f64 / (self.total as f64 * 100.0)
    }
}
