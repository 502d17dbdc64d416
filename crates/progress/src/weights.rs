use pacnotify_protocol::events::ProgressKind;
use pacnotify_protocol::InitMode;

/// A weighted stage of an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Download,
    Keyring,
    Integrity,
    FileConflicts,
    Load,
    DiskSpace,
    Commit,
}

impl Stage {
    /// Stage an engine progress report belongs to.
    pub fn from_progress(kind: ProgressKind) -> Stage {
        match kind {
            ProgressKind::KeyringStart => Stage::Keyring,
            ProgressKind::IntegrityStart => Stage::Integrity,
            ProgressKind::ConflictsStart => Stage::FileConflicts,
            ProgressKind::LoadStart => Stage::Load,
            ProgressKind::DiskspaceStart => Stage::DiskSpace,
            ProgressKind::AddStart
            | ProgressKind::UpgradeStart
            | ProgressKind::DowngradeStart
            | ProgressKind::ReinstallStart
            | ProgressKind::RemoveStart => Stage::Commit,
        }
    }
}

/// Share of the global progress given to each stage. Fields sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageWeights {
    pub download: f64,
    pub keyring: f64,
    pub integrity: f64,
    pub file_conflicts: f64,
    pub load: f64,
    pub disk_space: f64,
    pub commit: f64,
}

impl StageWeights {
    pub const WITH_DOWNLOADS: StageWeights = StageWeights {
        download: 0.40,
        keyring: 0.02,
        integrity: 0.08,
        file_conflicts: 0.05,
        load: 0.05,
        disk_space: 0.02,
        commit: 0.38,
    };

    pub const NO_DOWNLOADS: StageWeights = StageWeights {
        download: 0.0,
        keyring: 0.03,
        integrity: 0.12,
        file_conflicts: 0.08,
        load: 0.07,
        disk_space: 0.03,
        commit: 0.67,
    };

    pub const DOWNLOAD_ONLY: StageWeights = StageWeights {
        download: 0.85,
        keyring: 0.03,
        integrity: 0.12,
        file_conflicts: 0.0,
        load: 0.0,
        disk_space: 0.0,
        commit: 0.0,
    };

    pub fn weight(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Download => self.download,
            Stage::Keyring => self.keyring,
            Stage::Integrity => self.integrity,
            Stage::FileConflicts => self.file_conflicts,
            Stage::Load => self.load,
            Stage::DiskSpace => self.disk_space,
            Stage::Commit => self.commit,
        }
    }

    pub fn total(&self) -> f64 {
        self.download
            + self.keyring
            + self.integrity
            + self.file_conflicts
            + self.load
            + self.disk_space
            + self.commit
    }
}

/// Kind of upgrade run, chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    WithDownloads,
    NoDownloads,
    DownloadOnly,
}

impl Scenario {
    pub fn select(mode: InitMode, total_download: u64) -> Scenario {
        match mode {
            InitMode::DownloadOnly => Scenario::DownloadOnly,
            InitMode::FullUpgrade if total_download > 0 => Scenario::WithDownloads,
            InitMode::FullUpgrade => Scenario::NoDownloads,
        }
    }

    pub fn weights(&self) -> StageWeights {
        match self {
            Scenario::WithDownloads => StageWeights::WITH_DOWNLOADS,
            Scenario::NoDownloads => StageWeights::NO_DOWNLOADS,
            Scenario::DownloadOnly => StageWeights::DOWNLOAD_ONLY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_sum_to_one() {
        for weights in [
            StageWeights::WITH_DOWNLOADS,
            StageWeights::NO_DOWNLOADS,
            StageWeights::DOWNLOAD_ONLY,
        ] {
            assert!((weights.total() - 1.0).abs() < 1e-9, "{weights:?}");
        }
    }

    #[test]
    fn scenario_selection() {
        assert_eq!(
            Scenario::select(InitMode::FullUpgrade, 1),
            Scenario::WithDownloads
        );
        assert_eq!(
            Scenario::select(InitMode::FullUpgrade, 0),
            Scenario::NoDownloads
        );
        assert_eq!(
            Scenario::select(InitMode::DownloadOnly, 0),
            Scenario::DownloadOnly
        );
        assert_eq!(
            Scenario::select(InitMode::DownloadOnly, 10).weights().commit,
            0.0
        );
    }

    #[test]
    fn commit_kinds_map_to_commit_stage() {
        assert_eq!(Stage::from_progress(ProgressKind::RemoveStart), Stage::Commit);
        assert_eq!(Stage::from_progress(ProgressKind::AddStart), Stage::Commit);
        assert_eq!(
            Stage::from_progress(ProgressKind::ConflictsStart),
            Stage::FileConflicts
        );
        assert_eq!(Stage::from_progress(ProgressKind::LoadStart), Stage::Load);
    }
}
