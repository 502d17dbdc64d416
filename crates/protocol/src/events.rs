use serde::{Deserialize, Serialize};

use crate::types::{LogLevel, SyncResult};

/// Push notification sent by the worker while a method runs.
///
/// Carried as the payload of an `event` message. Events never expect a
/// reply; questions travel separately as `question` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// A line from the engine's log callback.
    Log { level: LogLevel, message: String },
    /// Database synchronization is starting for `count` databases.
    SyncStarted { count: usize },
    SyncDbStarted { name: String },
    SyncDbFinished { name: String, result: SyncResult },
    /// Total number of bytes the commit will download.
    TotalDownload { total: u64 },
    /// Per-file download activity.
    Download { file: String, event: DownloadEvent },
    /// Per-item progress of a transaction stage.
    Progress(ItemProgress),
    /// Transaction lifecycle notifications.
    Engine(EngineEvent),
}

/// Download activity for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// The download started; `optional` files (signatures) may fail quietly.
    Init { optional: bool },
    /// Bytes transferred so far for this file.
    Progress { downloaded: u64, total: u64 },
    /// The transfer restarts from scratch on another mirror.
    Retry,
    Completed { total: u64, result: DownloadResult },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadResult {
    Success,
    UpToDate,
    Failed,
}

/// What a progress report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    AddStart,
    UpgradeStart,
    DowngradeStart,
    ReinstallStart,
    RemoveStart,
    ConflictsStart,
    DiskspaceStart,
    IntegrityStart,
    LoadStart,
    KeyringStart,
}

impl ProgressKind {
    /// Returns `true` for reports about packages being committed.
    pub fn is_commit(&self) -> bool {
        matches!(
            self,
            ProgressKind::AddStart
                | ProgressKind::UpgradeStart
                | ProgressKind::DowngradeStart
                | ProgressKind::ReinstallStart
                | ProgressKind::RemoveStart
        )
    }
}

/// One progress report from the engine.
///
/// `percent` is the progress of the current item, `current` its 1-based
/// position among `howmany` items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub kind: ProgressKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    pub percent: u8,
    pub howmany: usize,
    pub current: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Done,
    Failed,
}

/// Transaction stages the engine announces with start/done events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStage {
    CheckDeps,
    ResolveDeps,
    InterConflicts,
    Transaction,
    Retrieve,
    Integrity,
    Keyring,
    KeyDownload,
    LoadPackages,
    FileConflicts,
    DiskSpace,
    PreTransactionHooks,
    PostTransactionHooks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageOperation {
    Install,
    Remove,
    Upgrade,
    Downgrade,
    Reinstall,
}

/// Engine event callback payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Lifecycle {
        stage: EngineStage,
        phase: Phase,
    },
    PackageOperation {
        operation: PackageOperation,
        phase: Phase,
        package: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        old_version: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        new_version: String,
        /// Optional dependencies the new version adds.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        optdepends: Vec<String>,
    },
    HookRun {
        phase: Phase,
        name: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        description: String,
        position: usize,
        total: usize,
    },
    ScriptletInfo {
        line: String,
    },
    PacnewCreated {
        package: String,
        old_version: String,
        new_version: String,
        file: String,
    },
    PacsaveCreated {
        package: String,
        old_version: String,
        file: String,
    },
    DatabaseMissing {
        name: String,
    },
    OptdepRemoval {
        package: String,
        optdep: String,
    },
}
