use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{ACTION_DOWNLOAD_ONLY, ACTION_SYSUPGRADE};

/// What a session is authorized to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitMode {
    /// Synchronize, download and install.
    #[serde(rename = "full_upgrade")]
    FullUpgrade,
    /// Synchronize and download only; nothing is installed.
    #[serde(rename = "download_only")]
    DownloadOnly,
}

impl InitMode {
    /// Policy action id that must be granted for this mode.
    pub fn action_id(&self) -> &'static str {
        match self {
            InitMode::FullUpgrade => ACTION_SYSUPGRADE,
            InitMode::DownloadOnly => ACTION_DOWNLOAD_ONLY,
        }
    }
}

/// Progress of the worker through the upgrade sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    None,
    Init,
    InitDone,
    AddingDb,
    AddDbDone,
    Syncing,
    SyncDone,
    Fetching,
    FetchDone,
    Upgrading,
    UpgradeDone,
    Invalid,
}

impl TransactionState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::None => "none",
            TransactionState::Init => "init",
            TransactionState::InitDone => "init_done",
            TransactionState::AddingDb => "adding_db",
            TransactionState::AddDbDone => "add_db_done",
            TransactionState::Syncing => "syncing",
            TransactionState::SyncDone => "sync_done",
            TransactionState::Fetching => "fetching",
            TransactionState::FetchDone => "fetch_done",
            TransactionState::Upgrading => "upgrading",
            TransactionState::UpgradeDone => "upgrade_done",
            TransactionState::Invalid => "invalid",
        }
    }

    /// Returns `true` while an engine operation owns the engine handle.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TransactionState::AddingDb
                | TransactionState::Syncing
                | TransactionState::Fetching
                | TransactionState::Upgrading
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of synchronizing one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResult {
    Success,
    NotNeeded,
    Failure,
}

/// Per-database synchronization result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSyncResult {
    pub name: String,
    pub result: SyncResult,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warning,
    Debug,
    Function,
}

/// One package affected by the pending transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageChange {
    /// Source repository; `None` for removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Installed version, or [`PackageChange::NO_VERSION`].
    pub old_version: String,
    /// Version after the transaction, or [`PackageChange::REMOVED_VERSION`].
    pub new_version: String,
    pub download_size: u64,
    pub old_size: u64,
    pub new_size: u64,
}

impl PackageChange {
    /// Old version of a package that was not installed.
    pub const NO_VERSION: &'static str = "none";
    /// New version of a package being removed.
    pub const REMOVED_VERSION: &'static str = "-";

    /// Returns `true` if the transaction removes this package.
    pub fn is_removal(&self) -> bool {
        self.new_version == Self::REMOVED_VERSION
    }

    /// Returns `true` if the package was not installed before.
    pub fn is_new_install(&self) -> bool {
        self.old_version == Self::NO_VERSION
    }

    /// Installed size the commit has to process for this package.
    ///
    /// Removals are weighted by what they free, everything else by what
    /// gets installed.
    pub fn commit_weight(&self) -> u64 {
        if self.is_removal() {
            self.old_size
        } else {
            self.new_size
        }
    }

    /// Aggregates download, installed and net sizes over a change list.
    pub fn totals(changes: &[PackageChange]) -> ChangeTotals {
        let mut totals = ChangeTotals::default();
        for change in changes {
            totals.download += change.download_size;
            totals.installed += change.new_size;
            totals.net += change.new_size as i64 - change.old_size as i64;
        }
        totals
    }
}

/// Aggregate sizes of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTotals {
    pub download: u64,
    pub installed: u64,
    /// Installed size difference; negative when space is freed.
    pub net: i64,
}

/// A configuration file preserved as `.pacnew` during the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacnewRecord {
    pub package: String,
    pub old_version: String,
    pub path: String,
}

/// Signature level bit: packages must be signed.
pub const SIG_PACKAGE: u32 = 1 << 0;
/// Signature level bit: package signatures are optional.
pub const SIG_PACKAGE_OPTIONAL: u32 = 1 << 1;
/// Signature level bit: marginal trust is accepted for packages.
pub const SIG_PACKAGE_MARGINAL_OK: u32 = 1 << 2;
/// Signature level bit: unknown trust is accepted for packages.
pub const SIG_PACKAGE_UNKNOWN_OK: u32 = 1 << 3;
/// Signature level bit: databases must be signed.
pub const SIG_DATABASE: u32 = 1 << 10;
/// Signature level bit: database signatures are optional.
pub const SIG_DATABASE_OPTIONAL: u32 = 1 << 11;
/// Signature level bit: marginal trust is accepted for databases.
pub const SIG_DATABASE_MARGINAL_OK: u32 = 1 << 12;
/// Signature level bit: unknown trust is accepted for databases.
pub const SIG_DATABASE_UNKNOWN_OK: u32 = 1 << 13;
/// Use the engine-wide default level.
pub const SIG_USE_DEFAULT: u32 = 1 << 30;

/// Engine configuration sent with `initialize_engine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub root_dir: String,
    pub db_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gpg_dir: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hook_dirs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_dirs: Vec<String>,
    #[serde(default = "default_sig_level")]
    pub sig_level: u32,
    #[serde(default = "default_file_sig_level")]
    pub local_file_sig_level: u32,
    #[serde(default = "default_file_sig_level")]
    pub remote_file_sig_level: u32,
    /// Architecture used for `$arch` in server URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default)]
    pub use_syslog: bool,
    #[serde(default)]
    pub check_space: bool,
    #[serde(default)]
    pub use_delta: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_upgrade: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_extract: Vec<String>,
}

fn default_sig_level() -> u32 {
    SIG_PACKAGE | SIG_PACKAGE_OPTIONAL | SIG_DATABASE | SIG_DATABASE_OPTIONAL
}

fn default_file_sig_level() -> u32 {
    SIG_USE_DEFAULT
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            root_dir: "/".into(),
            db_path: "/var/lib/pacman/".into(),
            log_file: "/var/log/pacman.log".into(),
            gpg_dir: "/etc/pacman.d/gnupg/".into(),
            hook_dirs: vec!["/usr/share/libalpm/hooks/".into(), "/etc/pacman.d/hooks/".into()],
            cache_dirs: vec!["/var/cache/pacman/pkg/".into()],
            sig_level: default_sig_level(),
            local_file_sig_level: default_file_sig_level(),
            remote_file_sig_level: default_file_sig_level(),
            arch: None,
            use_syslog: false,
            check_space: true,
            use_delta: false,
            ignore_packages: Vec::new(),
            ignore_groups: Vec::new(),
            no_upgrade: Vec::new(),
            no_extract: Vec::new(),
        }
    }
}
