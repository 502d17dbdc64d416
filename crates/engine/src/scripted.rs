//! Engine that replays a declarative [`Scenario`].
//!
//! Used by the integration tests and by the helper's demo backend. It walks
//! through the same callback sequence a real engine produces (database
//! downloads, lifecycle stages, per-package progress, questions, pacnew
//! notices) without touching the system. A [`ScriptedJournal`] shared with the
//! factory records what the worker asked for.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use pacnotify_protocol::events::{
    DownloadEvent, DownloadResult, EngineEvent, EngineStage, ItemProgress, PackageOperation,
    Phase, ProgressKind,
};
use pacnotify_protocol::types::LogLevel;
use pacnotify_protocol::{Answer, EngineOptions, Question, QuestionKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::callbacks::EngineCallbacks;
use crate::diagnostics::{CommitDiagnostic, PrepareDiagnostic};
use crate::engine::{
    EngineFactory, PackageEngine, SyncOutcome, TransactionFlags, TransactionInterrupt,
};
use crate::error::EngineError;
use crate::plan::{PlannedPackage, TransactionPlan};

/// How long a commit waits for an interrupt in `wait_for_interrupt` mode.
const INTERRUPT_WAIT: Duration = Duration::from_secs(30);
const INTERRUPT_POLL: Duration = Duration::from_millis(10);

/// Scripted outcome of a database sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedSync {
    #[default]
    Updated,
    UpToDate,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedDatabase {
    pub name: String,
    #[serde(default)]
    pub outcome: ScriptedSync,
    /// Error text for [`ScriptedSync::Fail`].
    #[serde(default)]
    pub error: String,
    /// Size of the database file download.
    #[serde(default)]
    pub size: u64,
}

/// When a scripted question is asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStage {
    Prepare,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedQuestion {
    pub stage: QuestionStage,
    pub question: Question,
}

/// A configuration file the commit saves as `.pacnew`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedPacnew {
    pub package: String,
    pub file: String,
}

/// Everything the scripted engine does, declared up front.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Makes engine creation fail with this message.
    pub init_error: Option<String>,
    pub databases: Vec<ScriptedDatabase>,
    pub plan: TransactionPlan,
    pub questions: Vec<ScriptedQuestion>,
    /// Non-empty: prepare fails with these causes.
    pub prepare_failure: Vec<PrepareDiagnostic>,
    /// Non-empty: commit fails with these causes after integrity checks.
    pub commit_failure: Vec<CommitDiagnostic>,
    pub pacnew: Vec<ScriptedPacnew>,
    pub hooks: Vec<String>,
    /// Packages whose download restarts on another mirror halfway through.
    pub retry_downloads: Vec<String>,
    /// Commit blocks before installing until it is interrupted.
    pub wait_for_interrupt: bool,
}

/// Observations shared between a [`ScriptedFactory`] and its engines.
#[derive(Debug, Default)]
pub struct ScriptedJournal {
    calls: Mutex<Vec<String>>,
    answers: Mutex<Vec<(QuestionKind, Answer)>>,
    servers: Mutex<Vec<(String, String)>>,
    options: Mutex<Option<EngineOptions>>,
    interrupts: AtomicUsize,
    transaction_open: AtomicBool,
    released: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedJournal {
    /// Engine methods called so far, by name.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Answers the engine received, in order.
    pub fn answers(&self) -> Vec<(QuestionKind, Answer)> {
        lock(&self.answers).clone()
    }

    /// `(database, url)` pairs passed to `add_server`.
    pub fn servers(&self) -> Vec<(String, String)> {
        lock(&self.servers).clone()
    }

    /// Options of the most recently created engine.
    pub fn options(&self) -> Option<EngineOptions> {
        lock(&self.options).clone()
    }

    /// Number of interrupts delivered.
    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn transaction_open(&self) -> bool {
        self.transaction_open.load(Ordering::SeqCst)
    }

    /// Returns `true` once an engine was released.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }
}

/// Creates [`ScriptedEngine`]s that all replay the same scenario.
pub struct ScriptedFactory {
    scenario: Scenario,
    journal: Arc<ScriptedJournal>,
}

impl ScriptedFactory {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            journal: Arc::new(ScriptedJournal::default()),
        }
    }

    pub fn journal(&self) -> Arc<ScriptedJournal> {
        Arc::clone(&self.journal)
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(
        &self,
        options: &EngineOptions,
        callbacks: Arc<dyn EngineCallbacks>,
    ) -> Result<Box<dyn PackageEngine>, EngineError> {
        self.journal.record("create");
        *lock(&self.journal.options) = Some(options.clone());
        self.journal.released.store(false, Ordering::SeqCst);

        if let Some(message) = &self.scenario.init_error {
            return Err(EngineError::Init(message.clone()));
        }
        if options.root_dir.is_empty() || options.db_path.is_empty() {
            return Err(EngineError::Init(
                "root directory and database path are required".into(),
            ));
        }

        callbacks.log(
            LogLevel::Debug,
            &format!("scripted engine at {} ({})", options.root_dir, options.db_path),
        );
        Ok(Box::new(ScriptedEngine {
            scenario: self.scenario.clone(),
            callbacks,
            journal: Arc::clone(&self.journal),
            databases: Vec::new(),
            transaction: None,
            prepared: false,
            interrupted: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct RegisteredDatabase {
    name: String,
    servers: Vec<String>,
}

/// A [`PackageEngine`] replaying a [`Scenario`].
pub struct ScriptedEngine {
    scenario: Scenario,
    callbacks: Arc<dyn EngineCallbacks>,
    journal: Arc<ScriptedJournal>,
    databases: Vec<RegisteredDatabase>,
    transaction: Option<TransactionFlags>,
    prepared: bool,
    interrupted: Arc<AtomicBool>,
}

struct ScriptedInterrupt {
    flag: Arc<AtomicBool>,
    journal: Arc<ScriptedJournal>,
}

impl TransactionInterrupt for ScriptedInterrupt {
    fn interrupt(&self) -> Result<(), EngineError> {
        self.journal.interrupts.fetch_add(1, Ordering::SeqCst);
        self.flag.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl ScriptedEngine {
    fn lifecycle(&self, stage: EngineStage, phase: Phase) {
        self.callbacks
            .event(EngineEvent::Lifecycle { stage, phase });
    }

    fn check_interrupt(&self) -> Result<(), EngineError> {
        if self.interrupted.load(Ordering::SeqCst) {
            self.callbacks
                .log(LogLevel::Warning, "transaction interrupted");
            return Err(EngineError::Interrupted);
        }
        Ok(())
    }

    fn ask(&self, stage: QuestionStage) {
        for scripted in self.scenario.questions.iter().filter(|q| q.stage == stage) {
            let kind = scripted.question.kind();
            let answer = self.callbacks.question(scripted.question.clone());
            debug!(%kind, ?answer, "scripted question answered");
            lock(&self.journal.answers).push((kind, answer));
        }
    }

    fn transfer(&self, file: &str, size: u64, retry: bool) {
        let cb = &self.callbacks;
        cb.download(file, DownloadEvent::Init { optional: false });
        cb.download(
            file,
            DownloadEvent::Progress {
                downloaded: size / 2,
                total: size,
            },
        );
        if retry {
            // Next mirror starts over with fewer bytes transferred.
            cb.download(
                file,
                DownloadEvent::Progress {
                    downloaded: size / 4,
                    total: size,
                },
            );
        }
        cb.download(
            file,
            DownloadEvent::Progress {
                downloaded: size,
                total: size,
            },
        );
        cb.download(
            file,
            DownloadEvent::Completed {
                total: size,
                result: DownloadResult::Success,
            },
        );
    }

    fn per_package(&self, kind: ProgressKind, stage: EngineStage) {
        let packages = &self.scenario.plan.additions;
        self.lifecycle(stage, Phase::Start);
        let howmany = packages.len();
        for (i, pkg) in packages.iter().enumerate() {
            // Stage reports carry the overall percentage, not a per-item one.
            self.callbacks.progress(ItemProgress {
                kind,
                package: pkg.name.clone(),
                percent: ((i + 1) * 100 / howmany) as u8,
                howmany,
                current: i + 1,
            });
        }
        self.lifecycle(stage, Phase::Done);
    }

    fn install(&self, pkg: &PlannedPackage, current: usize, howmany: usize) -> Result<(), EngineError> {
        let (operation, kind, old_version) = match &pkg.local {
            None => (PackageOperation::Install, ProgressKind::AddStart, String::new()),
            Some(local) if local.version == pkg.version => (
                PackageOperation::Reinstall,
                ProgressKind::ReinstallStart,
                local.version.clone(),
            ),
            Some(local) => (
                PackageOperation::Upgrade,
                ProgressKind::UpgradeStart,
                local.version.clone(),
            ),
        };

        self.callbacks.event(EngineEvent::PackageOperation {
            operation,
            phase: Phase::Start,
            package: pkg.name.clone(),
            old_version: old_version.clone(),
            new_version: pkg.version.clone(),
            optdepends: Vec::new(),
        });
        for percent in [0, 50, 100] {
            self.check_interrupt()?;
            self.callbacks.progress(ItemProgress {
                kind,
                package: pkg.name.clone(),
                percent,
                howmany,
                current,
            });
        }
        for pacnew in self.scenario.pacnew.iter().filter(|p| p.package == pkg.name) {
            self.callbacks.event(EngineEvent::PacnewCreated {
                package: pkg.name.clone(),
                old_version: old_version.clone(),
                new_version: pkg.version.clone(),
                file: pacnew.file.clone(),
            });
        }
        self.callbacks.event(EngineEvent::PackageOperation {
            operation,
            phase: Phase::Done,
            package: pkg.name.clone(),
            old_version,
            new_version: pkg.version.clone(),
            optdepends: Vec::new(),
        });
        Ok(())
    }

    fn run_hooks(&self, stage: EngineStage) {
        if self.scenario.hooks.is_empty() {
            return;
        }
        self.lifecycle(stage, Phase::Start);
        let total = self.scenario.hooks.len();
        for (i, name) in self.scenario.hooks.iter().enumerate() {
            for phase in [Phase::Start, Phase::Done] {
                self.callbacks.event(EngineEvent::HookRun {
                    phase,
                    name: name.clone(),
                    description: String::new(),
                    position: i + 1,
                    total,
                });
            }
        }
        self.lifecycle(stage, Phase::Done);
    }

    fn wait_for_interrupt(&self) -> Result<(), EngineError> {
        let deadline = Instant::now() + INTERRUPT_WAIT;
        while Instant::now() < deadline {
            self.check_interrupt()?;
            thread::sleep(INTERRUPT_POLL);
        }
        Err(EngineError::Other("no interrupt received".into()))
    }
}

impl PackageEngine for ScriptedEngine {
    fn register_database(&mut self, name: &str, sig_level: u32) -> Result<(), EngineError> {
        self.journal.record(format!("register_database {name}"));
        if self.databases.iter().any(|db| db.name == name) {
            return Err(EngineError::Database {
                name: name.to_string(),
                message: "database already registered".into(),
            });
        }
        debug!(name, sig_level, "registered database");
        self.databases.push(RegisteredDatabase {
            name: name.to_string(),
            servers: Vec::new(),
        });
        Ok(())
    }

    fn add_server(&mut self, database: &str, url: &str) -> Result<(), EngineError> {
        let db = self
            .databases
            .iter_mut()
            .find(|db| db.name == database)
            .ok_or_else(|| EngineError::Database {
                name: database.to_string(),
                message: "database not registered".into(),
            })?;
        db.servers.push(url.to_string());
        lock(&self.journal.servers).push((database.to_string(), url.to_string()));
        Ok(())
    }

    fn databases(&self) -> Vec<String> {
        self.databases.iter().map(|db| db.name.clone()).collect()
    }

    fn sync_database(&mut self, name: &str, force: bool) -> Result<SyncOutcome, EngineError> {
        self.journal.record(format!("sync_database {name}"));
        let db = self
            .databases
            .iter()
            .find(|db| db.name == name)
            .ok_or_else(|| EngineError::Database {
                name: name.to_string(),
                message: "database not registered".into(),
            })?;
        if db.servers.is_empty() {
            return Err(EngineError::Database {
                name: name.to_string(),
                message: "no servers configured".into(),
            });
        }

        let script = self
            .scenario
            .databases
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .unwrap_or(ScriptedDatabase {
                name: name.to_string(),
                outcome: ScriptedSync::UpToDate,
                error: String::new(),
                size: 0,
            });
        let file = format!("{name}.db");
        let outcome = if force && script.outcome == ScriptedSync::UpToDate {
            ScriptedSync::Updated
        } else {
            script.outcome
        };

        match outcome {
            ScriptedSync::Updated => {
                self.transfer(&file, script.size, false);
                Ok(SyncOutcome::Updated)
            }
            ScriptedSync::UpToDate => {
                self.callbacks.download(
                    &file,
                    DownloadEvent::Completed {
                        total: 0,
                        result: DownloadResult::UpToDate,
                    },
                );
                Ok(SyncOutcome::UpToDate)
            }
            ScriptedSync::Fail => {
                let message = if script.error.is_empty() {
                    "failed to retrieve some files".to_string()
                } else {
                    script.error
                };
                self.callbacks.download(
                    &file,
                    DownloadEvent::Completed {
                        total: 0,
                        result: DownloadResult::Failed,
                    },
                );
                self.callbacks.log(
                    LogLevel::Error,
                    &format!("failed to synchronize {name}: {message}"),
                );
                Err(EngineError::Database {
                    name: name.to_string(),
                    message,
                })
            }
        }
    }

    fn begin_transaction(&mut self, flags: TransactionFlags) -> Result<(), EngineError> {
        self.journal.record(if flags.download_only {
            "begin_transaction download_only"
        } else {
            "begin_transaction"
        });
        if self.transaction.is_some() {
            return Err(EngineError::TransactionActive);
        }
        self.transaction = Some(flags);
        self.prepared = false;
        self.interrupted.store(false, Ordering::SeqCst);
        self.journal.transaction_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn sysupgrade(&mut self) -> Result<(), EngineError> {
        self.journal.record("sysupgrade");
        if self.transaction.is_none() {
            return Err(EngineError::NoTransaction);
        }
        Ok(())
    }

    fn prepare(&mut self) -> Result<TransactionPlan, EngineError> {
        self.journal.record("prepare");
        if self.transaction.is_none() {
            return Err(EngineError::NoTransaction);
        }

        self.lifecycle(EngineStage::CheckDeps, Phase::Start);
        self.ask(QuestionStage::Prepare);

        if let Some(first) = self.scenario.prepare_failure.first() {
            let message = match first {
                PrepareDiagnostic::InvalidArch { .. } => "package architecture is not valid",
                PrepareDiagnostic::UnsatisfiedDep { .. } => "could not satisfy dependencies",
                PrepareDiagnostic::Conflict { .. } => "conflicting dependencies",
            };
            return Err(EngineError::Prepare {
                message: message.into(),
                diagnostics: self.scenario.prepare_failure.clone(),
            });
        }

        self.lifecycle(EngineStage::CheckDeps, Phase::Done);
        self.lifecycle(EngineStage::ResolveDeps, Phase::Start);
        self.lifecycle(EngineStage::ResolveDeps, Phase::Done);
        self.lifecycle(EngineStage::InterConflicts, Phase::Start);
        self.lifecycle(EngineStage::InterConflicts, Phase::Done);

        self.prepared = true;
        Ok(self.scenario.plan.clone())
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        self.journal.record("commit");
        let flags = self.transaction.ok_or(EngineError::NoTransaction)?;
        if !self.prepared {
            return Err(EngineError::Other("transaction not prepared".into()));
        }

        let plan = &self.scenario.plan;
        self.callbacks.total_download(plan.total_download);

        self.lifecycle(EngineStage::Retrieve, Phase::Start);
        for pkg in plan.additions.iter().filter(|p| p.download_size > 0) {
            self.check_interrupt()?;
            let file = format!("{}-{}-x86_64.pkg.tar.zst", pkg.name, pkg.version);
            let retry = self.scenario.retry_downloads.contains(&pkg.name);
            self.transfer(&file, pkg.download_size, retry);
        }
        self.lifecycle(EngineStage::Retrieve, Phase::Done);

        self.per_package(ProgressKind::KeyringStart, EngineStage::Keyring);
        self.per_package(ProgressKind::IntegrityStart, EngineStage::Integrity);
        self.ask(QuestionStage::Commit);

        if let Some(first) = self.scenario.commit_failure.first() {
            let message = match first {
                CommitDiagnostic::FileConflict { .. } => "conflicting files",
                CommitDiagnostic::InvalidPackage { .. } => "invalid or corrupted package",
            };
            return Err(EngineError::Commit {
                message: message.into(),
                diagnostics: self.scenario.commit_failure.clone(),
            });
        }
        if flags.download_only {
            self.callbacks
                .log(LogLevel::Debug, "download only, skipping installation");
            return Ok(());
        }

        self.per_package(ProgressKind::LoadStart, EngineStage::LoadPackages);
        self.per_package(ProgressKind::ConflictsStart, EngineStage::FileConflicts);
        self.per_package(ProgressKind::DiskspaceStart, EngineStage::DiskSpace);

        self.run_hooks(EngineStage::PreTransactionHooks);
        self.lifecycle(EngineStage::Transaction, Phase::Start);
        if self.scenario.wait_for_interrupt {
            self.wait_for_interrupt()?;
        }

        let howmany = plan.additions.len() + plan.removals.len();
        for (i, pkg) in plan.additions.iter().enumerate() {
            self.install(pkg, i + 1, howmany)?;
        }
        for (i, pkg) in plan.removals.iter().enumerate() {
            self.check_interrupt()?;
            let current = plan.additions.len() + i + 1;
            for phase in [Phase::Start, Phase::Done] {
                self.callbacks.event(EngineEvent::PackageOperation {
                    operation: PackageOperation::Remove,
                    phase,
                    package: pkg.name.clone(),
                    old_version: pkg.version.clone(),
                    new_version: String::new(),
                    optdepends: Vec::new(),
                });
                if phase == Phase::Start {
                    self.callbacks.progress(ItemProgress {
                        kind: ProgressKind::RemoveStart,
                        package: pkg.name.clone(),
                        percent: 100,
                        howmany,
                        current,
                    });
                }
            }
        }

        self.lifecycle(EngineStage::Transaction, Phase::Done);
        self.run_hooks(EngineStage::PostTransactionHooks);
        Ok(())
    }

    fn release_transaction(&mut self) -> Result<(), EngineError> {
        self.journal.record("release_transaction");
        if self.transaction.take().is_none() {
            return Err(EngineError::NoTransaction);
        }
        self.prepared = false;
        self.journal.transaction_open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn interrupt_handle(&self) -> Arc<dyn TransactionInterrupt> {
        Arc::new(ScriptedInterrupt {
            flag: Arc::clone(&self.interrupted),
            journal: Arc::clone(&self.journal),
        })
    }

    fn release(self: Box<Self>) -> Result<(), EngineError> {
        self.journal.record("release");
        if self.transaction.is_some() {
            return Err(EngineError::TransactionActive);
        }
        self.journal.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DepModifier, Dependency};
    use crate::plan::InstalledPackage;

    #[derive(Default)]
    struct Recorder {
        downloads: Mutex<Vec<(String, DownloadEvent)>>,
        events: Mutex<Vec<EngineEvent>>,
        progress: Mutex<Vec<ItemProgress>>,
        questions: Mutex<Vec<Question>>,
        totals: Mutex<Vec<u64>>,
    }

    impl EngineCallbacks for Recorder {
        fn log(&self, _level: LogLevel, _message: &str) {}

        fn download(&self, file: &str, event: DownloadEvent) {
            self.downloads.lock().unwrap().push((file.to_string(), event));
        }

        fn total_download(&self, total: u64) {
            self.totals.lock().unwrap().push(total);
        }

        fn event(&self, event: EngineEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn question(&self, question: Question) -> Answer {
            let answer = question.default_answer();
            self.questions.lock().unwrap().push(question);
            answer
        }

        fn progress(&self, progress: ItemProgress) {
            self.progress.lock().unwrap().push(progress);
        }
    }

    fn options() -> EngineOptions {
        EngineOptions::default()
    }

    fn scenario() -> Scenario {
        Scenario {
            databases: vec![
                ScriptedDatabase {
                    name: "core".into(),
                    outcome: ScriptedSync::Updated,
                    error: String::new(),
                    size: 1000,
                },
                ScriptedDatabase {
                    name: "extra".into(),
                    outcome: ScriptedSync::Fail,
                    error: "mirror unreachable".into(),
                    size: 0,
                },
            ],
            plan: TransactionPlan {
                additions: vec![PlannedPackage {
                    repo: "core".into(),
                    name: "bash".into(),
                    description: String::new(),
                    version: "5.2-2".into(),
                    download_size: 400,
                    installed_size: 900,
                    local: Some(InstalledPackage {
                        name: "bash".into(),
                        description: String::new(),
                        version: "5.2-1".into(),
                        installed_size: 880,
                    }),
                }],
                removals: Vec::new(),
                total_download: 400,
            },
            pacnew: vec![ScriptedPacnew {
                package: "bash".into(),
                file: "/etc/bash.bashrc".into(),
            }],
            ..Scenario::default()
        }
    }

    fn engine(scenario: Scenario) -> (Box<dyn PackageEngine>, Arc<Recorder>, Arc<ScriptedJournal>) {
        let factory = ScriptedFactory::new(scenario);
        let recorder = Arc::new(Recorder::default());
        let engine = factory.create(&options(), recorder.clone()).unwrap();
        (engine, recorder, factory.journal())
    }

    #[test]
    fn init_error_fails_creation() {
        let factory = ScriptedFactory::new(Scenario {
            init_error: Some("could not lock database".into()),
            ..Scenario::default()
        });
        let result = factory.create(&options(), Arc::new(Recorder::default()));
        assert!(matches!(result, Err(EngineError::Init(_))));
    }

    #[test]
    fn sync_reports_per_database_outcomes() {
        let (mut engine, recorder, journal) = engine(scenario());
        for db in ["core", "extra", "multilib"] {
            engine.register_database(db, 0).unwrap();
            engine.add_server(db, "https://mirror.example/x").unwrap();
        }

        assert_eq!(engine.sync_database("core", false).unwrap(), SyncOutcome::Updated);
        assert!(matches!(
            engine.sync_database("extra", false),
            Err(EngineError::Database { .. })
        ));
        assert_eq!(
            engine.sync_database("multilib", false).unwrap(),
            SyncOutcome::UpToDate
        );
        assert_eq!(
            engine.sync_database("multilib", true).unwrap(),
            SyncOutcome::Updated
        );

        let downloads = recorder.downloads.lock().unwrap();
        assert!(downloads.iter().any(|(f, _)| f == "core.db"));
        assert_eq!(journal.servers().len(), 3);
    }

    #[test]
    fn sync_without_servers_fails() {
        let (mut engine, _, _) = engine(scenario());
        engine.register_database("core", 0).unwrap();
        assert!(engine.sync_database("core", false).is_err());
    }

    #[test]
    fn duplicate_database_is_rejected() {
        let (mut engine, _, _) = engine(scenario());
        engine.register_database("core", 0).unwrap();
        assert!(engine.register_database("core", 0).is_err());
        assert!(engine.add_server("missing", "https://x").is_err());
    }

    #[test]
    fn prepare_and_commit_walk_every_stage() {
        let (mut engine, recorder, journal) = engine(scenario());
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        engine.sysupgrade().unwrap();
        let plan = engine.prepare().unwrap();
        assert_eq!(plan.additions.len(), 1);
        engine.commit().unwrap();
        engine.release_transaction().unwrap();
        engine.release().unwrap();

        assert_eq!(*recorder.totals.lock().unwrap(), vec![400]);
        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::PacnewCreated { file, .. } if file == "/etc/bash.bashrc"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::PackageOperation {
                operation: PackageOperation::Upgrade,
                ..
            }
        )));
        let progress = recorder.progress.lock().unwrap();
        assert!(progress.iter().any(|p| p.kind == ProgressKind::UpgradeStart));
        assert!(progress.iter().any(|p| p.kind == ProgressKind::DiskspaceStart));
        assert!(journal.released());
        assert!(!journal.transaction_open());
    }

    #[test]
    fn download_only_commit_stops_after_integrity() {
        let (mut engine, recorder, journal) = engine(scenario());
        engine
            .begin_transaction(TransactionFlags {
                download_only: true,
            })
            .unwrap();
        engine.prepare().unwrap();
        engine.commit().unwrap();

        let progress = recorder.progress.lock().unwrap();
        assert!(progress.iter().any(|p| p.kind == ProgressKind::IntegrityStart));
        assert!(!progress.iter().any(|p| p.kind.is_commit()));
        assert!(journal
            .calls()
            .contains(&"begin_transaction download_only".to_string()));
    }

    #[test]
    fn prepare_failure_leaves_transaction_open() {
        let mut s = scenario();
        s.prepare_failure = vec![PrepareDiagnostic::UnsatisfiedDep {
            target: "foo".into(),
            depend: Dependency {
                name: "bar".into(),
                modifier: DepModifier::Ge,
                version: "2".into(),
            },
            causing: None,
        }];
        let (mut engine, _, journal) = engine(s);
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        let err = engine.prepare().unwrap_err();
        assert_eq!(err.details(), "foo: requires bar>=2");
        assert!(engine.has_transaction());
        assert!(journal.transaction_open());
    }

    #[test]
    fn questions_are_asked_in_their_stage() {
        let mut s = scenario();
        s.questions = vec![
            ScriptedQuestion {
                stage: QuestionStage::Prepare,
                question: Question::Replace {
                    old_package: "a".into(),
                    new_package: "b".into(),
                    repo: "extra".into(),
                },
            },
            ScriptedQuestion {
                stage: QuestionStage::Commit,
                question: Question::CorruptedPackage {
                    file: "/var/cache/pacman/pkg/x.pkg.tar.zst".into(),
                    reason: "invalid PGP signature".into(),
                },
            },
        ];
        let (mut engine, recorder, journal) = engine(s);
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        engine.prepare().unwrap();
        assert_eq!(recorder.questions.lock().unwrap().len(), 1);
        engine.commit().unwrap();
        assert_eq!(
            journal.answers(),
            vec![
                (QuestionKind::Replace, Answer::Confirm(false)),
                (QuestionKind::CorruptedPackage, Answer::Confirm(true)),
            ]
        );
    }

    #[test]
    fn retry_download_regresses_counter() {
        let mut s = scenario();
        s.retry_downloads = vec!["bash".into()];
        let (mut engine, recorder, _) = engine(s);
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        engine.prepare().unwrap();
        engine.commit().unwrap();

        let downloads = recorder.downloads.lock().unwrap();
        let progress: Vec<u64> = downloads
            .iter()
            .filter_map(|(_, e)| match e {
                DownloadEvent::Progress { downloaded, .. } => Some(*downloaded),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![200, 100, 400]);
    }

    #[test]
    fn interrupt_stops_waiting_commit() {
        let mut s = scenario();
        s.wait_for_interrupt = true;
        let (mut engine, _, journal) = engine(s);
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        engine.prepare().unwrap();
        let handle = engine.interrupt_handle();

        let committer = thread::spawn(move || engine.commit());
        thread::sleep(Duration::from_millis(50));
        handle.interrupt().unwrap();

        let result = committer.join().unwrap();
        assert!(matches!(result, Err(EngineError::Interrupted)));
        assert_eq!(journal.interrupts(), 1);
    }

    #[test]
    fn commit_failure_carries_diagnostics() {
        let mut s = scenario();
        s.commit_failure = vec![CommitDiagnostic::FileConflict {
            target: "bash".into(),
            file: "/usr/bin/bash".into(),
            conflicting: None,
        }];
        let (mut engine, _, _) = engine(s);
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        engine.prepare().unwrap();
        let err = engine.commit().unwrap_err();
        assert_eq!(err.details(), "bash: /usr/bin/bash exists in filesystem");
    }

    #[test]
    fn release_with_open_transaction_fails() {
        let (mut engine, _, _) = engine(scenario());
        engine
            .begin_transaction(TransactionFlags::default())
            .unwrap();
        assert!(matches!(
            engine.begin_transaction(TransactionFlags::default()),
            Err(EngineError::TransactionActive)
        ));
        assert!(engine.release().is_err());
    }

    #[test]
    fn scenario_parses_from_toml() {
        let text = r#"
            hooks = ["texinfo-install"]

            [[databases]]
            name = "core"
            size = 2048

            [plan]
            total_download = 10

            [[plan.additions]]
            repo = "core"
            name = "zstd"
            version = "1.5.6-1"
            download_size = 10

            [[questions]]
            stage = "prepare"
            question = { kind = "install_ignored", package = "linux" }
        "#;
        let s: Scenario = toml::from_str(text).unwrap();
        assert_eq!(s.databases[0].outcome, ScriptedSync::Updated);
        assert_eq!(s.plan.additions[0].name, "zstd");
        assert_eq!(s.questions[0].question.kind(), QuestionKind::InstallIgnored);
    }
}
