//! Upgrade orchestrator.
//!
//! Drives one worker session through
//! `init → initialize_engine → add_database* → synchronize_databases →
//! compute_package_list → perform_upgrade | decline_upgrade →
//! release_engine`, turning worker events into [`UpgradeUi`] calls.

use std::future::Future;
use std::sync::Arc;

use pacnotify_progress::{ProgressAccumulator, Scenario};
use pacnotify_protocol::envelope::Message;
use pacnotify_protocol::events::{EngineEvent, EngineStage, PackageOperation, Phase};
use pacnotify_protocol::types::LogLevel;
use pacnotify_protocol::{
    DatabaseSyncResult, InitMode, MessageType, PackageChange, PacnewRecord, Question,
    TransactionState, WorkerEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, CommandRun};
use crate::error::ClientError;
use crate::index::PackageIndex;
use crate::options::UpgradeOptions;
use crate::pacnew;
use crate::proxy::WorkerProxy;
use crate::ui::{UpgradeDecision, UpgradeUi};
use crate::ws_client::WsClient;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The package list was empty.
    NothingToDo,
    Declined,
    /// Packages were downloaded but not installed.
    Downloaded,
    Upgraded,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub outcome: UpgradeOutcome,
    /// Worker state after the last transaction call.
    pub state: TransactionState,
    pub sync: Vec<DatabaseSyncResult>,
    pub changes: Vec<PackageChange>,
    pub pacnew: Vec<PacnewRecord>,
    /// Post-upgrade commands that ran.
    pub commands: Vec<CommandRun>,
    /// Set when the pacnew log could not be written.
    pub pacnew_log_error: Option<String>,
}

impl UpgradeReport {
    fn new() -> Self {
        Self {
            outcome: UpgradeOutcome::NothingToDo,
            state: TransactionState::None,
            sync: Vec::new(),
            changes: Vec::new(),
            pacnew: Vec::new(),
            commands: Vec::new(),
            pacnew_log_error: None,
        }
    }
}

/// Runs one upgrade against a connected worker.
pub struct Orchestrator {
    proxy: WorkerProxy,
    events: mpsc::UnboundedReceiver<Message>,
    ui: Arc<dyn UpgradeUi>,
    options: UpgradeOptions,
    mode: InitMode,
    cancel: CancellationToken,
    index: PackageIndex,
    progress: Option<ProgressAccumulator>,
    pacnew: Vec<PacnewRecord>,
    sync_total: usize,
    sync_done: usize,
    /// Set while `perform_upgrade` is outstanding.
    upgrading: bool,
    cancel_sent: bool,
}

impl Orchestrator {
    /// Takes over `client`, including its event stream.
    pub fn new(
        mut client: WsClient,
        ui: Arc<dyn UpgradeUi>,
        options: UpgradeOptions,
        mode: InitMode,
    ) -> Result<Self, ClientError> {
        let events = client.take_events().ok_or(ClientError::Closed)?;
        Ok(Self {
            proxy: WorkerProxy::new(Arc::new(client)),
            events,
            ui,
            options,
            mode,
            cancel: CancellationToken::new(),
            index: PackageIndex::default(),
            progress: None,
            pacnew: Vec::new(),
            sync_total: 0,
            sync_done: 0,
            upgrading: false,
            cancel_sent: false,
        })
    }

    /// Cancelling the token interrupts a running upgrade, or stops the run
    /// before the next step.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the whole sequence and releases the engine.
    ///
    /// Post-upgrade work happens after the release, once the worker no
    /// longer holds the package database.
    pub async fn run(mut self) -> Result<UpgradeReport, ClientError> {
        let mut report = UpgradeReport::new();
        let result = self.transact(&mut report).await;

        match (&result, self.proxy.release_engine().await) {
            (Ok(()), Err(e)) => return Err(e),
            (Err(_), Err(e)) => debug!("release after failure: {e}"),
            (_, Ok(_)) => {}
        }
        result?;

        report.pacnew = std::mem::take(&mut self.pacnew);
        if report.outcome == UpgradeOutcome::Upgraded {
            self.after_upgrade(&mut report).await;
        }
        Ok(report)
    }

    async fn transact(&mut self, report: &mut UpgradeReport) -> Result<(), ClientError> {
        self.ui.status("Starting upgrade");
        self.proxy.init(self.mode).await?;
        self.proxy.initialize_engine(&self.options.engine).await?;
        for repo in &self.options.repositories {
            self.proxy.add_database(&repo.request()).await?;
        }
        self.check_cancelled()?;

        self.ui.status("Synchronizing package databases");
        let proxy = self.proxy.clone();
        let force = self.options.force_sync;
        report.sync = self.drive(async move { proxy.synchronize(force).await }).await?;
        self.check_cancelled()?;

        let download_only = self.mode == InitMode::DownloadOnly;
        loop {
            self.ui.status("Computing the package list");
            let proxy = self.proxy.clone();
            let list = self
                .drive(async move { proxy.compute_package_list().await })
                .await?;
            report.state = list.state;
            report.changes = list.changes.clone();

            let scenario = Scenario::select(self.mode, list.total_download);
            let mut progress = ProgressAccumulator::new(scenario);
            progress.set_total_download(list.total_download);
            progress.set_changes(&list.changes);
            self.progress = Some(progress);
            self.index = PackageIndex::new(list.changes);

            if self.index.is_empty() {
                info!("nothing to upgrade");
                self.ui.status("The system is up to date");
                report.state = self.proxy.decline_upgrade().await?;
                report.outcome = UpgradeOutcome::NothingToDo;
                return Ok(());
            }

            let totals = PackageChange::totals(self.index.changes());
            let decision = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                decision = self.ui.confirm_upgrade(self.index.changes(), totals, download_only) => {
                    Some(decision)
                }
            };
            let Some(decision) = decision else {
                return Err(ClientError::Cancelled);
            };

            match decision {
                UpgradeDecision::Recompute if download_only => {
                    debug!("recomputing package list");
                    continue;
                }
                UpgradeDecision::Proceed => break,
                UpgradeDecision::Recompute | UpgradeDecision::Decline => {
                    if decision == UpgradeDecision::Recompute {
                        warn!("recompute is only available for download-only runs, declining");
                    }
                    report.state = self.proxy.decline_upgrade().await?;
                    report.outcome = UpgradeOutcome::Declined;
                    return Ok(());
                }
            }
        }

        report.state = self.upgrade().await?;
        if let Some(progress) = self.progress.as_mut() {
            progress.finish();
            self.ui.progress(progress.percent(), "done");
        }
        report.outcome = if download_only {
            UpgradeOutcome::Downloaded
        } else {
            UpgradeOutcome::Upgraded
        };
        Ok(())
    }

    /// Runs `perform_upgrade`, sending one `cancel_upgrade` if the token
    /// fires meanwhile.
    async fn upgrade(&mut self) -> Result<TransactionState, ClientError> {
        self.ui.status(match self.mode {
            InitMode::FullUpgrade => "Upgrading the system",
            InitMode::DownloadOnly => "Downloading packages",
        });
        let proxy = self.proxy.clone();
        let call = async move { proxy.perform_upgrade().await };
        tokio::pin!(call);

        self.upgrading = true;
        let result = loop {
            tokio::select! {
                biased;
                Some(msg) = self.events.recv() => self.dispatch(msg).await,
                _ = self.cancel.cancelled(), if !self.cancel_sent => self.send_cancel().await,
                result = &mut call => break result,
            }
        };
        self.upgrading = false;
        result
    }

    /// Sends `cancel_upgrade` at most once per run.
    async fn send_cancel(&mut self) {
        if self.cancel_sent {
            return;
        }
        self.cancel_sent = true;
        info!("cancelling upgrade");
        if let Err(e) = self.proxy.cancel_upgrade().await {
            warn!("cancel_upgrade failed: {e}");
        }
    }

    /// Awaits `call` while handling the events that arrive before its reply.
    async fn drive<T, F>(&mut self, call: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        tokio::pin!(call);
        loop {
            tokio::select! {
                biased;
                Some(msg) = self.events.recv() => self.dispatch(msg).await,
                result = &mut call => return result,
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        Ok(())
    }

    async fn dispatch(&mut self, msg: Message) {
        match msg.msg_type {
            MessageType::Question => match msg.require_payload::<Question>() {
                Ok(question) => self.answer(question).await,
                Err(e) => warn!("malformed question: {e}"),
            },
            MessageType::Event => match msg.require_payload::<WorkerEvent>() {
                Ok(event) => self.on_event(event),
                Err(e) => warn!("malformed event: {e}"),
            },
            other => debug!(msg_type = ?other, "ignoring push message"),
        }
    }

    async fn answer(&mut self, question: Question) {
        info!(kind = %question.kind(), "worker asks: {}", question.prompt());
        let answer = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            answer = self.ui.ask(&question) => Some(answer),
        };
        let answer = match answer {
            Some(answer) => answer,
            // The worker withdraws the question with its default answer
            // when the upgrade is interrupted.
            None if self.upgrading && !self.cancel_sent => {
                self.send_cancel().await;
                return;
            }
            None => {
                debug!(kind = %question.kind(), "cancelled while asking, sending the default answer");
                question.default_answer()
            }
        };
        match self.proxy.answer(answer).await {
            Ok(_) => {}
            // The question was withdrawn while the user was deciding.
            Err(ClientError::Worker { code, .. })
                if code == pacnotify_protocol::constants::ERR_CODE_NO_QUESTION =>
            {
                debug!("question no longer pending");
            }
            Err(e) => warn!("failed to answer question: {e}"),
        }
    }

    fn on_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Log { level, message } => self.ui.log(level, &message),
            WorkerEvent::SyncStarted { count } => {
                self.sync_total = count;
                self.sync_done = 0;
                self.ui.progress(0, "synchronizing package databases");
            }
            WorkerEvent::SyncDbStarted { name } => {
                self.ui.status(&format!("synchronizing {name}"));
            }
            WorkerEvent::SyncDbFinished { name, result } => {
                self.sync_done += 1;
                self.ui.database_synced(&name, result);
                if self.sync_total > 0 {
                    let percent = (self.sync_done * 100 / self.sync_total).min(100) as u8;
                    self.ui.progress(percent, &name);
                }
            }
            WorkerEvent::TotalDownload { total } => {
                if let Some(progress) = self.progress.as_mut() {
                    progress.set_total_download(total);
                }
            }
            WorkerEvent::Download { file, event } => {
                // Database downloads during sync have no accumulator yet.
                if let Some(progress) = self.progress.as_mut() {
                    progress.on_download(&file, &event);
                    let percent = progress.percent();
                    let rate = progress.download_rate();
                    let text = if rate > 0.0 {
                        format!("downloading {file} ({:.1} KiB/s)", rate / 1024.0)
                    } else {
                        format!("downloading {file}")
                    };
                    self.ui.progress(percent, &text);
                }
            }
            WorkerEvent::Progress(item) => {
                if let Some(progress) = self.progress.as_mut() {
                    progress.on_progress(&item);
                    let percent = progress.percent();
                    self.ui.progress(percent, &self.index.describe(&item));
                }
            }
            WorkerEvent::Engine(event) => self.on_engine_event(event),
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Lifecycle {
                stage,
                phase: Phase::Start,
            } => self.ui.status(stage_text(stage)),
            EngineEvent::Lifecycle { .. } => {}
            EngineEvent::PackageOperation {
                operation,
                phase: Phase::Done,
                package,
                optdepends,
                ..
            } => {
                debug!(?operation, %package, "package operation done");
                if !optdepends.is_empty()
                    && matches!(
                        operation,
                        PackageOperation::Install | PackageOperation::Upgrade
                    )
                {
                    self.ui.optional_dependencies(&package, &optdepends);
                }
            }
            EngineEvent::PackageOperation { .. } => {}
            EngineEvent::HookRun {
                phase: Phase::Start,
                name,
                description,
                position,
                total,
            } => {
                let label = if description.is_empty() {
                    name
                } else {
                    description
                };
                self.ui.status(&format!("({position}/{total}) {label}"));
            }
            EngineEvent::HookRun { .. } => {}
            EngineEvent::ScriptletInfo { line } => self.ui.scriptlet(line.trim_end()),
            EngineEvent::PacnewCreated {
                package,
                old_version,
                file,
                ..
            } => {
                let record = pacnew::record(&package, &old_version, &file);
                self.ui.log(
                    LogLevel::Warning,
                    &format!("{file} installed as {}", record.path),
                );
                self.pacnew.push(record);
            }
            EngineEvent::PacsaveCreated { file, .. } => {
                self.ui
                    .log(LogLevel::Warning, &format!("{file} saved as {file}.pacsave"));
            }
            EngineEvent::DatabaseMissing { name } => {
                self.ui
                    .log(LogLevel::Warning, &format!("database file for {name} does not exist"));
            }
            EngineEvent::OptdepRemoval { package, optdep } => {
                self.ui.log(
                    LogLevel::Warning,
                    &format!("{package} optionally requires {optdep}"),
                );
            }
        }
    }

    /// Pacnew log and post-upgrade commands. Failures here are reported in
    /// `report` and never undo the upgrade.
    async fn after_upgrade(&self, report: &mut UpgradeReport) {
        if let Some(path) = &self.options.pacnew_log
            && let Err(e) = pacnew::append_log(path, &report.pacnew, chrono::Local::now())
        {
            warn!(path = %path.display(), "failed to write pacnew log: {e}");
            self.ui.log(
                LogLevel::Error,
                &format!("could not write {}: {e}", path.display()),
            );
            report.pacnew_log_error = Some(e.to_string());
        }

        let post = &self.options.post_upgrade;
        if post.commands.is_empty() {
            return;
        }
        let packages = self.index.names();
        let pacfiles = pacnew::pacfiles(&report.pacnew);
        let expanded: Vec<String> = post
            .commands
            .iter()
            .map(|c| commands::expand(c, &packages, &pacfiles))
            .collect();

        if post.confirm && !self.ui.confirm_commands(&expanded).await {
            info!("post-upgrade commands skipped");
            return;
        }
        for command in expanded {
            self.ui.status(&format!("running {command}"));
            report.commands.push(commands::run(command).await);
        }
    }
}

fn stage_text(stage: EngineStage) -> &'static str {
    match stage {
        EngineStage::CheckDeps => "checking dependencies",
        EngineStage::ResolveDeps => "resolving dependencies",
        EngineStage::InterConflicts => "looking for conflicting packages",
        EngineStage::Transaction => "processing package changes",
        EngineStage::Retrieve => "retrieving packages",
        EngineStage::Integrity => "checking package integrity",
        EngineStage::Keyring => "checking keyring",
        EngineStage::KeyDownload => "downloading required keys",
        EngineStage::LoadPackages => "loading package files",
        EngineStage::FileConflicts => "checking for file conflicts",
        EngineStage::DiskSpace => "checking available disk space",
        EngineStage::PreTransactionHooks => "running pre-transaction hooks",
        EngineStage::PostTransactionHooks => "running post-transaction hooks",
    }
}
