//! Session and transaction state machine.
//!
//! Every method checks, in order, that the caller owns the bound session
//! and that the current [`TransactionState`] allows the call. A rejected
//! call never changes the state.
//!
//! Engine work never runs while the core lock is held, except for engine
//! creation. Long operations lease the engine out of the session, set a busy
//! state, and hand it back through `finish`. If the session ended in the
//! meantime the engine is released instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use pacnotify_engine::{
    EngineError, EngineFactory, PackageEngine, SyncOutcome, TransactionFlags, TransactionPlan,
};
use pacnotify_protocol::messages::{AddDatabaseRequest, PackageListResponse};
use pacnotify_protocol::{
    Answer, DatabaseSyncResult, EngineOptions, InitMode, SyncResult, TransactionState,
    WorkerEvent,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::auth::{Authority, PeerIdentity};
use crate::callbacks::{EventSink, WorkerCallbacks};
use crate::commit::{Interrupter, run_commit};
use crate::error::WorkerError;
use crate::questions::QuestionSlot;
use crate::servers::substitute_server;
use crate::session::{Session, shutdown_engine};

/// Boxed future of a long engine operation.
///
/// Returned after the call was validated and the worker moved to the busy
/// state, so the caller may keep processing requests while it runs.
pub type Pending<T> = Pin<Box<dyn Future<Output = Result<T, WorkerError>> + Send>>;

struct Core {
    state: TransactionState,
    session: Option<Session>,
    interrupter: Option<Arc<Interrupter>>,
    next_session: u64,
}

/// The engine and everything an operation needs while it holds it.
struct Lease {
    session: u64,
    engine: Box<dyn PackageEngine>,
    mode: InitMode,
    arch: Option<String>,
    sink: Arc<dyn EventSink>,
    prior: TransactionState,
}

/// Privileged side of the upgrade protocol.
pub struct Worker {
    factory: Arc<dyn EngineFactory>,
    authority: Arc<dyn Authority>,
    questions: Arc<QuestionSlot>,
    core: Mutex<Core>,
}

impl Worker {
    pub fn new(factory: Arc<dyn EngineFactory>, authority: Arc<dyn Authority>) -> Self {
        Self {
            factory,
            authority,
            questions: Arc::new(QuestionSlot::new()),
            core: Mutex::new(Core {
                state: TransactionState::None,
                session: None,
                interrupter: None,
                next_session: 1,
            }),
        }
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> TransactionState {
        self.core().state
    }

    /// Owner of the bound session, if any.
    pub fn session_owner(&self) -> Option<PeerIdentity> {
        self.core().session.as_ref().map(|s| s.owner)
    }

    /// Binds a session for `caller` after checking the policy action of
    /// `mode`.
    ///
    /// A refused or failed authorization is returned as a fatal error.
    pub fn init(
        &self,
        caller: PeerIdentity,
        mode: InitMode,
        sink: Arc<dyn EventSink>,
    ) -> Result<TransactionState, WorkerError> {
        let mut guard = self.core();
        let core = &mut *guard;
        if core.state != TransactionState::None || core.session.is_some() {
            return Err(WorkerError::InvalidState {
                method: "init",
                state: core.state,
            });
        }

        let action = mode.action_id();
        match self.authority.check(action, &caller) {
            Ok(true) => {}
            Ok(false) => {
                warn!(uid = caller.uid, pid = ?caller.pid, action, "authorization refused");
                return Err(WorkerError::Unauthorized { action });
            }
            Err(err) => {
                error!(uid = caller.uid, action, error = %err, "authorization check failed");
                return Err(WorkerError::Authorization(err));
            }
        }

        let id = core.next_session;
        core.next_session += 1;
        core.session = Some(Session {
            id,
            owner: caller,
            mode,
            action,
            sink,
            engine: None,
            arch: None,
        });
        core.state = TransactionState::Init;
        info!(session = id, uid = caller.uid, pid = ?caller.pid, action, "session bound");
        Ok(core.state)
    }

    /// Creates the package engine with the session's callbacks attached.
    ///
    /// Blocking; run it off the async runtime.
    pub fn initialize_engine(
        &self,
        caller: PeerIdentity,
        options: &EngineOptions,
    ) -> Result<TransactionState, WorkerError> {
        let mut guard = self.core();
        let core = &mut *guard;
        let session = owned(core.session.as_mut(), &caller)?;
        if core.state != TransactionState::Init {
            return Err(WorkerError::InvalidState {
                method: "initialize_engine",
                state: core.state,
            });
        }

        let callbacks = Arc::new(WorkerCallbacks::new(
            Arc::clone(&session.sink),
            Arc::clone(&self.questions),
        ));
        match self.factory.create(options, callbacks) {
            Ok(engine) => {
                session.engine = Some(engine);
                session.arch = options.arch.clone();
                core.state = TransactionState::InitDone;
                info!(
                    root = %options.root_dir,
                    db_path = %options.db_path,
                    arch = options.arch.as_deref().unwrap_or(""),
                    "engine initialized"
                );
                Ok(core.state)
            }
            Err(err) => {
                error!(error = %err, "failed to initialize engine");
                core.state = TransactionState::Invalid;
                Err(err.into())
            }
        }
    }

    /// Registers a sync database with its substituted server URLs.
    ///
    /// Blocking; run it off the async runtime.
    pub fn add_database(
        &self,
        caller: PeerIdentity,
        request: &AddDatabaseRequest,
    ) -> Result<TransactionState, WorkerError> {
        let mut lease = self.lease(caller, "add_database", TransactionState::AddingDb, |s, _| {
            matches!(s, TransactionState::InitDone | TransactionState::AddDbDone)
        })?;

        let servers: Result<Vec<String>, WorkerError> = request
            .servers
            .iter()
            .map(|url| substitute_server(url, &request.name, lease.arch.as_deref()))
            .collect();
        let servers = match servers {
            Ok(servers) => servers,
            Err(err) => {
                let prior = lease.prior;
                self.finish(lease.session, lease.engine, prior);
                return Err(err);
            }
        };

        let registered = lease
            .engine
            .register_database(&request.name, request.sig_level)
            .and_then(|()| {
                servers
                    .iter()
                    .try_for_each(|url| lease.engine.add_server(&request.name, url))
            });
        let state = match &registered {
            Ok(()) => {
                debug!(database = %request.name, servers = servers.len(), "database registered");
                TransactionState::AddDbDone
            }
            Err(err) => {
                error!(database = %request.name, error = %err, "failed to register database");
                TransactionState::Invalid
            }
        };
        self.finish(lease.session, lease.engine, state);
        registered.map(|()| state).map_err(Into::into)
    }

    /// Synchronizes every registered database.
    ///
    /// A failing database is reported in its result and does not stop the
    /// others.
    pub fn synchronize(
        self: &Arc<Self>,
        caller: PeerIdentity,
        force: bool,
    ) -> Result<Pending<Vec<DatabaseSyncResult>>, WorkerError> {
        let lease = self.lease(
            caller,
            "synchronize_databases",
            TransactionState::Syncing,
            |s, _| matches!(s, TransactionState::AddDbDone | TransactionState::SyncDone),
        )?;
        let session = lease.session;
        let worker = Arc::clone(self);
        Ok(Box::pin(async move {
            let task = {
                let worker = Arc::clone(&worker);
                tokio::task::spawn_blocking(move || worker.run_sync(lease, force))
            };
            task.await.map_err(|err| worker.lost(session, err.to_string()))
        }))
    }

    fn run_sync(&self, mut lease: Lease, force: bool) -> Vec<DatabaseSyncResult> {
        let names = lease.engine.databases();
        info!(count = names.len(), force, "synchronizing databases");
        lease.sink.emit(WorkerEvent::SyncStarted { count: names.len() });

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            lease
                .sink
                .emit(WorkerEvent::SyncDbStarted { name: name.clone() });
            let (result, error) = match lease.engine.sync_database(&name, force) {
                Ok(SyncOutcome::Updated) => (SyncResult::Success, String::new()),
                Ok(SyncOutcome::UpToDate) => (SyncResult::NotNeeded, String::new()),
                Err(err) => {
                    warn!(database = %name, error = %err, "database synchronization failed");
                    (SyncResult::Failure, err.to_string())
                }
            };
            lease.sink.emit(WorkerEvent::SyncDbFinished {
                name: name.clone(),
                result,
            });
            results.push(DatabaseSyncResult {
                name,
                result,
                error,
            });
        }

        self.finish(lease.session, lease.engine, TransactionState::SyncDone);
        results
    }

    /// Resolves a full system upgrade and prepares the transaction.
    ///
    /// Download-only sessions may call this again from `FetchDone`; the
    /// previous transaction is released first.
    pub fn compute_package_list(
        self: &Arc<Self>,
        caller: PeerIdentity,
    ) -> Result<Pending<PackageListResponse>, WorkerError> {
        let lease = self.lease(
            caller,
            "compute_package_list",
            TransactionState::Fetching,
            |s, mode| match s {
                TransactionState::SyncDone | TransactionState::AddDbDone => true,
                TransactionState::FetchDone => mode == InitMode::DownloadOnly,
                _ => false,
            },
        )?;
        let session = lease.session;
        let worker = Arc::clone(self);
        Ok(Box::pin(async move {
            let task = {
                let worker = Arc::clone(&worker);
                tokio::task::spawn_blocking(move || worker.run_compute(lease))
            };
            task.await
                .map_err(|err| worker.lost(session, err.to_string()))?
        }))
    }

    fn run_compute(&self, mut lease: Lease) -> Result<PackageListResponse, WorkerError> {
        let flags = TransactionFlags {
            download_only: lease.mode == InitMode::DownloadOnly,
        };
        match prepare_sysupgrade(lease.engine.as_mut(), flags) {
            Ok(plan) => {
                let changes = plan.changes();
                info!(
                    packages = changes.len(),
                    total_download = plan.total_download,
                    download_only = flags.download_only,
                    "transaction prepared"
                );
                self.finish(lease.session, lease.engine, TransactionState::FetchDone);
                Ok(PackageListResponse {
                    state: TransactionState::FetchDone,
                    changes,
                    total_download: plan.total_download,
                })
            }
            Err(err) => {
                // The transaction stays open; release_engine cleans it up.
                error!(error = %err, details = %err.details(), "failed to prepare transaction");
                self.finish(lease.session, lease.engine, TransactionState::Invalid);
                Err(err.into())
            }
        }
    }

    /// Commits the prepared transaction on a dedicated thread.
    ///
    /// A failed commit still ends in `UpgradeDone` and resolves to the
    /// commit error. Only a failed release of the transaction ends in
    /// `Invalid`.
    pub fn perform_upgrade(
        self: &Arc<Self>,
        caller: PeerIdentity,
    ) -> Result<Pending<TransactionState>, WorkerError> {
        let lease = self.lease(
            caller,
            "perform_upgrade",
            TransactionState::Upgrading,
            |s, _| s == TransactionState::FetchDone,
        )?;
        let session = lease.session;

        let (tx, rx) = oneshot::channel();
        let spawned = {
            let worker = Arc::clone(self);
            thread::Builder::new()
                .name("pacnotify-commit".into())
                .spawn(move || {
                    let _ = tx.send(worker.run_upgrade(lease));
                })
        };
        if let Err(err) = spawned {
            return Err(self.lost(session, format!("failed to spawn commit thread: {err}")));
        }

        let worker = Arc::clone(self);
        Ok(Box::pin(async move {
            rx.await
                .map_err(|_| worker.lost(session, "commit thread exited".into()))?
        }))
    }

    fn run_upgrade(&self, mut lease: Lease) -> Result<TransactionState, WorkerError> {
        let outcome = run_commit(lease.engine.as_mut());
        let state = if outcome.release.is_ok() {
            TransactionState::UpgradeDone
        } else {
            TransactionState::Invalid
        };
        self.core().interrupter = None;
        self.finish(lease.session, lease.engine, state);

        outcome.release?;
        outcome.commit?;
        Ok(state)
    }

    /// Asks the running commit to stop.
    ///
    /// Repeated calls while the interrupt is processed are accepted and
    /// deliver nothing. A pending question gets its default answer.
    pub fn cancel_upgrade(&self, caller: PeerIdentity) -> Result<TransactionState, WorkerError> {
        let interrupter = {
            let mut guard = self.core();
            let core = &mut *guard;
            owned(core.session.as_mut(), &caller)?;
            if core.state != TransactionState::Upgrading {
                return Err(WorkerError::InvalidState {
                    method: "cancel_upgrade",
                    state: core.state,
                });
            }
            core.interrupter.clone()
        };

        if let Some(kind) = self.questions.abandon() {
            info!(%kind, "pending question abandoned by cancel");
        }
        if let Some(interrupter) = interrupter {
            interrupter.interrupt()?;
        }
        Ok(TransactionState::Upgrading)
    }

    /// Drops the prepared transaction without committing it.
    ///
    /// Blocking; run it off the async runtime.
    pub fn decline_upgrade(&self, caller: PeerIdentity) -> Result<TransactionState, WorkerError> {
        let mut lease = self.lease(
            caller,
            "decline_upgrade",
            TransactionState::FetchDone,
            |s, _| s == TransactionState::FetchDone,
        )?;
        let released = if lease.engine.has_transaction() {
            lease.engine.release_transaction()
        } else {
            Ok(())
        };
        let state = match &released {
            Ok(()) => {
                info!("upgrade declined");
                TransactionState::UpgradeDone
            }
            Err(err) => {
                error!(error = %err, "failed to release declined transaction");
                TransactionState::Invalid
            }
        };
        self.finish(lease.session, lease.engine, state);
        released.map(|()| state).map_err(Into::into)
    }

    /// Ends the session, releasing any open transaction and the engine.
    ///
    /// Blocking; run it off the async runtime.
    pub fn release_engine(&self, caller: PeerIdentity) -> Result<TransactionState, WorkerError> {
        let session = {
            let mut guard = self.core();
            let core = &mut *guard;
            owned(core.session.as_mut(), &caller)?;
            if core.state.is_busy() {
                return Err(WorkerError::InvalidState {
                    method: "release_engine",
                    state: core.state,
                });
            }
            core.state = TransactionState::None;
            core.interrupter = None;
            core.session.take()
        };
        self.questions.abandon();

        let Some(session) = session else {
            return Ok(TransactionState::None);
        };
        info!(session = session.id, action = session.action, "releasing engine");
        if let Some(engine) = session.engine {
            shutdown_engine(engine)?;
        }
        Ok(TransactionState::None)
    }

    /// Routes the client's answer to the engine thread waiting on it.
    pub fn answer(&self, caller: PeerIdentity, answer: Answer) -> Result<(), WorkerError> {
        {
            let mut guard = self.core();
            owned(guard.session.as_mut(), &caller)?;
        }
        let kind = self.questions.answer(answer)?;
        debug!(%kind, ?answer, "question answered");
        Ok(())
    }

    /// Ends the session of a client whose connection closed.
    ///
    /// A running commit is interrupted; the engine is released once the
    /// operation holding it finishes. Blocking; run it off the async runtime.
    pub fn client_gone(&self, peer: PeerIdentity) {
        let (session, interrupter) = {
            let mut guard = self.core();
            let core = &mut *guard;
            if !core.session.as_ref().is_some_and(|s| s.is_owned_by(&peer)) {
                return;
            }
            let session = core.session.take();
            if !core.state.is_busy() {
                core.state = TransactionState::None;
            }
            (session, core.interrupter.clone())
        };
        self.questions.abandon();

        let Some(session) = session else { return };
        info!(session = session.id, uid = peer.uid, "client disconnected, ending session");
        if let Some(interrupter) = interrupter
            && let Err(err) = interrupter.interrupt()
        {
            warn!(error = %err, "failed to interrupt commit of departed client");
        }
        if let Some(engine) = session.engine
            && let Err(err) = shutdown_engine(engine)
        {
            error!(error = %err, "failed to release engine");
        }
    }

    fn lease(
        &self,
        caller: PeerIdentity,
        method: &'static str,
        busy: TransactionState,
        allowed: impl FnOnce(TransactionState, InitMode) -> bool,
    ) -> Result<Lease, WorkerError> {
        let mut guard = self.core();
        let core = &mut *guard;
        let session = owned(core.session.as_mut(), &caller)?;
        let invalid = WorkerError::InvalidState {
            method,
            state: core.state,
        };
        if !allowed(core.state, session.mode) {
            return Err(invalid);
        }
        let Some(engine) = session.engine.take() else {
            return Err(invalid);
        };

        let lease = Lease {
            session: session.id,
            engine,
            mode: session.mode,
            arch: session.arch.clone(),
            sink: Arc::clone(&session.sink),
            prior: core.state,
        };
        // A cancel must find the interrupter as soon as it sees `Upgrading`.
        if busy == TransactionState::Upgrading {
            core.interrupter = Some(Arc::new(Interrupter::new(lease.engine.interrupt_handle())));
        }
        core.state = busy;
        Ok(lease)
    }

    /// Hands a leased engine back to its session and moves to `state`.
    fn finish(&self, session: u64, engine: Box<dyn PackageEngine>, state: TransactionState) {
        let mut guard = self.core();
        let core = &mut *guard;
        if let Some(current) = core.session.as_mut()
            && current.id == session
        {
            current.engine = Some(engine);
            core.state = state;
            return;
        }

        core.state = TransactionState::None;
        core.interrupter = None;
        drop(guard);
        debug!(session, "session ended during engine operation, releasing engine");
        if let Err(err) = shutdown_engine(engine) {
            error!(error = %err, "failed to release engine");
        }
    }

    /// Records that the operation holding the engine died with it.
    fn lost(&self, session: u64, reason: String) -> WorkerError {
        error!(session, %reason, "engine operation failed");
        let mut core = self.core();
        core.interrupter = None;
        core.state = if core.session.as_ref().is_some_and(|s| s.id == session) {
            TransactionState::Invalid
        } else {
            TransactionState::None
        };
        WorkerError::Task(reason)
    }
}

fn prepare_sysupgrade(
    engine: &mut dyn PackageEngine,
    flags: TransactionFlags,
) -> Result<TransactionPlan, EngineError> {
    if engine.has_transaction() {
        debug!("releasing previous transaction");
        engine.release_transaction()?;
    }
    engine.begin_transaction(flags)?;
    engine.sysupgrade()?;
    engine.prepare()
}

fn owned<'a>(
    session: Option<&'a mut Session>,
    caller: &PeerIdentity,
) -> Result<&'a mut Session, WorkerError> {
    match session {
        Some(session) if session.is_owned_by(caller) => Ok(session),
        _ => Err(WorkerError::NoSession),
    }
}
