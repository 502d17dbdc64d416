use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pacnotify_engine::{EngineError, PackageEngine, TransactionInterrupt};
use tracing::{debug, error, info, warn};

/// Delivers at most one interrupt to a running commit.
pub(crate) struct Interrupter {
    handle: Arc<dyn TransactionInterrupt>,
    interrupting: AtomicBool,
}

impl Interrupter {
    pub(crate) fn new(handle: Arc<dyn TransactionInterrupt>) -> Self {
        Self {
            handle,
            interrupting: AtomicBool::new(false),
        }
    }

    /// Returns `Ok(true)` if this call delivered the interrupt and
    /// `Ok(false)` if one was already being processed.
    pub(crate) fn interrupt(&self) -> Result<bool, EngineError> {
        if self.interrupting.swap(true, Ordering::SeqCst) {
            debug!("interrupt already in progress");
            return Ok(false);
        }
        if let Err(err) = self.handle.interrupt() {
            // Let the caller try again.
            self.interrupting.store(false, Ordering::SeqCst);
            return Err(err);
        }
        info!("interrupt delivered to running commit");
        Ok(true)
    }
}

/// Result of a commit followed by the release of its transaction.
pub(crate) struct CommitOutcome {
    pub commit: Result<(), EngineError>,
    pub release: Result<(), EngineError>,
}

/// Commits the prepared transaction and releases it whatever the result.
///
/// Runs on the dedicated commit thread.
pub(crate) fn run_commit(engine: &mut dyn PackageEngine) -> CommitOutcome {
    info!("starting commit");
    let commit = engine.commit();
    match &commit {
        Ok(()) => info!("commit finished"),
        Err(EngineError::Interrupted) => warn!("commit interrupted"),
        Err(err) => error!(error = %err, details = %err.details(), "commit failed"),
    }

    let release = if engine.has_transaction() {
        engine.release_transaction()
    } else {
        Ok(())
    };
    if let Err(err) = &release {
        error!(error = %err, "failed to release transaction after commit");
    }
    CommitOutcome { commit, release }
}
