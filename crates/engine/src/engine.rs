use std::sync::Arc;

use pacnotify_protocol::EngineOptions;

use crate::callbacks::EngineCallbacks;
use crate::error::EngineError;
use crate::plan::TransactionPlan;

/// Outcome of synchronizing one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    UpToDate,
}

/// Flags for [`PackageEngine::begin_transaction`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionFlags {
    /// Retrieve packages without installing them.
    pub download_only: bool,
}

/// Asks a running commit to stop.
///
/// Obtained from [`PackageEngine::interrupt_handle`] before the engine is
/// moved onto the commit thread, and callable from any thread.
pub trait TransactionInterrupt: Send + Sync {
    fn interrupt(&self) -> Result<(), EngineError>;
}

/// A live handle to the package engine.
///
/// Methods take `&mut self`: the handle belongs to exactly one operation at
/// a time and is moved between threads, never shared.
pub trait PackageEngine: Send {
    /// Registers a sync database. Servers are added separately.
    fn register_database(&mut self, name: &str, sig_level: u32) -> Result<(), EngineError>;

    /// Adds a fully substituted server URL to a registered database.
    fn add_server(&mut self, database: &str, url: &str) -> Result<(), EngineError>;

    /// Registered sync databases, in registration order.
    fn databases(&self) -> Vec<String>;

    fn sync_database(&mut self, name: &str, force: bool) -> Result<SyncOutcome, EngineError>;

    fn begin_transaction(&mut self, flags: TransactionFlags) -> Result<(), EngineError>;

    /// Adds every available upgrade to the open transaction.
    fn sysupgrade(&mut self) -> Result<(), EngineError>;

    /// Resolves the open transaction. Questions may be asked from here.
    fn prepare(&mut self) -> Result<TransactionPlan, EngineError>;

    /// Applies the prepared transaction. Questions may be asked from here.
    fn commit(&mut self) -> Result<(), EngineError>;

    fn release_transaction(&mut self) -> Result<(), EngineError>;

    fn has_transaction(&self) -> bool;

    fn interrupt_handle(&self) -> Arc<dyn TransactionInterrupt>;

    /// Shuts the engine down. Any open transaction must be released first.
    fn release(self: Box<Self>) -> Result<(), EngineError>;
}

/// Creates engines for new sessions.
pub trait EngineFactory: Send + Sync {
    /// Creates an engine with `callbacks` attached from the start.
    fn create(
        &self,
        options: &EngineOptions,
        callbacks: Arc<dyn EngineCallbacks>,
    ) -> Result<Box<dyn PackageEngine>, EngineError>;
}
