//! Package engine adapter.
//!
//! The worker never talks to a package library directly. It goes through
//! the traits in this crate:
//!
//! - [`EngineFactory`] creates an engine from [`EngineOptions`] with the
//!   callbacks already attached, so no engine activity goes unobserved.
//! - [`PackageEngine`] covers database registration, per-database sync and
//!   the transaction lifecycle (begin, sysupgrade, prepare, commit, release).
//! - [`EngineCallbacks`] receives log lines, download and progress reports,
//!   lifecycle events and questions. Questions block the calling engine
//!   thread until an [`Answer`] is returned.
//! - [`TransactionInterrupt`] is a cloneable handle that asks a running
//!   commit to stop.
//!
//! With the `scripted` feature the crate also ships [`scripted`], an engine
//! that replays a declarative scenario.
//!
//! [`EngineOptions`]: pacnotify_protocol::EngineOptions
//! [`Answer`]: pacnotify_protocol::Answer

mod callbacks;
mod diagnostics;
mod engine;
mod error;
mod plan;

#[cfg(feature = "scripted")]
pub mod scripted;

pub use callbacks::EngineCallbacks;
pub use diagnostics::{CommitDiagnostic, DepModifier, Dependency, PrepareDiagnostic};
pub use engine::{
    EngineFactory, PackageEngine, SyncOutcome, TransactionFlags, TransactionInterrupt,
};
pub use error::EngineError;
pub use plan::{InstalledPackage, PlannedPackage, TransactionPlan};
