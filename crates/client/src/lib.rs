//! Unprivileged side of the upgrade protocol.
//!
//! [`WsClient`] talks to the worker over its Unix socket, [`WorkerProxy`]
//! wraps each worker call, and [`Orchestrator`] drives a complete upgrade,
//! answering the worker's questions through an [`UpgradeUi`].

pub mod commands;
pub mod error;
pub mod index;
pub mod options;
pub mod orchestrator;
pub mod pacnew;
pub mod proxy;
mod pumps;
pub mod ui;
pub mod ws_client;

pub use error::ClientError;
pub use index::PackageIndex;
pub use options::{PostUpgrade, Repository, UpgradeOptions};
pub use orchestrator::{Orchestrator, UpgradeOutcome, UpgradeReport};
pub use proxy::WorkerProxy;
pub use ui::{UiFuture, Unattended, UpgradeDecision, UpgradeUi};
pub use ws_client::WsClient;
