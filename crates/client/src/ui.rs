//! User interface seam of the upgrade orchestrator.

use std::future::Future;
use std::pin::Pin;

use pacnotify_protocol::types::LogLevel;
use pacnotify_protocol::{Answer, ChangeTotals, PackageChange, Question, SyncResult};

/// A boxed future returned by interactive [`UpgradeUi`] methods.
pub type UiFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the user chose after seeing the package list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeDecision {
    Proceed,
    Decline,
    /// Compute the list again. Only download-only runs honor this.
    Recompute,
}

/// Receives everything the orchestrator wants to show or ask.
///
/// Notification methods default to doing nothing. The interactive methods
/// may take as long as the user needs; the worker waits. Cancelling the
/// run drops a pending interactive future.
pub trait UpgradeUi: Send + Sync {
    /// One-line description of what is happening now.
    fn status(&self, text: &str) {
        let _ = text;
    }

    /// Warnings and errors reported by the package engine.
    fn log(&self, level: LogLevel, message: &str) {
        let _ = (level, message);
    }

    fn database_synced(&self, name: &str, result: SyncResult) {
        let _ = (name, result);
    }

    /// Global progress; `percent` never decreases within a phase.
    fn progress(&self, percent: u8, text: &str) {
        let _ = (percent, text);
    }

    /// Output of an install scriptlet.
    fn scriptlet(&self, line: &str) {
        let _ = line;
    }

    /// Optional dependencies a package gained with this upgrade.
    fn optional_dependencies(&self, package: &str, optdepends: &[String]) {
        let _ = (package, optdepends);
    }

    /// Answers a question raised by the engine.
    fn ask<'a>(&'a self, question: &'a Question) -> UiFuture<'a, Answer>;

    /// Shows the computed package list.
    fn confirm_upgrade<'a>(
        &'a self,
        changes: &'a [PackageChange],
        totals: ChangeTotals,
        download_only: bool,
    ) -> UiFuture<'a, UpgradeDecision>;

    /// One confirmation for all post-upgrade commands.
    fn confirm_commands<'a>(&'a self, commands: &'a [String]) -> UiFuture<'a, bool>;
}

/// Non-interactive UI: default answers, proceeds with every upgrade and
/// runs every command. Notifications go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl UpgradeUi for Unattended {
    fn status(&self, text: &str) {
        tracing::info!("{text}");
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Debug | LogLevel::Function => tracing::debug!("{message}"),
        }
    }

    fn ask<'a>(&'a self, question: &'a Question) -> UiFuture<'a, Answer> {
        Box::pin(async move { question.default_answer() })
    }

    fn confirm_upgrade<'a>(
        &'a self,
        _changes: &'a [PackageChange],
        _totals: ChangeTotals,
        _download_only: bool,
    ) -> UiFuture<'a, UpgradeDecision> {
        Box::pin(async { UpgradeDecision::Proceed })
    }

    fn confirm_commands<'a>(&'a self, _commands: &'a [String]) -> UiFuture<'a, bool> {
        Box::pin(async { true })
    }
}
