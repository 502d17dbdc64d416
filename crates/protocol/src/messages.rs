use serde::{Deserialize, Serialize};

use crate::questions::Answer;
use crate::types::{DatabaseSyncResult, EngineOptions, InitMode, PackageChange, TransactionState};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens a session in the given mode.
///
/// The caller's identity is never part of the payload; the worker takes it
/// from the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitRequest {
    pub mode: InitMode,
}

/// Creates the package engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeEngineRequest {
    pub options: EngineOptions,
}

/// Registers one sync database.
///
/// Server URLs may contain `$repo` and `$arch`; the worker substitutes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDatabaseRequest {
    pub name: String,
    pub sig_level: u32,
    #[serde(default)]
    pub servers: Vec<String>,
}

/// Synchronizes every registered database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynchronizeRequest {
    #[serde(default)]
    pub force: bool,
}

/// Answers the outstanding question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub answer: Answer,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Result of a method that only moves the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub state: TransactionState,
}

/// Result of `synchronize_databases`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub state: TransactionState,
    pub results: Vec<DatabaseSyncResult>,
}

/// Result of `compute_package_list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageListResponse {
    pub state: TransactionState,
    pub changes: Vec<PackageChange>,
    /// Engine-reported number of bytes to download.
    pub total_download: u64,
}
