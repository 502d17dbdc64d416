use crate::diagnostics::{CommitDiagnostic, PrepareDiagnostic};

/// Errors reported by a package engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to initialize engine: {0}")]
    Init(String),

    #[error("database {name}: {message}")]
    Database { name: String, message: String },

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("a transaction is already in progress")]
    TransactionActive,

    #[error("failed to prepare transaction: {message}")]
    Prepare {
        message: String,
        diagnostics: Vec<PrepareDiagnostic>,
    },

    #[error("failed to commit transaction: {message}")]
    Commit {
        message: String,
        diagnostics: Vec<CommitDiagnostic>,
    },

    #[error("operation interrupted")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Itemized causes, one per line, or an empty string when there are none.
    pub fn details(&self) -> String {
        match self {
            EngineError::Prepare { diagnostics, .. } => diagnostics
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            EngineError::Commit { diagnostics, .. } => diagnostics
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}
