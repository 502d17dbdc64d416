use pacnotify_engine::EngineError;
use pacnotify_protocol::constants::{
    ERR_CODE_BAD_REQUEST, ERR_CODE_ENGINE, ERR_CODE_INVALID_STATE, ERR_CODE_NO_QUESTION,
    ERR_CODE_NO_SESSION, ERR_CODE_UNAUTHORIZED,
};
use pacnotify_protocol::{QuestionKind, TransactionState};

use crate::auth::AuthError;

/// Failure of a worker method.
///
/// Every variant maps to a wire error with a short summary and a detailed
/// message.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("invalid state: {method} is not allowed in state {state}")]
    InvalidState {
        method: &'static str,
        state: TransactionState,
    },

    #[error("no session")]
    NoSession,

    #[error("not authorized for {action}")]
    Unauthorized { action: &'static str },

    #[error("authorization failed: {0}")]
    Authorization(#[from] AuthError),

    #[error("no question is pending")]
    NoQuestion,

    #[error("answer does not fit a {0} question")]
    AnswerMismatch(QuestionKind),

    #[error("invalid server for {database}: {message}")]
    InvalidServer { database: String, message: String },

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("engine task failed: {0}")]
    Task(String),
}

impl WorkerError {
    /// Wire error code.
    pub fn code(&self) -> i32 {
        match self {
            WorkerError::InvalidState { .. } => ERR_CODE_INVALID_STATE,
            WorkerError::NoSession => ERR_CODE_NO_SESSION,
            WorkerError::Unauthorized { .. } | WorkerError::Authorization(_) => {
                ERR_CODE_UNAUTHORIZED
            }
            WorkerError::NoQuestion => ERR_CODE_NO_QUESTION,
            WorkerError::AnswerMismatch(_)
            | WorkerError::InvalidServer { .. }
            | WorkerError::BadRequest(_) => ERR_CODE_BAD_REQUEST,
            WorkerError::Engine(_) | WorkerError::Task(_) => ERR_CODE_ENGINE,
        }
    }

    /// Short text shown as the headline of the failure.
    pub fn summary(&self) -> String {
        match self {
            WorkerError::InvalidState { .. } => "invalid state".into(),
            WorkerError::Unauthorized { .. } | WorkerError::Authorization(_) => {
                "not authorized".into()
            }
            WorkerError::Engine(err) => err.to_string(),
            other => other.to_string(),
        }
    }

    /// Full diagnostic text.
    pub fn details(&self) -> String {
        match self {
            WorkerError::Engine(err) => err.details(),
            WorkerError::InvalidState { .. }
            | WorkerError::Unauthorized { .. }
            | WorkerError::Authorization(_) => self.to_string(),
            _ => String::new(),
        }
    }

    /// Authorization failures shut the worker down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Unauthorized { .. } | WorkerError::Authorization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacnotify_engine::{DepModifier, Dependency, PrepareDiagnostic};

    #[test]
    fn invalid_state_summary_and_details() {
        let err = WorkerError::InvalidState {
            method: "perform_upgrade",
            state: TransactionState::SyncDone,
        };
        assert_eq!(err.code(), ERR_CODE_INVALID_STATE);
        assert_eq!(err.summary(), "invalid state");
        assert_eq!(
            err.details(),
            "invalid state: perform_upgrade is not allowed in state sync_done"
        );
    }

    #[test]
    fn engine_errors_keep_diagnostics_separate() {
        let err = WorkerError::Engine(EngineError::Prepare {
            message: "could not satisfy dependencies".into(),
            diagnostics: vec![PrepareDiagnostic::UnsatisfiedDep {
                target: "foo".into(),
                depend: Dependency {
                    name: "bar".into(),
                    modifier: DepModifier::Ge,
                    version: "1.2".into(),
                },
                causing: None,
            }],
        });
        assert_eq!(err.code(), ERR_CODE_ENGINE);
        assert_eq!(
            err.summary(),
            "failed to prepare transaction: could not satisfy dependencies"
        );
        assert_eq!(err.details(), "foo: requires bar>=1.2");
    }

    #[test]
    fn only_authorization_is_fatal() {
        assert!(WorkerError::Unauthorized {
            action: "org.pacnotify.sysupgrade"
        }
        .is_fatal());
        assert!(WorkerError::Authorization(AuthError::Other("bus down".into())).is_fatal());
        assert!(!WorkerError::NoSession.is_fatal());
        assert!(!WorkerError::NoQuestion.is_fatal());
    }
}
