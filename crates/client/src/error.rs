//! Client error types.

use pacnotify_protocol::ProtocolError;
use pacnotify_protocol::envelope::WireError;
use tokio_tungstenite::tungstenite;

/// Errors from talking to the worker or running an upgrade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("cancelled")]
    Cancelled,

    /// The worker rejected a call.
    #[error("worker error {code}: {summary}")]
    Worker {
        code: i32,
        summary: String,
        details: String,
    },
}

impl ClientError {
    /// Short text for the user.
    pub fn summary(&self) -> String {
        match self {
            ClientError::Worker { summary, .. } => summary.clone(),
            ClientError::Cancelled => "upgrade cancelled".into(),
            ClientError::Protocol(_) | ClientError::Json(_) => {
                "unexpected reply from the update worker".into()
            }
            ClientError::Ws(_) | ClientError::Io(_) | ClientError::Timeout | ClientError::Closed => {
                "lost connection to the update worker".into()
            }
        }
    }

    /// Full diagnostic text.
    pub fn details(&self) -> String {
        match self {
            ClientError::Worker { details, .. } => details.clone(),
            ClientError::Cancelled => String::new(),
            other => other.to_string(),
        }
    }

    /// Wire error code, when the worker produced the error.
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::Worker { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        ClientError::Worker {
            code: err.code,
            summary: err.message,
            details: err.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_error_keeps_summary_and_details_apart() {
        let err = ClientError::from(WireError {
            code: 500,
            message: "failed to prepare transaction".into(),
            details: "could not satisfy dependencies:\n- bash requires glibc>=2.40".into(),
        });
        assert_eq!(err.code(), Some(500));
        assert_eq!(err.summary(), "failed to prepare transaction");
        assert!(err.details().contains("glibc>=2.40"));
        assert!(!err.summary().contains("glibc"));
    }

    #[test]
    fn transport_errors_have_generic_summary() {
        let err = ClientError::Timeout;
        assert_eq!(err.to_string(), "request timed out");
        assert_eq!(err.summary(), "lost connection to the update worker");
        assert_eq!(err.details(), "request timed out");
        assert_eq!(err.code(), None);
    }
}
