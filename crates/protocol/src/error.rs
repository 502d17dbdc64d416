use thiserror::Error;

use crate::constants::MessageType;

/// Errors decoding a control channel message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0:?} message carries no payload")]
    MissingPayload(MessageType),

    #[error("expected {expected:?} message, got {got:?}")]
    UnexpectedType {
        expected: MessageType,
        got: MessageType,
    },
}
