use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default path of the worker's control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/run/pacnotify/worker.sock";

/// Time to wait for a pong response (or any incoming message).
///
/// This acts as a read deadline: if *nothing* arrives within this window
/// (no pong, no response, no push event), the connection is considered
/// dead. The peer pings every [`WS_PING_PERIOD`], so a commit that runs for
/// a long time never trips it.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Maximum message size in bytes (16 MB).
///
/// The largest message is the package list of a big transaction.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Timeout for short control requests (`init`, `answer`, `cancel_upgrade`...).
///
/// Engine-bound requests (`synchronize_databases`, `compute_package_list`,
/// `perform_upgrade`) are never timed out: they rely on the engine's own
/// transport timeouts and may wait on a human answering a question.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Policy action checked for a full system upgrade session.
pub const ACTION_SYSUPGRADE: &str = "org.pacnotify.sysupgrade";

/// Policy action checked for a download-only session.
pub const ACTION_DOWNLOAD_ONLY: &str = "org.pacnotify.downloadonly";

/// Control channel message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Requests from the client to the worker
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "initialize_engine")]
    InitializeEngine,
    #[serde(rename = "add_database")]
    AddDatabase,
    #[serde(rename = "synchronize_databases")]
    SynchronizeDatabases,
    #[serde(rename = "compute_package_list")]
    ComputePackageList,
    #[serde(rename = "perform_upgrade")]
    PerformUpgrade,
    #[serde(rename = "cancel_upgrade")]
    CancelUpgrade,
    #[serde(rename = "decline_upgrade")]
    DeclineUpgrade,
    #[serde(rename = "release_engine")]
    ReleaseEngine,
    #[serde(rename = "answer")]
    Answer,

    // Responses from the worker to the client
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "method_result")]
    MethodResult,
    #[serde(rename = "sync_result")]
    SyncResult,
    #[serde(rename = "package_list")]
    PackageList,
    #[serde(rename = "error")]
    Error,

    // Events from the worker to the client (push notifications)
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "question")]
    Question,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Returns `true` for message types the worker pushes without a request.
    pub fn is_push(&self) -> bool {
        matches!(self, MessageType::Event | MessageType::Question)
    }
}

/// Malformed or missing request payload.
pub const ERR_CODE_BAD_REQUEST: i32 = 400;
/// Authorization for the requested mode was not granted.
pub const ERR_CODE_UNAUTHORIZED: i32 = 401;
/// The call needs a session and none is bound (or the caller is not its owner).
pub const ERR_CODE_NO_SESSION: i32 = 403;
/// The call is not allowed in the current transaction state.
pub const ERR_CODE_INVALID_STATE: i32 = 409;
/// `answer` was sent while no question is outstanding.
pub const ERR_CODE_NO_QUESTION: i32 = 412;
/// The package engine reported a failure.
pub const ERR_CODE_ENGINE: i32 = 500;
/// The worker does not implement this message type.
pub const ERR_CODE_NOT_IMPLEMENTED: i32 = 501;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::ComputePackageList).unwrap(),
            "\"compute_package_list\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::MethodResult).unwrap(),
            "\"method_result\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::Question).unwrap(),
            "\"question\""
        );
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"perform_upgrade\"").unwrap();
        assert_eq!(mt, MessageType::PerformUpgrade);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"some_future_type\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }

    #[test]
    fn push_types() {
        assert!(MessageType::Event.is_push());
        assert!(MessageType::Question.is_push());
        assert!(!MessageType::MethodResult.is_push());
        assert!(!MessageType::Error.is_push());
    }
}
