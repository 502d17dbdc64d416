use pacnotify_protocol::events::{DownloadEvent, EngineEvent, ItemProgress};
use pacnotify_protocol::types::LogLevel;
use pacnotify_protocol::{Answer, Question};

/// Hooks the engine invokes while it works.
///
/// Every method is called on the engine's own thread. `question` blocks
/// that thread until it returns; the other hooks must return promptly.
pub trait EngineCallbacks: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn download(&self, file: &str, event: DownloadEvent);

    /// Total bytes the pending commit will download.
    fn total_download(&self, total: u64);

    fn event(&self, event: EngineEvent);

    /// Asks the user something and waits for the answer.
    fn question(&self, question: Question) -> Answer;

    fn progress(&self, progress: ItemProgress);
}
