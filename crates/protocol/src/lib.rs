pub mod constants;
pub mod envelope;
pub mod error;
pub mod events;
pub mod messages;
pub mod questions;
pub mod types;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{Message, WireError};
pub use error::ProtocolError;
pub use events::{DownloadEvent, EngineEvent, ItemProgress, ProgressKind, WorkerEvent};
pub use questions::{Answer, Question, QuestionKind};
pub use types::{
    ChangeTotals, DatabaseSyncResult, EngineOptions, InitMode, PackageChange, PacnewRecord,
    SyncResult, TransactionState,
};
