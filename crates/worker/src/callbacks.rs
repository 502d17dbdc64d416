//! Forwarding of engine callbacks to the connected client.

use std::sync::Arc;

use pacnotify_engine::EngineCallbacks;
use pacnotify_protocol::events::{DownloadEvent, EngineEvent, ItemProgress};
use pacnotify_protocol::types::LogLevel;
use pacnotify_protocol::{Answer, Question, WorkerEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::questions::QuestionSlot;

/// Destination of worker events.
///
/// Both methods are called from engine threads and may block while the
/// transport drains.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkerEvent);

    /// Publishes a question. Returns `false` if nobody can answer it.
    fn ask(&self, question: &Question) -> bool;
}

/// Something the worker pushed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(WorkerEvent),
    Question(Question),
}

impl EventSink for mpsc::UnboundedSender<Outbound> {
    fn emit(&self, event: WorkerEvent) {
        let _ = self.send(Outbound::Event(event));
    }

    fn ask(&self, question: &Question) -> bool {
        self.send(Outbound::Question(question.clone())).is_ok()
    }
}

/// [`EngineCallbacks`] for one session.
pub struct WorkerCallbacks {
    sink: Arc<dyn EventSink>,
    questions: Arc<QuestionSlot>,
}

impl WorkerCallbacks {
    pub fn new(sink: Arc<dyn EventSink>, questions: Arc<QuestionSlot>) -> Self {
        Self { sink, questions }
    }
}

impl EngineCallbacks for WorkerCallbacks {
    fn log(&self, level: LogLevel, message: &str) {
        let message = message.trim_end();
        match level {
            LogLevel::Error => error!(target: "pacnotify::engine", "{message}"),
            LogLevel::Warning => warn!(target: "pacnotify::engine", "{message}"),
            LogLevel::Debug => debug!(target: "pacnotify::engine", "{message}"),
            LogLevel::Function => trace!(target: "pacnotify::engine", "{message}"),
        }
        // Debug chatter stays in the worker's own log.
        if matches!(level, LogLevel::Error | LogLevel::Warning) {
            self.sink.emit(WorkerEvent::Log {
                level,
                message: message.to_string(),
            });
        }
    }

    fn download(&self, file: &str, event: DownloadEvent) {
        self.sink.emit(WorkerEvent::Download {
            file: file.to_string(),
            event,
        });
    }

    fn total_download(&self, total: u64) {
        self.sink.emit(WorkerEvent::TotalDownload { total });
    }

    fn event(&self, event: EngineEvent) {
        self.sink.emit(WorkerEvent::Engine(event));
    }

    fn question(&self, question: Question) -> Answer {
        self.questions.ask(question, self.sink.as_ref())
    }

    fn progress(&self, progress: ItemProgress) {
        self.sink.emit(WorkerEvent::Progress(progress));
    }
}
