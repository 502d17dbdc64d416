//! The single outstanding engine question.

use std::sync::{Mutex, MutexGuard, PoisonError};

use pacnotify_protocol::{Answer, Question, QuestionKind};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::callbacks::EventSink;
use crate::error::WorkerError;

struct PendingQuestion {
    kind: QuestionKind,
    reply: oneshot::Sender<Answer>,
}

/// Holds at most one pending question and routes the answer back to the
/// engine thread waiting on it.
#[derive(Default)]
pub struct QuestionSlot {
    pending: Mutex<Option<PendingQuestion>>,
}

impl QuestionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingQuestion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `question` through `sink` and blocks until it is answered.
    ///
    /// Must be called from an engine thread, never from async code. Returns
    /// the default answer at once if another question is pending, and when
    /// the question is abandoned or the client is gone.
    pub fn ask(&self, question: Question, sink: &dyn EventSink) -> Answer {
        let kind = question.kind();
        let default = kind.default_answer();

        let receiver = {
            let mut slot = self.slot();
            if let Some(pending) = slot.as_ref() {
                warn!(
                    pending = %pending.kind,
                    asked = %kind,
                    "question already pending, using default answer"
                );
                return default;
            }
            let (reply, receiver) = oneshot::channel();
            *slot = Some(PendingQuestion { kind, reply });
            receiver
        };

        if !sink.ask(&question) {
            debug!(%kind, "client gone, using default answer");
            self.abandon();
            return default;
        }

        match receiver.blocking_recv() {
            Ok(answer) => answer,
            Err(_) => {
                debug!(%kind, "question abandoned, using default answer");
                default
            }
        }
    }

    /// Delivers the client's answer to the waiting engine thread.
    pub fn answer(&self, answer: Answer) -> Result<QuestionKind, WorkerError> {
        let mut slot = self.slot();
        let kind = slot.as_ref().map(|p| p.kind).ok_or(WorkerError::NoQuestion)?;
        if !answer.fits(kind) {
            return Err(WorkerError::AnswerMismatch(kind));
        }
        if let Some(pending) = slot.take() {
            // The engine thread may have given up already.
            let _ = pending.reply.send(answer);
        }
        Ok(kind)
    }

    /// Drops the pending question so its waiter gets the default answer.
    pub fn abandon(&self) -> Option<QuestionKind> {
        self.slot().take().map(|pending| pending.kind)
    }

    pub fn pending(&self) -> Option<QuestionKind> {
        self.slot().as_ref().map(|p| p.kind)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::callbacks::Outbound;
    use tokio::sync::mpsc;

    fn replace() -> Question {
        Question::Replace {
            old_package: "a".into(),
            new_package: "b".into(),
            repo: "extra".into(),
        }
    }

    fn wait_pending(slot: &QuestionSlot) {
        for _ in 0..200 {
            if slot.pending().is_some() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("question never became pending");
    }

    #[test]
    fn answer_reaches_engine_thread() {
        let slot = Arc::new(QuestionSlot::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let asker = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.ask(replace(), &tx))
        };
        wait_pending(&slot);

        assert_eq!(slot.answer(Answer::Confirm(true)).unwrap(), QuestionKind::Replace);
        assert_eq!(asker.join().unwrap(), Answer::Confirm(true));
        assert!(slot.pending().is_none());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Question(_))));
    }

    #[test]
    fn second_question_gets_default_and_keeps_first() {
        let slot = Arc::new(QuestionSlot::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = {
            let slot = Arc::clone(&slot);
            let tx = tx.clone();
            thread::spawn(move || slot.ask(replace(), &tx))
        };
        wait_pending(&slot);

        let second = slot.ask(
            Question::SelectProvider {
                dependency: "sh".into(),
                providers: Vec::new(),
            },
            &tx,
        );
        assert_eq!(second, Answer::Provider(0));
        assert_eq!(slot.pending(), Some(QuestionKind::Replace));

        slot.answer(Answer::Confirm(true)).unwrap();
        assert_eq!(first.join().unwrap(), Answer::Confirm(true));
    }

    #[test]
    fn answer_without_question_fails() {
        let slot = QuestionSlot::new();
        assert!(matches!(
            slot.answer(Answer::Confirm(true)),
            Err(WorkerError::NoQuestion)
        ));
    }

    #[test]
    fn mismatched_answer_keeps_question_pending() {
        let slot = Arc::new(QuestionSlot::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let asker = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.ask(replace(), &tx))
        };
        wait_pending(&slot);

        assert!(matches!(
            slot.answer(Answer::Provider(1)),
            Err(WorkerError::AnswerMismatch(QuestionKind::Replace))
        ));
        assert_eq!(slot.pending(), Some(QuestionKind::Replace));
        slot.answer(Answer::Confirm(false)).unwrap();
        assert_eq!(asker.join().unwrap(), Answer::Confirm(false));
    }

    #[test]
    fn abandoned_question_yields_default() {
        let slot = Arc::new(QuestionSlot::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let asker = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                slot.ask(
                    Question::CorruptedPackage {
                        file: "x.pkg.tar.zst".into(),
                        reason: "bad checksum".into(),
                    },
                    &tx,
                )
            })
        };
        wait_pending(&slot);

        assert_eq!(slot.abandon(), Some(QuestionKind::CorruptedPackage));
        assert_eq!(asker.join().unwrap(), Answer::Confirm(true));
    }

    #[test]
    fn closed_sink_yields_default() {
        let slot = QuestionSlot::new();
        let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
        drop(rx);
        assert_eq!(slot.ask(replace(), &tx), Answer::Confirm(false));
        assert!(slot.pending().is_none());
    }
}
