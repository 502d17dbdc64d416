//! [`Handler`] that exposes a [`Worker`] on the control channel.

use std::sync::Arc;

use pacnotify_protocol::MessageType;
use pacnotify_protocol::envelope::Message;
use pacnotify_protocol::messages::{
    AddDatabaseRequest, AnswerRequest, InitRequest, InitializeEngineRequest, MethodResult,
    SyncResponse, SynchronizeRequest,
};
use pacnotify_protocol::{ProtocolError, TransactionState};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::PeerIdentity;
use crate::connection::Sender;
use crate::error::WorkerError;
use crate::handler::{Handler, HandlerFuture};
use crate::worker::Worker;

/// Routes control messages to a [`Worker`].
///
/// Short methods reply before the next message is read. Engine-bound
/// methods are validated inline and then reply from a spawned task, so
/// `answer` and `cancel_upgrade` stay responsive while they run.
#[derive(Clone)]
pub struct WorkerHandler {
    worker: Arc<Worker>,
    shutdown: CancellationToken,
    exit_when_released: bool,
}

impl WorkerHandler {
    /// `shutdown` is cancelled on fatal authorization failures.
    pub fn new(worker: Arc<Worker>, shutdown: CancellationToken) -> Self {
        Self {
            worker,
            shutdown,
            exit_when_released: false,
        }
    }

    /// Also shut down once the session ends.
    pub fn exit_when_released(mut self, exit: bool) -> Self {
        self.exit_when_released = exit;
        self
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    async fn respond<T: Serialize>(
        &self,
        sender: &Sender,
        req: &Message,
        msg_type: MessageType,
        result: Result<T, WorkerError>,
    ) {
        match result {
            Ok(payload) => match req.reply(msg_type, Some(&payload)) {
                Ok(reply) => {
                    let _ = sender.send(reply).await;
                }
                Err(e) => error!(msg_type = ?req.msg_type, "failed to serialize reply: {e}"),
            },
            Err(err) => self.fail(sender, req, err).await,
        }
    }

    async fn respond_state(
        &self,
        sender: &Sender,
        req: &Message,
        result: Result<TransactionState, WorkerError>,
    ) {
        let result = result.map(|state| MethodResult { state });
        self.respond(sender, req, MessageType::MethodResult, result)
            .await;
    }

    async fn fail(&self, sender: &Sender, req: &Message, err: WorkerError) {
        match &err {
            WorkerError::InvalidState { .. } | WorkerError::NoSession | WorkerError::NoQuestion => {
                warn!(msg_type = ?req.msg_type, "{err}")
            }
            _ => error!(msg_type = ?req.msg_type, details = %err.details(), "{err}"),
        }
        let _ = sender
            .send(req.reply_error(err.code(), err.summary(), err.details()))
            .await;

        if err.is_fatal() {
            error!("authorization failed, shutting down");
            self.shutdown.cancel();
        }
    }

    /// Ends the worker after the session, if configured to.
    fn session_ended(&self) {
        if self.exit_when_released {
            info!("session ended, shutting down");
            self.shutdown.cancel();
        }
    }
}

fn parse<T: DeserializeOwned>(msg: &Message) -> Result<T, WorkerError> {
    msg.require_payload()
        .map_err(|e: ProtocolError| WorkerError::BadRequest(e.to_string()))
}

async fn blocking<T, F>(f: F) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WorkerError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkerError::Task(e.to_string()))?
}

impl Handler for WorkerHandler {
    fn on_init(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = parse::<InitRequest>(&msg).and_then(|req| {
                self.worker
                    .init(sender.peer(), req.mode, Arc::new(sender.clone()))
            });
            self.respond_state(&sender, &msg, result).await;
        })
    }

    fn on_initialize_engine(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = match parse::<InitializeEngineRequest>(&msg) {
                Ok(req) => {
                    let worker = Arc::clone(&self.worker);
                    let peer = sender.peer();
                    blocking(move || worker.initialize_engine(peer, &req.options)).await
                }
                Err(err) => Err(err),
            };
            self.respond_state(&sender, &msg, result).await;
        })
    }

    fn on_add_database(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = match parse::<AddDatabaseRequest>(&msg) {
                Ok(req) => {
                    let worker = Arc::clone(&self.worker);
                    let peer = sender.peer();
                    blocking(move || worker.add_database(peer, &req)).await
                }
                Err(err) => Err(err),
            };
            self.respond_state(&sender, &msg, result).await;
        })
    }

    fn on_synchronize(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let force = match msg.parse_payload::<SynchronizeRequest>() {
                Ok(req) => req.unwrap_or_default().force,
                Err(e) => {
                    self.fail(&sender, &msg, WorkerError::BadRequest(e.to_string()))
                        .await;
                    return;
                }
            };
            let pending = match self.worker.synchronize(sender.peer(), force) {
                Ok(pending) => pending,
                Err(err) => return self.fail(&sender, &msg, err).await,
            };

            let this = self.clone();
            tokio::spawn(async move {
                let result = pending.await.map(|results| SyncResponse {
                    state: TransactionState::SyncDone,
                    results,
                });
                this.respond(&sender, &msg, MessageType::SyncResult, result)
                    .await;
            });
        })
    }

    fn on_compute_package_list(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let pending = match self.worker.compute_package_list(sender.peer()) {
                Ok(pending) => pending,
                Err(err) => return self.fail(&sender, &msg, err).await,
            };

            let this = self.clone();
            tokio::spawn(async move {
                let result = pending.await;
                this.respond(&sender, &msg, MessageType::PackageList, result)
                    .await;
            });
        })
    }

    fn on_perform_upgrade(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let pending = match self.worker.perform_upgrade(sender.peer()) {
                Ok(pending) => pending,
                Err(err) => return self.fail(&sender, &msg, err).await,
            };

            let this = self.clone();
            tokio::spawn(async move {
                let result = pending.await;
                this.respond_state(&sender, &msg, result).await;
            });
        })
    }

    fn on_cancel_upgrade(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = self.worker.cancel_upgrade(sender.peer());
            self.respond_state(&sender, &msg, result).await;
        })
    }

    fn on_decline_upgrade(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let worker = Arc::clone(&self.worker);
            let peer = sender.peer();
            let result = blocking(move || worker.decline_upgrade(peer)).await;
            self.respond_state(&sender, &msg, result).await;
        })
    }

    fn on_release_engine(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let worker = Arc::clone(&self.worker);
            let peer = sender.peer();
            let result = blocking(move || worker.release_engine(peer)).await;
            let released = !matches!(
                result,
                Err(WorkerError::InvalidState { .. } | WorkerError::NoSession)
            );
            self.respond_state(&sender, &msg, result).await;
            if released {
                self.session_ended();
            }
        })
    }

    fn on_answer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = parse::<AnswerRequest>(&msg)
                .and_then(|req| self.worker.answer(sender.peer(), req.answer))
                .map(|()| self.worker.state());
            self.respond_state(&sender, &msg, result).await;
        })
    }

    fn on_client_disconnected(&self, peer: PeerIdentity) -> HandlerFuture<'_> {
        Box::pin(async move {
            let owned = self.worker.session_owner() == Some(peer);
            let worker = Arc::clone(&self.worker);
            if let Err(e) = tokio::task::spawn_blocking(move || worker.client_gone(peer)).await {
                error!("session cleanup failed: {e}");
            }
            if owned {
                self.session_ended();
            }
        })
    }
}
