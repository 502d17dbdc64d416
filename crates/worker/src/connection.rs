//! Client connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use pacnotify_protocol::constants::{
    ERR_CODE_NOT_IMPLEMENTED, MessageType, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};
use pacnotify_protocol::envelope::Message;
use pacnotify_protocol::{Question, WorkerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::auth::PeerIdentity;
use crate::callbacks::EventSink;
use crate::error::WorkerError;
use crate::handler::Handler;

/// Handle for sending messages to the connected client.
///
/// Cloneable and cheap, wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
    peer: PeerIdentity,
}

impl Sender {
    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` if the buffer is full or the channel is closed.
    pub fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!("send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Sends a protocol [`Message`], waiting for buffer space.
    ///
    /// Used for replies that follow a burst of engine events.
    pub async fn send(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|_| SendError)
    }

    /// Blocking variant of [`Sender::send`].
    ///
    /// Only for engine threads; panics inside an async context.
    pub fn send_msg_blocking(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx
            .blocking_send(WsMessage::Text(json.into()))
            .map_err(|_| SendError)
    }

    /// Sends the error response of a failed worker method.
    pub fn send_error(&self, req: &Message, err: &WorkerError) -> Result<(), SendError> {
        self.send_msg(req.reply_error(err.code(), err.summary(), err.details()))
    }

    /// Identity of the peer, from the socket credentials.
    pub fn peer(&self) -> PeerIdentity {
        self.peer
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn push<T: serde::Serialize>(&self, msg_type: MessageType, payload: &T) -> Result<(), SendError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(id, msg_type, Some(payload)).map_err(|_| SendError)?;
        self.send_msg_blocking(msg)
    }
}

impl EventSink for Sender {
    fn emit(&self, event: WorkerEvent) {
        if self.push(MessageType::Event, &event).is_err() {
            tracing::debug!("client gone, dropping event");
        }
    }

    fn ask(&self, question: &Question) -> bool {
        self.push(MessageType::Question, question).is_ok()
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Active connection to a client.
///
/// Owns the read/write pump tasks and provides a [`Sender`] for
/// asynchronous message delivery.
pub struct ClientConnection {
    pub peer: PeerIdentity,
    sender: Sender,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl ClientConnection {
    /// Returns a cloneable [`Sender`] for this connection.
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Returns `true` until the pumps start shutting down.
    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Signals the pumps to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Signals shutdown and waits until the disconnect hook has run.
    pub async fn close_and_wait(&self) {
        self.cancel.cancel();
        self.finished.cancelled().await;
    }
}

/// Runs the read and write pumps for a WebSocket connection.
///
/// Returns the [`ClientConnection`] handle. The pumps run as background
/// tokio tasks and stop when the connection is closed or the cancel
/// token is triggered.
pub fn spawn_connection<S, H>(
    ws_stream: S,
    peer: PeerIdentity,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> ClientConnection
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let finished = CancellationToken::new();
    let sender = Sender { tx, peer };

    let conn = ClientConnection {
        peer,
        sender: sender.clone(),
        cancel: cancel.clone(),
        finished: finished.clone(),
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    // Write pump.
    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    // Read pump.
    let read_cancel = cancel.clone();
    tokio::spawn(async move {
        read_pump(ws_stream, sender, Arc::clone(&handler), read_cancel.clone()).await;
        // When read pump exits, cancel the write pump too.
        read_cancel.cancel();
        handler.on_client_disconnected(peer).await;
        tracing::info!(uid = peer.uid, pid = ?peer.pid, "client disconnected");
        finished.cancel();
    });

    conn
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Unblock engine threads waiting for buffer space, then flush what is
    // already queued (a final error reply, for instance).
    rx.close();
    while let Ok(ws_msg) = rx.try_recv() {
        if sink.send(ws_msg).await.is_err() {
            break;
        }
    }
    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and dispatches to the handler.
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let mut pong_deadline = tokio::time::interval(WS_PONG_WAIT);
    pong_deadline.reset();
    let mut got_pong = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = pong_deadline.tick() => {
                if !got_pong {
                    tracing::warn!("pong timeout, closing connection");
                    break;
                }
                got_pong = false;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        match ws_msg {
                            WsMessage::Text(text) => {
                                if text.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!("message exceeds max size ({} > {})", text.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                dispatch_text(&handler, &sender, &text).await;
                            }
                            WsMessage::Binary(_) => {
                                tracing::warn!("ignoring binary frame");
                            }
                            WsMessage::Pong(_) => {
                                got_pong = true;
                                pong_deadline.reset();
                            }
                            WsMessage::Ping(data) => {
                                // Auto-respond to pings from the client.
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Close(_) => {
                                tracing::info!("received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {} // Raw frames ignored.
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("read pump error: {e}");
                        break;
                    }
                    None => break, // Stream ended.
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the appropriate handler method.
async fn dispatch_text<H: Handler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("invalid message JSON: {e}");
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::Ping => handler.on_ping(s, msg).await,
        MessageType::Init => handler.on_init(s, msg).await,
        MessageType::InitializeEngine => handler.on_initialize_engine(s, msg).await,
        MessageType::AddDatabase => handler.on_add_database(s, msg).await,
        MessageType::SynchronizeDatabases => handler.on_synchronize(s, msg).await,
        MessageType::ComputePackageList => handler.on_compute_package_list(s, msg).await,
        MessageType::PerformUpgrade => handler.on_perform_upgrade(s, msg).await,
        MessageType::CancelUpgrade => handler.on_cancel_upgrade(s, msg).await,
        MessageType::DeclineUpgrade => handler.on_decline_upgrade(s, msg).await,
        MessageType::ReleaseEngine => handler.on_release_engine(s, msg).await,
        MessageType::Answer => handler.on_answer(s, msg).await,
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender.send_msg(msg.reply_error(
                ERR_CODE_NOT_IMPLEMENTED,
                "unknown message type",
                String::new(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> (Sender, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(4);
        let peer = PeerIdentity {
            uid: 1000,
            gid: 1000,
            pid: None,
        };
        (Sender { tx, peer }, rx)
    }

    fn text(msg: WsMessage) -> Message {
        match msg {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn sender_error_display() {
        let err = SendError;
        assert!(err.to_string().contains("buffer full"));
    }

    #[test]
    fn worker_errors_keep_summary_and_details_apart() {
        let (sender, mut rx) = sender();
        let req = Message::new("req-1", MessageType::PerformUpgrade, Option::<&()>::None).unwrap();
        let err = WorkerError::InvalidState {
            method: "perform_upgrade",
            state: pacnotify_protocol::TransactionState::Init,
        };
        sender.send_error(&req, &err).unwrap();

        let reply = text(rx.try_recv().unwrap());
        assert_eq!(reply.id, "req-1");
        assert_eq!(reply.msg_type, MessageType::Error);
        let wire = reply.error.unwrap();
        assert_eq!(wire.code, 409);
        assert_eq!(wire.message, "invalid state");
        assert!(wire.details.contains("perform_upgrade"));
    }

    #[test]
    fn events_and_questions_get_fresh_ids() {
        let (sender, mut rx) = sender();
        sender.emit(WorkerEvent::TotalDownload { total: 10 });
        assert!(sender.ask(&Question::InstallIgnored {
            package: "linux".into()
        }));

        let event = text(rx.try_recv().unwrap());
        let question = text(rx.try_recv().unwrap());
        assert_eq!(event.msg_type, MessageType::Event);
        assert_eq!(question.msg_type, MessageType::Question);
        assert_ne!(event.id, question.id);
        assert_eq!(
            event.require_payload::<WorkerEvent>().unwrap(),
            WorkerEvent::TotalDownload { total: 10 }
        );
    }

    #[test]
    fn closed_channel_cannot_ask() {
        let (sender, rx) = sender();
        drop(rx);
        assert!(!sender.is_connected());
        assert!(!sender.ask(&Question::InstallIgnored {
            package: "linux".into()
        }));
    }
}
