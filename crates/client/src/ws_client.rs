//! WebSocket client for the worker's control socket.
//!
//! Requests are correlated with replies by UUID; `event` and `question`
//! pushes arrive on an ordered stream. A background pump keeps the
//! connection alive while the caller waits on the user.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::UnixStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pacnotify_protocol::constants::{MessageType, WS_MAX_MESSAGE_SIZE};
use pacnotify_protocol::envelope::Message;

use crate::error::ClientError;
use crate::pumps::outbound::{Outbound, outbound_pump};
use crate::pumps::read::read_pump;

pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// WebSocket client connected to the worker.
///
/// `event` and `question` messages are delivered through the receiver
/// returned by [`WsClient::take_events`], in the order the worker sent
/// them relative to replies.
pub struct WsClient {
    outbound: mpsc::Sender<Outbound>,
    pending: PendingMap,
    events: Option<mpsc::UnboundedReceiver<Message>>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Connects to the worker socket at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await?;

        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        // The host part is ignored on a Unix socket.
        let (ws_stream, _) =
            tokio_tungstenite::client_async_with_config("ws://localhost/", stream, Some(ws_config))
                .await?;
        debug!(path = %path.display(), "connected to worker");

        let (write, read) = ws_stream.split();
        let (outbound, queue) = mpsc::channel::<Outbound>(256);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(outbound_pump(write, queue, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let cancel = cancel.clone();
            let outbound = outbound.clone();
            tokio::spawn(read_pump(read, pending, events_tx, outbound, cancel))
        };

        Ok(Self {
            outbound,
            pending,
            events: Some(events_rx),
            _read_handle: read_handle,
            _write_handle: write_handle,
            cancel,
        })
    }

    /// Takes the push message receiver. Can only be called once.
    ///
    /// The receiver yields `None` once the connection is gone.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<Message>> {
        self.events.take()
    }

    /// Sends a request and waits for the reply.
    ///
    /// With `timeout` set to `None` the call waits until the worker replies
    /// or the connection closes. Error replies become
    /// [`ClientError::Worker`].
    pub async fn request<T: serde::Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
        timeout: Option<Duration>,
    ) -> Result<Message, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self.outbound.send(Outbound::Request(json)).await.is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::Closed);
        }

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(ClientError::Timeout);
                }
            },
            None => rx.await,
        };

        match result {
            Ok(mut resp) => match resp.error.take() {
                Some(err) => Err(err.into()),
                None => Ok(resp),
            },
            Err(_) => Err(ClientError::Closed),
        }
    }

    /// Returns `true` while the connection is up.
    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        let _ = self.outbound.send(Outbound::Close).await;
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacnotify_protocol::messages::MethodResult;
    use pacnotify_protocol::TransactionState;

    /// A client whose frames end up in the returned receiver.
    fn detached() -> (WsClient, mpsc::Receiver<Outbound>) {
        let (outbound, queue) = mpsc::channel(16);
        let client = WsClient {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            events: None,
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            cancel: CancellationToken::new(),
        };
        (client, queue)
    }

    fn sent(frame: Outbound) -> Message {
        match frame {
            Outbound::Request(json) => serde_json::from_str(&json).unwrap(),
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_pending_entry() {
        let (client, mut queue) = detached();
        let result = client
            .request::<()>(MessageType::Ping, None, Some(Duration::from_secs(30)))
            .await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert!(client.pending.lock().await.is_empty());
        assert_eq!(sent(queue.recv().await.unwrap()).msg_type, MessageType::Ping);
    }

    #[tokio::test]
    async fn replies_are_correlated_by_id() {
        let (client, mut queue) = detached();
        let pending = client.pending.clone();
        let worker = tokio::spawn(async move {
            let req = sent(queue.recv().await.unwrap());
            assert_eq!(req.msg_type, MessageType::ReleaseEngine);
            let reply = req
                .reply(
                    MessageType::MethodResult,
                    Some(&MethodResult {
                        state: TransactionState::None,
                    }),
                )
                .unwrap();
            let tx = pending.lock().await.remove(&req.id).unwrap();
            tx.send(reply).unwrap();
        });

        let resp = client
            .request::<()>(MessageType::ReleaseEngine, None, None)
            .await
            .unwrap();
        let result: MethodResult = resp.expect_payload(MessageType::MethodResult).unwrap();
        assert_eq!(result.state, TransactionState::None);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn error_replies_become_worker_errors() {
        let (client, mut queue) = detached();
        let pending = client.pending.clone();
        tokio::spawn(async move {
            let req = sent(queue.recv().await.unwrap());
            let reply = req.reply_error(409, "invalid state", "perform_upgrade called in state init");
            let tx = pending.lock().await.remove(&req.id).unwrap();
            let _ = tx.send(reply);
        });

        let err = client
            .request::<()>(MessageType::PerformUpgrade, None, None)
            .await
            .unwrap_err();
        match err {
            ClientError::Worker {
                code,
                summary,
                details,
            } => {
                assert_eq!(code, 409);
                assert_eq!(summary, "invalid state");
                assert!(details.contains("perform_upgrade"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_ends_the_session() {
        let (client, mut queue) = detached();
        assert!(client.is_connected());
        client.close().await;
        assert!(matches!(queue.recv().await, Some(Outbound::Close)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn dropped_pending_entry_reads_as_closed() {
        let (client, mut queue) = detached();
        let pending = client.pending.clone();
        tokio::spawn(async move {
            let _ = queue.recv().await;
            pending.lock().await.clear();
        });

        let err = client
            .request::<()>(MessageType::SynchronizeDatabases, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }
}
