//! WebSocket read pump: routes replies and push messages.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use pacnotify_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use pacnotify_protocol::envelope::Message;

use crate::pumps::outbound::Outbound;
use crate::ws_client::PendingMap;

/// Reads messages from the WebSocket and dispatches them.
///
/// Replies go to the matching pending request, `event` and `question`
/// messages to `events` in arrival order. If nothing arrives within
/// [`WS_PONG_WAIT`] the connection is considered dead.
///
/// On exit every pending request is dropped, so callers waiting without a
/// timeout see the connection close.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: PendingMap,
    events: mpsc::UnboundedSender<Message>,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("no message from worker within {WS_PONG_WAIT:?}, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending, &events).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = outbound.send(Outbound::Pong(data.to_vec())).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {} // Binary: ignore
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    pending.lock().await.clear();
    cancel.cancel();
}

/// Handles a text message from the WebSocket.
async fn handle_text_message(
    text: &str,
    pending: &PendingMap,
    events: &mpsc::UnboundedSender<Message>,
) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(msg_type = ?msg.msg_type, id = %msg.id, "received message");

    if !msg.msg_type.is_push() {
        let tx = pending.lock().await.remove(&msg.id);
        match tx {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => warn!(msg_type = ?msg.msg_type, id = %msg.id, "reply to unknown request, dropping"),
        }
        return;
    }

    if events.send(msg).is_err() {
        debug!("event receiver gone, dropping push message");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use futures_util::stream;
    use pacnotify_protocol::MessageType;
    use pacnotify_protocol::WorkerEvent;
    use tokio::sync::{Mutex, oneshot};

    fn pending() -> PendingMap {
        Arc::new(Mutex::new(HashMap::new()))
    }

    fn text(msg: &Message) -> tungstenite::Message {
        tungstenite::Message::Text(serde_json::to_string(msg).unwrap().into())
    }

    #[tokio::test]
    async fn replies_go_to_pending_and_pushes_to_events() {
        let pending = pending();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert("req-1".into(), tx);

        let event = Message::new(
            "ev-1",
            MessageType::Event,
            Some(&WorkerEvent::TotalDownload { total: 10 }),
        )
        .unwrap();
        handle_text_message(&serde_json::to_string(&event).unwrap(), &pending, &events_tx).await;

        let reply = Message::new::<()>("req-1", MessageType::Pong, None).unwrap();
        handle_text_message(&serde_json::to_string(&reply).unwrap(), &pending, &events_tx).await;

        assert_eq!(rx.await.unwrap().msg_type, MessageType::Pong);
        assert!(pending.lock().await.is_empty());
        let pushed = events_rx.try_recv().unwrap();
        assert_eq!(pushed.id, "ev-1");
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_and_oversized_messages_are_dropped() {
        let pending = pending();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        handle_text_message("not valid json {{{", &pending, &events_tx).await;
        let huge = "x".repeat(WS_MAX_MESSAGE_SIZE + 1);
        handle_text_message(&huge, &pending, &events_tx).await;
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_end_fails_pending_requests() {
        let pending = pending();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (outbound, _queue) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert("req-1".into(), tx);

        let question = Message::new(
            "q-1",
            MessageType::Question,
            Some(&pacnotify_protocol::Question::InstallIgnored {
                package: "linux".into(),
            }),
        )
        .unwrap();
        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(text(&question))]);

        read_pump(frames, pending.clone(), events_tx, outbound, cancel.clone()).await;

        assert!(rx.await.is_err());
        assert!(cancel.is_cancelled());
        assert_eq!(events_rx.recv().await.unwrap().msg_type, MessageType::Question);
        // The sender was dropped with the pump.
        assert!(events_rx.recv().await.is_none());
    }
}
