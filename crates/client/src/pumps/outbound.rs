//! Outbound pump: the only task that writes to the worker socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use pacnotify_protocol::constants::WS_PING_PERIOD;

/// A frame queued for the worker.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// A serialized request envelope.
    Request(String),
    /// Reply to a ping from the worker.
    Pong(Vec<u8>),
    /// Ends the session with a normal close.
    Close,
}

/// Writes queued frames until the session ends.
///
/// The worker drops a connection it has not heard from within its read
/// deadline. While the orchestrator waits on the user (the package list,
/// a question, post-upgrade commands) nothing else is written, so a ping
/// goes out whenever the socket has been quiet for [`WS_PING_PERIOD`].
/// Any other frame restarts that timer.
pub(crate) async fn outbound_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let quiet = tokio::time::sleep(WS_PING_PERIOD);
    tokio::pin!(quiet);

    let reason = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break "client closing",
            queued = queue.recv() => match queued {
                Some(Outbound::Request(json)) => tungstenite::Message::Text(json.into()),
                Some(Outbound::Pong(data)) => tungstenite::Message::Pong(data.into()),
                Some(Outbound::Close) | None => break "session finished",
            },
            () = &mut quiet => {
                trace!("socket quiet, pinging worker");
                tungstenite::Message::Ping(Vec::<u8>::new().into())
            }
        };
        if let Err(e) = sink.send(frame).await {
            error!("WebSocket write error: {e}");
            return;
        }
        quiet
            .as_mut()
            .reset(tokio::time::Instant::now() + WS_PING_PERIOD);
    };

    debug!(reason, "closing worker connection");
    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    };
    let _ = sink.send(tungstenite::Message::Close(Some(close))).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use futures_util::sink;
    use tokio::time::Instant;

    type Frames = mpsc::Receiver<tungstenite::Message>;

    fn spawn_pump() -> (mpsc::Sender<Outbound>, Frames, CancellationToken) {
        let (frames_tx, frames_rx) = mpsc::channel::<tungstenite::Message>(16);
        let sink = Box::pin(sink::unfold(
            frames_tx,
            |tx, frame: tungstenite::Message| async move {
                let _ = tx.send(frame).await;
                Ok::<_, tungstenite::Error>(tx)
            },
        ));
        let (queue_tx, queue_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        tokio::spawn(outbound_pump(sink, queue_rx, cancel.clone()));
        (queue_tx, frames_rx, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_socket_is_pinged() {
        let (_queue, mut frames, _cancel) = spawn_pump();
        let start = Instant::now();

        let first = frames.recv().await.unwrap();
        assert!(matches!(first, tungstenite::Message::Ping(_)));
        assert!(start.elapsed() >= WS_PING_PERIOD);

        let second = frames.recv().await.unwrap();
        assert!(matches!(second, tungstenite::Message::Ping(_)));
        assert!(start.elapsed() >= WS_PING_PERIOD * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_postpone_the_next_ping() {
        let (queue, mut frames, _cancel) = spawn_pump();

        tokio::time::sleep(WS_PING_PERIOD - Duration::from_secs(1)).await;
        queue
            .send(Outbound::Request(r#"{"type":"ping"}"#.into()))
            .await
            .unwrap();
        let sent_at = Instant::now();
        assert_eq!(
            frames.recv().await.unwrap(),
            tungstenite::Message::Text(r#"{"type":"ping"}"#.into())
        );

        let next = frames.recv().await.unwrap();
        assert!(matches!(next, tungstenite::Message::Ping(_)));
        assert!(sent_at.elapsed() >= WS_PING_PERIOD);
    }

    #[tokio::test]
    async fn pongs_echo_the_payload() {
        let (queue, mut frames, _cancel) = spawn_pump();
        queue.send(Outbound::Pong(vec![1, 2, 3])).await.unwrap();
        assert_eq!(
            frames.recv().await.unwrap(),
            tungstenite::Message::Pong(vec![1u8, 2, 3].into())
        );
    }

    #[tokio::test]
    async fn close_ends_with_a_normal_close_frame() {
        let (queue, mut frames, cancel) = spawn_pump();
        queue.send(Outbound::Close).await.unwrap();

        match frames.recv().await.unwrap() {
            tungstenite::Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason.as_str(), "session finished");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        // The pump is gone and dropped its sink.
        assert!(frames.recv().await.is_none());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_closes_the_socket() {
        let (_queue, mut frames, cancel) = spawn_pump();
        cancel.cancel();
        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("pump should stop")
            .unwrap();
        assert!(matches!(frame, tungstenite::Message::Close(Some(_))));
    }
}
