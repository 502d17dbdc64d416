//! Worker WebSocket server.
//!
//! Listens on a Unix domain socket, upgrades each stream to WebSocket and
//! serves a single client at a time. The peer's identity comes from the
//! socket credentials.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use pacnotify_protocol::constants::{DEFAULT_SOCKET_PATH, WS_MAX_MESSAGE_SIZE};

use crate::ServerError;
use crate::auth::PeerIdentity;
use crate::connection::{self, ClientConnection};
use crate::handler::Handler;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    /// Permission bits of the socket file.
    pub socket_mode: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o666,
        }
    }
}

/// The worker WebSocket server.
///
/// Serves one client connection at a time and dispatches its messages to
/// the provided [`Handler`]. Further connections are refused while that
/// client is connected.
pub struct WorkerServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    client: Mutex<Option<ClientConnection>>,
    cancel: CancellationToken,
}

impl<H: Handler> WorkerServer<H> {
    /// Creates a new server that stops when `cancel` is triggered.
    pub fn new(config: ServerConfig, handler: Arc<H>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler,
            client: Mutex::new(None),
            cancel,
        })
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.config.socket_path
    }

    /// Returns `true` if a client is currently connected.
    pub async fn has_client(&self) -> bool {
        let lock = self.client.lock().await;
        match lock.as_ref() {
            Some(conn) => conn.is_alive(),
            None => false,
        }
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Creates the socket, replacing a stale one.
    pub fn bind(&self) -> Result<UnixListener, ServerError> {
        let path = &self.config.socket_path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(self.config.socket_mode))?;
        tracing::info!(
            path = %path.display(),
            mode = format_args!("{:o}", self.config.socket_mode),
            "worker listening"
        );
        Ok(listener)
    }

    /// Binds the socket and serves until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until cancellation, then removes
    /// the socket file.
    pub async fn serve(self: &Arc<Self>, listener: UnixListener) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    self.disconnect_client().await;
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    tracing::warn!("connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        if let Err(e) = fs::remove_file(&self.config.socket_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("failed to remove socket: {e}");
        }
        Ok(())
    }

    /// Closes the current client connection (if any) and waits for its
    /// disconnect hook.
    async fn disconnect_client(&self) {
        let conn = self.client.lock().await.take();
        if let Some(conn) = conn {
            conn.close_and_wait().await;
        }
    }

    /// Upgrades one stream to WebSocket and registers it as the client.
    async fn handle_connection(self: &Arc<Self>, stream: UnixStream) -> Result<(), ServerError> {
        let cred = stream.peer_cred()?;
        let peer = PeerIdentity {
            uid: cred.uid(),
            gid: cred.gid(),
            pid: cred.pid(),
        };

        let mut lock = self.client.lock().await;
        if lock.as_ref().is_some_and(ClientConnection::is_alive) {
            tracing::warn!(uid = peer.uid, pid = ?peer.pid, "rejecting connection: client already connected");
            return Err(ServerError::ClientAlreadyConnected);
        }
        if let Some(stale) = lock.take() {
            // Let the previous disconnect hook finish before a new session
            // can start.
            stale.close_and_wait().await;
        }

        // WebSocket upgrade with size limits matching our protocol constants.
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        tracing::info!(uid = peer.uid, gid = peer.gid, pid = ?peer.pid, "client connected");

        *lock = Some(connection::spawn_connection(
            ws_stream,
            peer,
            Arc::clone(&self.handler),
            self.cancel.clone(),
        ));
        Ok(())
    }
}
