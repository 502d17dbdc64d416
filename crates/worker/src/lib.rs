//! Privileged upgrade worker.
//!
//! Accepts a single client over a WebSocket on a Unix domain socket,
//! authorizes it through an [`Authority`], and drives the package engine
//! through a strict call-ordering state machine ([`Worker`]).
//!
//! Engine callbacks are forwarded to the client as `event` messages.
//! Engine questions are forwarded as `question` messages while the engine
//! thread waits for the matching `answer`.

mod auth;
mod callbacks;
mod commit;
mod connection;
mod error;
mod handler;
mod questions;
mod server;
mod servers;
mod service;
mod session;
mod worker;

pub use auth::{ActionGrant, AuthError, Authority, PeerAuthority, PeerIdentity};
pub use callbacks::{EventSink, Outbound, WorkerCallbacks};
pub use connection::{ClientConnection, SendError, Sender};
pub use error::WorkerError;
pub use handler::{Handler, HandlerFuture};
pub use questions::QuestionSlot;
pub use server::{ServerConfig, WorkerServer};
pub use servers::substitute_server;
pub use service::WorkerHandler;
pub use worker::{Pending, Worker};

/// Send buffer capacity.
///
/// A commit produces several progress events per package. Engine threads
/// block when the buffer is full, so the size only bounds memory.
pub const SEND_BUFFER_SIZE: usize = 1024;

/// Errors produced by the worker server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a client is already connected")]
    ClientAlreadyConnected,
}
