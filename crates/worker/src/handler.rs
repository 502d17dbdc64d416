//! Handler trait for processing control messages.
//!
//! Implementors provide the worker logic while the server framework handles
//! connection management, routing and keepalive.

use std::future::Future;
use std::pin::Pin;

use pacnotify_protocol::constants::ERR_CODE_NOT_IMPLEMENTED;
use pacnotify_protocol::envelope::Message;

use crate::auth::PeerIdentity;
use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

fn not_implemented(sender: Sender, msg: Message) -> HandlerFuture<'static> {
    Box::pin(async move {
        let _ = sender.send_msg(msg.reply_error(
            ERR_CODE_NOT_IMPLEMENTED,
            "not implemented",
            String::new(),
        ));
    })
}

/// Trait for handling control messages from the client.
///
/// Each method receives:
/// - `sender`: channel to send responses and events back, carrying the
///   peer identity taken from the socket
/// - `msg`: the parsed JSON envelope
///
/// The read pump awaits each returned future before reading the next
/// message. Methods that run for long must validate, reply or spawn, and
/// return.
///
/// Default implementations reply with "not implemented".
pub trait Handler: Send + Sync + 'static {
    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) =
                msg.reply(pacnotify_protocol::MessageType::Pong, Option::<&()>::None)
            {
                let _ = sender.send_msg(reply);
            }
        })
    }

    fn on_init(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_initialize_engine(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_add_database(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_synchronize(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_compute_package_list(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_perform_upgrade(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_cancel_upgrade(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_decline_upgrade(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_release_engine(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    fn on_answer(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called when the client disconnects (cleanup hook).
    fn on_client_disconnected(&self, peer: PeerIdentity) -> HandlerFuture<'_> {
        let _ = peer;
        Box::pin(async {})
    }
}
