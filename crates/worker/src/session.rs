use std::sync::Arc;

use pacnotify_engine::{EngineError, PackageEngine};
use pacnotify_protocol::InitMode;

use crate::auth::PeerIdentity;
use crate::callbacks::EventSink;

/// The one authorized client binding.
pub(crate) struct Session {
    /// Distinguishes this session from a later one.
    pub id: u64,
    pub owner: PeerIdentity,
    pub mode: InitMode,
    /// Policy action that was granted at `init`.
    pub action: &'static str,
    pub sink: Arc<dyn EventSink>,
    /// `None` before `initialize_engine` and while an operation holds it.
    pub engine: Option<Box<dyn PackageEngine>>,
    pub arch: Option<String>,
}

impl Session {
    pub fn is_owned_by(&self, caller: &PeerIdentity) -> bool {
        self.owner == *caller
    }
}

/// Releases an open transaction, then the engine itself.
pub(crate) fn shutdown_engine(mut engine: Box<dyn PackageEngine>) -> Result<(), EngineError> {
    if engine.has_transaction() {
        engine.release_transaction()?;
    }
    engine.release()
}
