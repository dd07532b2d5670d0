//! State shared between the application, the poll loop and the dispatcher.
//!
//! Registry and session live behind one lock. Identity changes and path
//! creation/removal both happen under it, and the matching sync request is
//! queued before it is released, so a path attached while a new identity
//! arrives is announced exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::EventSink;
use crate::registry::{Action, Attach, Detach, SubscriptionRegistry, Target};
use crate::session::{IdentityChange, SessionState};
use crate::sync::ConnectionSync;

#[derive(Default)]
pub(crate) struct Core {
    pub registry: SubscriptionRegistry,
    pub session: SessionState,
}

pub(crate) struct Shared {
    core: Mutex<Core>,
    pub sync: ConnectionSync,
    pub events: EventSink,
}

impl Shared {
    pub(crate) fn new(sync: ConnectionSync, events: EventSink) -> Self {
        Self {
            core: Mutex::new(Core::default()),
            sync,
            events,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn connect(&self, path: &str, target: &Arc<dyn Target>, action: &Action) -> Attach {
        let mut core = self.lock();
        let attach = core.registry.connect(path, target, action);
        if attach == Attach::PathCreated && core.session.is_active() {
            tracing::debug!(path, "path attached during session");
            self.sync.notify_attached(core.session.identity(), path);
        }
        attach
    }

    pub(crate) fn disconnect(
        &self,
        path: &str,
        target: &Arc<dyn Target>,
        action: &Action,
    ) -> Detach {
        let mut core = self.lock();
        let detach = core.registry.disconnect(path, target, action);
        if detach == Detach::PathRemoved && core.session.is_active() {
            tracing::debug!(path, "path detached during session");
            self.sync.notify_detached(core.session.identity(), path);
        }
        detach
    }

    /// Store a new continuation token, resynchronizing on a new identity.
    pub(crate) fn apply_token(&self, token: String) -> IdentityChange {
        let mut core = self.lock();
        let change = core.session.advance(token);
        if let IdentityChange::Started(identity) = &change {
            self.sync.resynchronize(identity, core.registry.paths());
        }
        change
    }
}
