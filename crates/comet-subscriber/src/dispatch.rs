//! Routing updates to the subscribers of a path.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::registry::SubscriberHandle;
use crate::state::Shared;
use crate::types::DispatchError;

#[derive(Clone)]
pub(crate) struct UpdateDispatcher {
    shared: Arc<Shared>,
}

impl UpdateDispatcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Invoke every subscriber of `path`, head to tail.
    ///
    /// The subscriber list is copied before any callback runs, so callbacks may
    /// connect or disconnect freely; those changes apply from the next update.
    /// Every subscriber is invoked even if an earlier one fails.
    pub(crate) fn dispatch(&self, path: &str, message: &serde_json::Value) -> Vec<DispatchError> {
        let handles: Vec<SubscriberHandle> = match self.shared.lock().registry.get(path) {
            Some(subscription) => subscription.iter().cloned().collect(),
            None => {
                tracing::trace!(path, "no subscribers, dropping update");
                return Vec::new();
            }
        };

        let mut failures = Vec::new();
        for handle in &handles {
            match catch_unwind(AssertUnwindSafe(|| handle.invoke(path, message))) {
                Ok(Ok(())) => {}
                Ok(Err(source)) => failures.push(DispatchError::Subscriber {
                    path: path.to_string(),
                    source,
                }),
                Err(_) => failures.push(DispatchError::Panicked {
                    path: path.to_string(),
                }),
            }
        }
        tracing::trace!(path, subscribers = handles.len(), "update dispatched");
        failures
    }
}
