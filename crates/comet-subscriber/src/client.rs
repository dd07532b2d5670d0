//! Public entry point: [`CometClient`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{CometConfig, Endpoints};
use crate::dispatch::UpdateDispatcher;
use crate::events::{self, Events};
use crate::poll_loop::{LoopState, RetryTimer, TransportLoop};
use crate::registry::{Action, Attach, Detach, Target};
use crate::state::Shared;
use crate::sync::{ConnectionSync, SyncWorker};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{DispatchError, Error};

/// Handle to a running comet channel.
///
/// Attach subscribers with [`connect`](CometClient::connect); the background
/// poll loop delivers updates to them until [`stop`](CometClient::stop) is
/// called or the handle is dropped.
pub struct CometClient {
    shared: Arc<Shared>,
    dispatcher: UpdateDispatcher,
    cancel: CancellationToken,
    state: watch::Receiver<LoopState>,
    tasks: Vec<JoinHandle<()>>,
}

impl CometClient {
    /// Start polling over HTTP.
    ///
    /// The background tasks run on the current tokio runtime; calling this
    /// outside one returns [`Error::Runtime`].
    pub fn start(config: CometConfig) -> Result<(Self, Events), Error> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Self::start_with_transport(config, Arc::new(transport))
    }

    /// Start polling through a custom [`Transport`].
    pub fn start_with_transport(
        config: CometConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, Events), Error> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()?;
        let endpoints = Endpoints::from_config(&config);
        let (sink, events) = events::channel(config.event_channel_capacity);
        let (sync, sync_rx) = ConnectionSync::new();
        let shared = Arc::new(Shared::new(sync, sink.clone()));
        let dispatcher = UpdateDispatcher::new(shared.clone());
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        let cancel = CancellationToken::new();

        let worker = SyncWorker {
            rx: sync_rx,
            transport: transport.clone(),
            endpoints: endpoints.clone(),
            events: sink,
        };
        let poll_loop = TransportLoop {
            shared: shared.clone(),
            transport,
            endpoints,
            dispatcher: dispatcher.clone(),
            retry_delay: config.retry_delay(),
            retry: RetryTimer::default(),
            state: state_tx,
        };
        let tasks = vec![
            runtime.spawn(worker.run(cancel.clone())),
            runtime.spawn(poll_loop.run(cancel.clone())),
        ];

        Ok((
            Self {
                shared,
                dispatcher,
                cancel,
                state: state_rx,
                tasks,
            },
            events,
        ))
    }

    /// Subscribe `action` on `target` to `path`.
    ///
    /// Connecting the same `(target, action)` twice is a no-op. The first
    /// subscriber of a path announces it to the server if a session is active.
    pub fn connect(&self, path: &str, target: &Arc<dyn Target>, action: &Action) -> Attach {
        self.shared.connect(path, target, action)
    }

    /// Remove a subscriber. Unknown paths and subscribers are ignored.
    pub fn disconnect(&self, path: &str, target: &Arc<dyn Target>, action: &Action) -> Detach {
        self.shared.disconnect(path, target, action)
    }

    /// Deliver an update to the subscribers of `path` as if it had been polled.
    pub fn dispatch(&self, path: &str, message: &serde_json::Value) -> Vec<DispatchError> {
        self.dispatcher.dispatch(path, message)
    }

    /// Current session identity, empty when there is no session.
    pub fn identity(&self) -> String {
        self.shared.lock().session.identity().to_string()
    }

    pub fn continuation_token(&self) -> String {
        self.shared.lock().session.continuation_token().to_string()
    }

    /// Paths with at least one subscriber, sorted.
    pub fn attached_paths(&self) -> Vec<String> {
        self.shared.lock().registry.paths()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.shared.lock().registry.subscriber_count(path)
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Events dropped because the [`Events`] consumer fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.shared.events.dropped()
    }

    /// Cancel the outstanding poll, any pending retry, and queued sync calls.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the background tasks to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!("background task failed: {e}");
            }
        }
    }
}

impl Drop for CometClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
