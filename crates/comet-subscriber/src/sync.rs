//! Announcing path interest to the server.
//!
//! Requests are queued and sent one at a time by [`SyncWorker`], so an attach
//! can never be overtaken by the detach that follows it. Failed calls are
//! logged and reported as [`Event::SyncFailed`]; they are not retried, and the
//! local registry stays the source of truth for the next resynchronization.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Endpoints;
use crate::events::EventSink;
use crate::transport::Transport;
use crate::types::{Error, Event, SyncKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyncRequest {
    pub kind: SyncKind,
    pub identity: String,
    pub paths: Vec<String>,
}

/// Front end of the connect/disconnect calls.
#[derive(Clone)]
pub struct ConnectionSync {
    tx: mpsc::UnboundedSender<SyncRequest>,
}

impl ConnectionSync {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<SyncRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Announce every attached path under a new identity.
    pub fn resynchronize(&self, identity: &str, paths: Vec<String>) {
        tracing::info!(identity, paths = paths.len(), "resynchronizing attached paths");
        self.send(SyncKind::Connect, identity, paths);
    }

    pub fn notify_attached(&self, identity: &str, path: &str) {
        self.send(SyncKind::Connect, identity, vec![path.to_string()]);
    }

    pub fn notify_detached(&self, identity: &str, path: &str) {
        self.send(SyncKind::Disconnect, identity, vec![path.to_string()]);
    }

    fn send(&self, kind: SyncKind, identity: &str, paths: Vec<String>) {
        let request = SyncRequest {
            kind,
            identity: identity.to_string(),
            paths,
        };
        if self.tx.send(request).is_err() {
            tracing::debug!(%kind, "sync worker stopped, dropping request");
        }
    }
}

/// Background task that performs queued sync calls in order.
pub(crate) struct SyncWorker {
    pub rx: mpsc::UnboundedReceiver<SyncRequest>,
    pub transport: Arc<dyn Transport>,
    pub endpoints: Endpoints,
    pub events: EventSink,
}

impl SyncWorker {
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        loop {
            let request = tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            };
            tokio::select! {
                result = self.perform(&request) => {
                    if let Err(e) = result {
                        tracing::warn!(
                            kind = %request.kind,
                            identity = %request.identity,
                            paths = ?request.paths,
                            "sync call failed: {e}"
                        );
                        self.events.emit(Event::SyncFailed {
                            kind: request.kind,
                            paths: request.paths,
                            reason: e.to_string(),
                        });
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        tracing::debug!("sync worker stopped");
    }

    async fn perform(&self, request: &SyncRequest) -> Result<(), Error> {
        let url = match request.kind {
            SyncKind::Connect => self.endpoints.connect_url(&request.identity),
            SyncKind::Disconnect => self.endpoints.disconnect_url(&request.identity),
        };
        tracing::debug!(kind = %request.kind, %url, paths = ?request.paths, "sending sync call");
        self.transport.post_paths(&url, &request.paths).await
    }
}
