//! The long-poll loop: one outstanding poll at a time, immediate re-poll on
//! success, fixed-delay retry on anything else.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Endpoints;
use crate::dispatch::UpdateDispatcher;
use crate::session::IdentityChange;
use crate::state::Shared;
use crate::transport::Transport;
use crate::types::{Error, Event, PollResponse};

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not started yet.
    Idle,
    /// A poll request is outstanding.
    Polling,
    /// The last poll failed; waiting out the retry delay.
    WaitingRetry,
    Stopped,
}

/// The single pending retry, if any. Scheduling replaces (and so cancels)
/// whatever was pending before.
#[derive(Default)]
pub(crate) struct RetryTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl RetryTimer {
    pub(crate) fn schedule(&mut self, delay: Duration) {
        if self.cancel() {
            tracing::debug!("replacing pending retry");
        }
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Returns `true` if a retry was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    /// Wait for the pending retry to fire. Returns immediately if none is pending.
    pub(crate) async fn wait(&mut self) {
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.as_mut().await;
        }
        self.sleep = None;
    }
}

pub(crate) struct TransportLoop {
    pub shared: Arc<Shared>,
    pub transport: Arc<dyn Transport>,
    pub endpoints: Endpoints,
    pub dispatcher: UpdateDispatcher,
    pub retry_delay: Duration,
    pub retry: RetryTimer,
    pub state: watch::Sender<LoopState>,
}

impl TransportLoop {
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(origin = self.endpoints.origin(), "starting poll loop");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.retry.is_pending() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = self.retry.wait() => {}
                }
            }

            let token = self.shared.lock().session.continuation_token().to_string();
            let url = self.endpoints.poll_url(&token);
            self.state.send_replace(LoopState::Polling);
            tracing::debug!(%url, "polling");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.transport.poll(&url) => result,
            };

            match self.handle_response(result, &cancel) {
                Ok(count) => {
                    tracing::trace!(count, "poll completed");
                }
                Err(e) => {
                    tracing::warn!(
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "poll failed: {e}"
                    );
                    self.shared.events.emit(Event::PollFailed {
                        reason: e.to_string(),
                    });
                    self.retry.schedule(self.retry_delay);
                    self.state.send_replace(LoopState::WaitingRetry);
                }
            }
        }

        self.retry.cancel();
        self.state.send_replace(LoopState::Stopped);
        tracing::info!("poll loop stopped");
    }

    /// Apply one poll result. Returns the number of updates dispatched.
    ///
    /// The token of a decoded body is applied even if the body turns out to
    /// carry no `updates`; the poll still counts as failed in that case.
    /// Dispatch stops at the first update seen after `cancel` fires.
    fn handle_response(
        &self,
        result: Result<PollResponse, Error>,
        cancel: &CancellationToken,
    ) -> Result<usize, Error> {
        let response = result?;

        match self
            .shared
            .apply_token(response.reconnect_with.unwrap_or_default())
        {
            IdentityChange::Started(identity) => {
                tracing::info!(%identity, "session started");
                self.shared
                    .events
                    .emit(Event::SessionStarted { identity });
            }
            IdentityChange::Ended => {
                tracing::info!("session ended");
                self.shared.events.emit(Event::SessionEnded);
            }
            IdentityChange::Unchanged => {}
        }

        let updates = response.updates.ok_or(Error::MissingUpdates)?;
        let mut count = 0;
        for update in updates {
            if cancel.is_cancelled() {
                tracing::debug!(path = %update.path, "stopped, skipping remaining updates");
                break;
            }
            if update.path.is_empty() {
                tracing::trace!("update without a path, skipping");
                continue;
            }
            count += 1;
            for failure in self.dispatcher.dispatch(&update.path, &update.message) {
                tracing::warn!(path = failure.path(), "dispatch failed: {failure}");
                self.shared.events.emit(Event::DispatchFailed {
                    path: failure.path().to_string(),
                    reason: failure.to_string(),
                });
            }
        }
        Ok(count)
    }
}
