//! Advisory event delivery to the host.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::types::Event;

/// Receiving side of the advisory event stream.
///
/// Events may be dropped if the consumer falls behind; the client never waits
/// on this stream.
pub struct Events {
    rx: mpsc::Receiver<Event>,
}

impl Events {
    /// Receive the next event. Returns `None` once the client and its tasks are gone.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// Queue `event` without blocking.
    pub(crate) fn emit(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total_dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(total_dropped, "event channel full, dropping event");
            }
            // Nobody is listening, which is fine.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub(crate) fn channel(capacity: usize) -> (EventSink, Events) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        EventSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        Events { rx },
    )
}
