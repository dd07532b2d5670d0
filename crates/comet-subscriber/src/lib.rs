//! Long-poll ("comet") subscriber client.
//!
//! Keeps one logical server-to-client channel alive out of back-to-back HTTP
//! polls and fans the updates it carries out to per-path subscribers.
//!
//! # Features
//! - One outstanding poll at a time; immediate re-poll on success
//! - Fixed-delay retry on transport errors and unusable bodies
//! - Duplicate-safe per-path subscriptions with O(1) attach/detach
//! - Path interest re-announced whenever the server rotates the session
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), comet_subscriber::Error> {
//! use std::sync::Arc;
//!
//! use comet_subscriber::{Action, CometClient, CometConfig, Event, Target};
//!
//! struct Printer;
//! impl Target for Printer {}
//!
//! let (client, mut events) = CometClient::start(CometConfig::new("localhost", 4020))?;
//! let printer: Arc<dyn Target> = Arc::new(Printer);
//! let action = Action::callback(|_, path, message| {
//!     println!("{path}: {message}");
//!     Ok(())
//! });
//! client.connect("/rooms/42", &printer, &action);
//!
//! while let Some(event) = events.next().await {
//!     if let Event::SessionStarted { identity } = event {
//!         println!("session {identity}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod dispatch;
mod events;
mod poll_loop;
mod registry;
mod session;
mod state;
mod sync;
mod transport;
mod types;

#[cfg(test)]
mod testing;

pub use client::CometClient;
pub use config::{CometConfig, Endpoints};
pub use events::Events;
pub use poll_loop::LoopState;
pub use registry::{
    Action, Attach, Callback, Detach, PathSubscription, SubscriberHandle, SubscriberId,
    Subscribers, SubscriptionRegistry, Target,
};
pub use session::{IdentityChange, SessionState, identity_of};
pub use transport::{ReqwestTransport, Transport};
pub use types::{BoxError, DispatchError, Error, Event, PollResponse, SyncKind, Update};
