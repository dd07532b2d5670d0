//! Public types for the comet-subscriber crate.

use serde::{Deserialize, Serialize};

/// A boxed error type for subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single server-originated update carried by a poll response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Path the update was published on (e.g. `"/rooms/42"`). Empty when the
    /// server sent none; such updates are not routed.
    #[serde(default)]
    pub path: String,
    /// Update payload, passed to subscribers untouched.
    #[serde(default)]
    pub message: serde_json::Value,
}

/// Body of a poll response.
///
/// Both fields are optional on the wire: a missing `reconnectWith` counts as
/// an empty token, and a missing `updates` makes the poll a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    #[serde(default)]
    pub reconnect_with: Option<String>,
    #[serde(default)]
    pub updates: Option<Vec<Update>>,
}

/// Which sync call an [`Event::SyncFailed`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Connect,
    Disconnect,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Connect => f.write_str("connect"),
            SyncKind::Disconnect => f.write_str("disconnect"),
        }
    }
}

/// Advisory events emitted by a running [`CometClient`](crate::CometClient).
///
/// None of these are fatal: the poll loop keeps running regardless.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server issued a new session identity and attached paths were re-announced.
    SessionStarted { identity: String },
    /// The server returned an empty token; local subscriptions are kept.
    SessionEnded,
    /// A poll failed and a retry has been scheduled.
    PollFailed { reason: String },
    /// A connect or disconnect call failed. It is not retried.
    SyncFailed {
        kind: SyncKind,
        paths: Vec<String>,
        reason: String,
    },
    /// A subscriber failed while handling an update.
    DispatchFailed { path: String, reason: String },
}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("empty response body from {0}")]
    EmptyBody(String),

    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("poll response has no updates field")]
    MissingUpdates,

    #[error("{url} is not on the configured origin {origin}")]
    CrossOrigin { url: String, origin: String },

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("no tokio runtime to spawn on: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// A subscriber failure isolated by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("subscriber on {path} failed: {source}")]
    Subscriber {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("subscriber on {path} panicked")]
    Panicked { path: String },
}

impl DispatchError {
    pub fn path(&self) -> &str {
        match self {
            DispatchError::Subscriber { path, .. } | DispatchError::Panicked { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_response_json_deserialization() {
        let json = r#"{
            "reconnectWith": "U9/tok1",
            "updates": [
                {"path": "/a", "message": {"n": 1}},
                {"path": "/b", "message": "hi"}
            ]
        }"#;
        let resp: PollResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.reconnect_with.as_deref(), Some("U9/tok1"));
        let updates = resp.updates.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].path, "/a");
        assert_eq!(updates[0].message, serde_json::json!({"n": 1}));
        assert_eq!(updates[1].message, serde_json::json!("hi"));
    }

    #[test]
    fn poll_response_missing_fields() {
        let resp: PollResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.reconnect_with, None);
        assert_eq!(resp.updates, None);
    }

    #[test]
    fn update_without_message_is_null() {
        let update: Update = serde_json::from_str(r#"{"path": "/x"}"#).unwrap();
        assert_eq!(update.message, serde_json::Value::Null);
    }

    #[test]
    fn update_without_path_keeps_rest_of_body() {
        let json = r#"{
            "reconnectWith": "U1/t",
            "updates": [{"message": 1}, {"path": "/a", "message": 2}]
        }"#;
        let resp: PollResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.reconnect_with.as_deref(), Some("U1/t"));
        let updates = resp.updates.unwrap();
        assert_eq!(updates[0].path, "");
        assert_eq!(updates[1].path, "/a");
    }

    #[test]
    fn dispatch_error_reports_path() {
        let err = DispatchError::Subscriber {
            path: "/a".to_string(),
            source: "boom".into(),
        };
        assert_eq!(err.path(), "/a");
        assert_eq!(err.to_string(), "subscriber on /a failed: boom");
        assert_eq!(
            DispatchError::Panicked {
                path: "/b".to_string()
            }
            .path(),
            "/b"
        );
    }
}
