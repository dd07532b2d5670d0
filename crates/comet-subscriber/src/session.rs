//! Continuation token and session identity tracking.

/// Separators that end the identity prefix of a continuation token.
const IDENTITY_SEPARATORS: [char; 2] = ['/', ':'];

/// Identity encoded in `token`: everything before the first `/` or `:`.
///
/// Returns `None` for an empty or whitespace-only token, or one that starts
/// with a separator.
pub fn identity_of(token: &str) -> Option<&str> {
    if token.trim().is_empty() {
        return None;
    }
    token
        .split(IDENTITY_SEPARATORS)
        .next()
        .filter(|identity| !identity.is_empty())
}

/// What happened to the session identity after a new token was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    Unchanged,
    /// A new non-empty identity; attached paths must be re-announced.
    Started(String),
    /// The token went empty while a session was active.
    Ended,
}

/// The poll loop's view of the server-side channel.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    continuation_token: String,
    identity: String,
}

impl SessionState {
    pub fn continuation_token(&self) -> &str {
        &self.continuation_token
    }

    /// Current identity, empty when there is no active session.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_active(&self) -> bool {
        !self.identity.is_empty()
    }

    /// Store the token from a poll response and recompute the identity.
    ///
    /// The token is always kept, even when the identity does not move, so the
    /// next poll resumes from it.
    pub fn advance(&mut self, token: String) -> IdentityChange {
        self.continuation_token = token;
        match identity_of(&self.continuation_token) {
            Some(identity) if identity != self.identity => {
                self.identity = identity.to_string();
                IdentityChange::Started(self.identity.clone())
            }
            Some(_) => IdentityChange::Unchanged,
            None if self.identity.is_empty() => IdentityChange::Unchanged,
            None => {
                self.identity.clear();
                IdentityChange::Ended
            }
        }
    }
}
