//! Session tokens.
//!
//! Opaque bearer tokens validated against an in-memory table. The
//! external identity store issues credentials; this table only tracks
//! which tokens are currently live on this node.

use dashmap::DashMap;
use uuid::Uuid;

/// Live sessions by token.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, String>,
}

impl SessionStore {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `user`.
    #[must_use]
    pub fn issue(&self, user: impl Into<String>) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), user.into());
        token
    }

    /// The user behind a token, if the session is live.
    #[must_use]
    pub fn validate(&self, token: &str) -> Option<String> {
        self.sessions.get(token).map(|u| u.clone())
    }

    /// End a session.
    pub fn revoke(&self, token: &str) {
        self.sessions.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_validate_revoke() {
        let store = SessionStore::new();
        let token = store.issue("alice");

        assert_eq!(store.validate(&token).as_deref(), Some("alice"));
        store.revoke(&token);
        assert_eq!(store.validate(&token), None);
    }

    #[test]
    fn test_unknown_token_invalid() {
        let store = SessionStore::new();
        assert!(store.validate("nope").is_none());
    }
}
