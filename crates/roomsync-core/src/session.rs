//! Authenticated user session.
//!
//! The session is an explicit value handed to the connection manager. Logging
//! out replaces it with a fresh one, which also drops the display-name cache.

use crate::{message::Message, store::DisplayNameCache};

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Server-assigned user id
    pub user_id: String,
    /// Canonical username
    pub username: String,
}

/// Local session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    user: Option<UserIdentity>,
    names: DisplayNameCache,
}

impl Session {
    /// Session with no user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Session for a user who logged in or restored a token.
    ///
    /// The user's own name is cached immediately.
    pub fn authenticated(
        token: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let user = UserIdentity { user_id: user_id.into(), username: username.into() };
        let mut names = DisplayNameCache::default();
        names.remember(&user.user_id, &user.username);
        Self { token: Some(token.into()), user: Some(user), names }
    }

    /// Returns true if a user is logged in.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Logged-in user.
    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Session token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Display names seen in this session.
    pub fn names(&self) -> &DisplayNameCache {
        &self.names
    }

    /// Record a name for an author id.
    pub fn remember_name(&mut self, author_id: &str, name: &str) {
        self.names.remember(author_id, name);
    }

    /// Attach a display name to `message` if it has none.
    pub fn resolve_display_name(&mut self, message: &mut Message) {
        self.names.resolve(message, self.user.as_ref());
    }

    /// End the session, returning a fresh cleared one.
    #[must_use]
    pub fn logout(self) -> Self {
        Self::anonymous()
    }
}
