//! Account flows: register, login, token validation and logout.
//!
//! These are plain request/response calls with no state of their own; the
//! result is a [`Session`] the caller hands to the sync runtime.

use std::sync::Arc;

use roomsync_core::{Session, SyncError, validate};
use roomsync_proto::{
    AuthRequest, AuthResponse, Method, ValidateTokenRequest, ValidateTokenResponse, WireMessage,
};

use crate::transport::{Metadata, Transport};

/// Status after a successful registration.
pub const STATUS_REGISTERED: &str = "Registration successful!";

/// Status after a successful login.
pub const STATUS_LOGGED_IN: &str = "Login successful!";

/// Reason used when the server rejects without saying why.
pub const FALLBACK_AUTH_ERROR: &str = "Operation failed";

/// Reason used when a stored token is no longer accepted.
pub const TOKEN_REJECTED: &str = "Session expired";

/// Client for the account RPCs.
#[derive(Debug)]
pub struct AuthClient<T> {
    transport: Arc<T>,
}

impl<T> Clone for AuthClient<T> {
    fn clone(&self) -> Self {
        Self { transport: Arc::clone(&self.transport) }
    }
}

impl<T: Transport> AuthClient<T> {
    /// Client sharing `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Create an account and log in.
    ///
    /// # Errors
    ///
    /// - `SyncError::Validation` if the username or password is rejected
    ///   locally (no call is made)
    /// - `SyncError::Auth` if the server refuses the registration
    /// - `SyncError::Transport` if the call fails
    pub async fn register(&self, username: &str, password: &str) -> Result<Session, SyncError> {
        self.authenticate(Method::Register, username, password).await
    }

    /// Log in to an existing account.
    ///
    /// # Errors
    ///
    /// Same as [`AuthClient::register`].
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SyncError> {
        self.authenticate(Method::Login, username, password).await
    }

    /// Exchange a stored token for a session.
    ///
    /// # Errors
    ///
    /// - `SyncError::Auth` if the server no longer accepts the token
    /// - `SyncError::Transport` if the call fails
    pub async fn validate_token(&self, token: &str) -> Result<Session, SyncError> {
        if token.is_empty() {
            return Err(SyncError::Auth(TOKEN_REJECTED.to_string()));
        }

        let request = ValidateTokenRequest { token: token.to_string() }.encode()?;
        let bytes = self
            .transport
            .call(Method::ValidateToken, request, &Metadata::with_token(Some(token)))
            .await?;
        let response = ValidateTokenResponse::decode(&bytes);

        if !response.valid || response.user_id.is_empty() {
            tracing::info!("stored token rejected");
            return Err(SyncError::Auth(TOKEN_REJECTED.to_string()));
        }

        tracing::debug!(user_id = %response.user_id, "token validated");
        Ok(Session::authenticated(token, response.user_id, response.username))
    }

    /// Re-validate the token held by `session`.
    ///
    /// On any failure the session is cleared.
    ///
    /// # Errors
    ///
    /// Same as [`AuthClient::validate_token`].
    pub async fn restore(&self, session: &mut Session) -> Result<(), SyncError> {
        let token = session.token().unwrap_or_default().to_string();
        match self.validate_token(&token).await {
            Ok(restored) => {
                *session = restored;
                Ok(())
            },
            Err(e) => {
                *session = std::mem::take(session).logout();
                Err(e)
            },
        }
    }

    /// Drop the session. The server keeps no logout state.
    pub fn logout(&self, session: Session) -> Session {
        if let Some(user) = session.user() {
            tracing::info!(user_id = %user.user_id, "logged out");
        }
        session.logout()
    }

    async fn authenticate(
        &self,
        method: Method,
        username: &str,
        password: &str,
    ) -> Result<Session, SyncError> {
        validate::username(username)?;
        validate::password(password)?;

        let request =
            AuthRequest { username: username.to_string(), password: password.to_string() }
                .encode()?;
        let bytes = self.transport.call(method, request, &Metadata::new()).await?;
        let response = AuthResponse::decode(&bytes);

        if !response.success || response.token.is_empty() {
            let reason = if response.error.is_empty() {
                FALLBACK_AUTH_ERROR.to_string()
            } else {
                response.error
            };
            tracing::warn!(method = %method, reason = %reason, "authentication rejected");
            return Err(SyncError::Auth(reason));
        }

        let username = if response.username.is_empty() {
            username.to_string()
        } else {
            response.username
        };
        tracing::info!(user_id = %response.user_id, username = %username, "authenticated");

        Ok(Session::authenticated(response.token, response.user_id, username))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use roomsync_core::ValidationError;

    use super::*;
    use crate::{error::TransportError, transport::StreamHandle};

    /// Replies with a canned response and records calls.
    struct CannedTransport {
        reply: Bytes,
        calls: Mutex<Vec<(Method, Metadata)>>,
    }

    impl CannedTransport {
        fn new(reply: impl WireMessage) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.encode().expect("encode should succeed"),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Method, Metadata)> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn call(
            &self,
            method: Method,
            _request: Bytes,
            metadata: &Metadata,
        ) -> Result<Bytes, TransportError> {
            self.calls.lock().expect("lock").push((method, metadata.clone()));
            Ok(self.reply.clone())
        }

        async fn open_stream(
            &self,
            _method: Method,
            _request: Bytes,
            _metadata: &Metadata,
        ) -> Result<StreamHandle, TransportError> {
            Err(TransportError::Cancelled)
        }
    }

    fn accepted() -> AuthResponse {
        AuthResponse {
            token: "tok".to_string(),
            user_id: "u-1".to_string(),
            username: "alice".to_string(),
            success: true,
            error: String::new(),
        }
    }

    #[tokio::test]
    async fn login_builds_session() {
        let transport = CannedTransport::new(accepted());
        let client = AuthClient::new(Arc::clone(&transport));

        let session = client.login("alice", "pw").await.expect("login should succeed");

        assert_eq!(session.token(), Some("tok"));
        assert_eq!(session.names().get("u-1"), Some("alice"));
        assert_eq!(transport.calls()[0].0, Method::Login);
    }

    #[tokio::test]
    async fn rejection_without_reason_uses_fallback() {
        let transport = CannedTransport::new(AuthResponse::default());
        let client = AuthClient::new(transport);

        let err = client.register("alice", "pw").await.expect_err("should be rejected");

        assert_eq!(err, SyncError::Auth(FALLBACK_AUTH_ERROR.to_string()));
    }

    #[tokio::test]
    async fn rejection_reason_is_kept() {
        let transport = CannedTransport::new(AuthResponse {
            error: "Username taken".to_string(),
            ..AuthResponse::default()
        });
        let client = AuthClient::new(transport);

        let err = client.register("alice", "pw").await.expect_err("should be rejected");

        assert_eq!(err, SyncError::Auth("Username taken".to_string()));
    }

    #[tokio::test]
    async fn invalid_username_makes_no_call() {
        let transport = CannedTransport::new(accepted());
        let client = AuthClient::new(Arc::clone(&transport));

        let err = client.login("a", "pw").await.expect_err("too short");

        assert!(matches!(err, SyncError::Validation(ValidationError::UsernameLength { .. })));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn validate_token_sends_bearer() {
        let transport = CannedTransport::new(ValidateTokenResponse {
            user_id: "u-1".to_string(),
            username: "alice".to_string(),
            valid: true,
        });
        let client = AuthClient::new(Arc::clone(&transport));

        let session = client.validate_token("tok").await.expect("token should be valid");

        assert!(session.is_authenticated());
        assert_eq!(transport.calls()[0].1.bearer_token(), Some("tok"));
    }

    #[tokio::test]
    async fn failed_restore_clears_session() {
        let transport = CannedTransport::new(ValidateTokenResponse::default());
        let client = AuthClient::new(transport);
        let mut session = Session::authenticated("old", "u-1", "alice");

        let result = client.restore(&mut session).await;

        assert_eq!(result, Err(SyncError::Auth(TOKEN_REJECTED.to_string())));
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
    }
}
