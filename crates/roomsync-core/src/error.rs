//! Error types for the sync engine.
//!
//! Transport failures are recoverable by retrying or falling back to polling.
//! Auth and validation failures need the user to act. Invalid state means the
//! caller drove the state machine out of order.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors surfaced by the sync engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// RPC failed below the codec (network, HTTP or call status)
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected or session missing
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Input rejected before any RPC was issued
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Outgoing message could not be encoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation not legal in the current connection state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

impl SyncError {
    /// Returns true if this error may succeed on retry.
    ///
    /// Only transport failures are transient. Everything else fails the same
    /// way until the input or the session changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<roomsync_proto::ProtocolError> for SyncError {
    fn from(err: roomsync_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// User input rejected by [`crate::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Message body is empty or whitespace
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Message body is too long
    #[error("Message must be less than {max} characters")]
    MessageTooLong {
        /// Length of the rejected body in characters
        len: usize,
        /// Maximum accepted length
        max: usize,
    },

    /// Room id is empty or whitespace
    #[error("Room ID is required")]
    EmptyRoom,

    /// Room id is too long
    #[error("Room ID must be less than {max} characters")]
    RoomTooLong {
        /// Length of the rejected id in characters
        len: usize,
        /// Maximum accepted length
        max: usize,
    },

    /// Username is empty or whitespace
    #[error("Username is required")]
    EmptyUsername,

    /// Username length outside the accepted range
    #[error("Username must be between {min} and {max} characters long")]
    UsernameLength {
        /// Length of the rejected name in characters
        len: usize,
        /// Minimum accepted length
        min: usize,
        /// Maximum accepted length
        max: usize,
    },

    /// Username contains a character outside `[A-Za-z0-9_-]`
    #[error("Username can only contain letters, numbers, underscores, and hyphens")]
    UsernameCharset,

    /// Password is empty
    #[error("Password is required")]
    EmptyPassword,

    /// A send is already waiting for its response
    #[error("A message is already being sent")]
    SendInFlight,

    /// Sending requires a logged-in user
    #[error("You must be logged in")]
    NotAuthenticated,

    /// Sending requires a connected room
    #[error("Not connected to a room")]
    NotConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(SyncError::Transport("connection reset".to_string()).is_transient());
    }

    #[test]
    fn user_facing_errors_are_fatal() {
        assert!(!SyncError::Auth("invalid credentials".to_string()).is_transient());
        assert!(!SyncError::Validation(ValidationError::EmptyMessage).is_transient());
        assert!(!SyncError::Protocol("value too large".to_string()).is_transient());
        assert!(
            !SyncError::InvalidState {
                state: ConnectionState::Disconnected,
                operation: "send_message",
            }
            .is_transient()
        );
    }

    #[test]
    fn validation_messages_are_readable() {
        let err = SyncError::from(ValidationError::MessageTooLong { len: 1001, max: 1000 });
        assert_eq!(err.to_string(), "Message must be less than 1000 characters");
    }

    #[test]
    fn protocol_errors_convert() {
        let err = SyncError::from(roomsync_proto::ProtocolError::InvalidFieldNumber(0));
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}
