//! Transport error types.

use roomsync_core::SyncError;
use roomsync_proto::ProtocolError;
use thiserror::Error;

/// gRPC status code for an unavailable server.
pub const STATUS_UNAVAILABLE: u32 = 14;

/// gRPC status code for a deadline that elapsed.
pub const STATUS_DEADLINE_EXCEEDED: u32 = 4;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call completed with a non-OK status.
    #[error("call failed with status {code}: {message}")]
    Status {
        /// gRPC status code
        code: u32,
        /// Status message from the trailers
        message: String,
    },

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The call was cancelled locally.
    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    /// Returns true if retrying may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Stream(_) | Self::Timeout => true,
            Self::Status { code, .. } => {
                matches!(*code, STATUS_UNAVAILABLE | STATUS_DEADLINE_EXCEEDED)
            },
            Self::Protocol(_) | Self::Cancelled => false,
        }
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Convert `TransportError` to `SyncError` at the engine boundary
impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_are_transient() {
        assert!(TransportError::Connection("refused".to_string()).is_transient());
        assert!(TransportError::Timeout.is_transient());
        assert!(
            TransportError::Status { code: STATUS_UNAVAILABLE, message: String::new() }
                .is_transient()
        );
    }

    #[test]
    fn rejections_are_fatal() {
        assert!(
            !TransportError::Status { code: 16, message: "unauthenticated".to_string() }
                .is_transient()
        );
        assert!(!TransportError::Protocol("bad frame".to_string()).is_transient());
        assert!(!TransportError::Cancelled.is_transient());
    }

    #[test]
    fn converts_to_transport_sync_error() {
        let err = SyncError::from(TransportError::Timeout);
        assert_eq!(err, SyncError::Transport("request timed out".to_string()));
        assert!(err.is_transient());
    }
}
