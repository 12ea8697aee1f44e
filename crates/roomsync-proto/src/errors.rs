//! Protocol error types.
//!
//! These errors describe malformed or unrepresentable wire data. The codec
//! entry points used by the sync engine ([`crate::decode_message`] and the
//! payload `decode` functions) absorb them and return best-effort partial
//! results; only the `*_checked` variants and the encoders surface them.

use thiserror::Error;

/// Errors raised while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Varint continued past the 28-bit shift budget
    #[error("varint exceeds {max_bytes}-byte budget at offset {offset}")]
    VarintOverflow {
        /// Byte offset where the varint started
        offset: usize,
        /// Maximum number of bytes a varint may occupy
        max_bytes: usize,
    },

    /// Buffer ended in the middle of a tag, length prefix or value
    #[error("truncated {what} at offset {offset}")]
    Truncated {
        /// Which element was cut short
        what: &'static str,
        /// Byte offset where the element started
        offset: usize,
    },

    /// Length prefix claims more bytes than remain in the buffer
    #[error("length {length} exceeds remaining {remaining} bytes at offset {offset}")]
    LengthOverrun {
        /// Claimed length
        length: usize,
        /// Bytes actually remaining
        remaining: usize,
        /// Byte offset of the value
        offset: usize,
    },

    /// Wire type not representable by this codec (groups, reserved values)
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType {
        /// Field number carried by the tag
        field: u32,
        /// Raw 3-bit wire type
        wire_type: u8,
    },

    /// Field number is zero or does not fit in a 28-bit tag
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u32),

    /// Value cannot be encoded with the requested wire type
    #[error("wire type mismatch for field {field}: expected {expected}")]
    WireTypeMismatch {
        /// Field number being encoded
        field: u32,
        /// Wire type that was requested
        expected: &'static str,
    },

    /// Integer too large for the 28-bit varint budget
    #[error("value {value} exceeds varint limit {max}")]
    ValueTooLarge {
        /// Value that was rejected
        value: u64,
        /// Largest encodable value
        max: u64,
    },

    /// gRPC-web frame prefix shorter than 5 bytes
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// gRPC-web frame payload shorter than its length prefix
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload length claimed by the prefix
        expected: usize,
        /// Payload bytes available
        actual: usize,
    },

    /// gRPC-web frame exceeds the configured maximum
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Claimed size
        size: usize,
        /// Limit
        max: usize,
    },
}

impl ProtocolError {
    /// Returns true if more input could complete the data.
    ///
    /// Streaming decoders use this to decide between waiting for the next
    /// chunk and discarding the buffer.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::FrameTooShort { .. } | Self::FrameTruncated { .. })
    }
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
