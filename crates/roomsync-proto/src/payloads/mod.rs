//! Typed protocol messages.
//!
//! Every RPC request and response has a plain struct here plus a static field
//! table. Conversion goes through the schema-free [`FieldMap`], so the
//! generic codec in [`crate::wire`] is the only code that touches bytes.
//!
//! # Invariants
//!
//! - `T::decode(&t.encode()?)` equals `t` for every field holding a
//!   non-default value. Optional strings that are empty decode as `None`.
//! - Decoding never fails; malformed input yields the fields read before the
//!   malformed element, with defaults for the rest.

pub mod auth;
pub mod chat;

use bytes::Bytes;

use crate::{
    errors::Result,
    schema::MessageSchema,
    value::FieldMap,
    wire::{decode_message, encode_message},
};

/// A protocol message with a static field table.
pub trait WireMessage: Sized {
    /// Field table used to decode this message.
    fn schema() -> &'static MessageSchema;

    /// Schema-free representation.
    fn to_fields(&self) -> FieldMap;

    /// Build from a decoded field map. Missing fields take default values.
    fn from_fields(fields: &FieldMap) -> Self;

    /// Encode to wire bytes, eliding default values.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::ValueTooLarge` if an integer or a string length
    ///   exceeds the varint budget
    fn encode(&self) -> Result<Bytes> {
        encode_message(&self.to_fields())
    }

    /// Decode from wire bytes. Never fails; see the module invariants.
    fn decode(bytes: &[u8]) -> Self {
        Self::from_fields(&decode_message(bytes, Self::schema()))
    }
}

/// Non-empty string field as `Some`.
pub(crate) fn optional_str(fields: &FieldMap, number: u32) -> Option<String> {
    fields.str(number).filter(|s| !s.is_empty()).map(str::to_string)
}
