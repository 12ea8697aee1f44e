//! Tag/value wire codec.
//!
//! Every field on the wire is a varint tag `(field_number << 3) | wire_type`
//! followed by a value whose shape depends on the wire type:
//!
//! ```text
//! wire type 0 (varint):            [tag][varint]
//! wire type 2 (length-delimited):  [tag][varint len L][L bytes]
//! wire type 1 / 5 (fixed):         [tag][8 bytes] / [tag][4 bytes]   (skip only)
//! ```
//!
//! Encoding is driven by [`Value`]s; decoding is driven by a
//! [`MessageSchema`] that tells length-delimited strings apart from nested
//! messages.
//!
//! # Invariants
//!
//! - Decoding never fails for malformed input. [`decode_message`] stops at
//!   the first unreadable element and returns every field decoded so far.
//! - Unknown field numbers, and known fields whose wire type does not match
//!   the table, are skipped by their wire type's skip rule.
//! - `decode_message(encode_message(m))` reproduces every non-default field
//!   of `m`. Defaults (empty string, zero, false) are elided by the encoder.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    schema::{FieldKind, MessageSchema},
    value::{FieldMap, Value},
    varint::{MAX_VARINT_VALUE, encode_varint, read_varint},
};

/// Largest field number whose tag fits the varint budget.
pub const MAX_FIELD_NUMBER: u32 = (MAX_VARINT_VALUE >> 3) as u32;

/// Wire types understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Base-128 varint
    Varint,
    /// Eight fixed bytes (skipped, never produced)
    Fixed64,
    /// Varint length followed by that many bytes
    LengthDelimited,
    /// Four fixed bytes (skipped, never produced)
    Fixed32,
}

impl WireType {
    /// Parse the low three bits of a tag.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }

    /// Low three bits of a tag carrying this wire type.
    pub const fn to_bits(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Varint => "varint",
            Self::Fixed64 => "fixed64",
            Self::LengthDelimited => "length-delimited",
            Self::Fixed32 => "fixed32",
        }
    }
}

/// Field tag: field number plus wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    field: u32,
    wire_type: WireType,
}

impl Tag {
    /// Create a tag.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidFieldNumber` if `field` is zero or above
    ///   [`MAX_FIELD_NUMBER`]
    pub fn new(field: u32, wire_type: WireType) -> Result<Self> {
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(ProtocolError::InvalidFieldNumber(field));
        }
        Ok(Self { field, wire_type })
    }

    /// Field number.
    pub fn field(&self) -> u32 {
        self.field
    }

    /// Wire type.
    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// Raw tag value `(field << 3) | wire_type`.
    pub fn to_raw(&self) -> u64 {
        (u64::from(self.field) << 3) | u64::from(self.wire_type.to_bits())
    }

    /// Append the varint-encoded tag.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        encode_varint(self.to_raw(), dst)
    }
}

/// Encode one field into a fresh buffer.
///
/// A [`Value::Repeated`] produces one tag/value pair per element. Default
/// values are encoded as given; elision happens in [`encode_message`].
///
/// # Errors
///
/// - `ProtocolError::InvalidFieldNumber` for an unencodable field number
/// - `ProtocolError::WireTypeMismatch` if `value` cannot be carried by
///   `wire_type`
/// - `ProtocolError::ValueTooLarge` for integers or lengths above the varint
///   budget
pub fn encode_field(field: u32, wire_type: WireType, value: &Value) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    put_field(&mut buf, field, wire_type, value)?;
    Ok(buf.freeze())
}

/// Append one field to `dst`. See [`encode_field`].
pub fn put_field(dst: &mut impl BufMut, field: u32, wire_type: WireType, value: &Value) -> Result<()> {
    if let Value::Repeated(items) = value {
        for item in items {
            put_field(dst, field, wire_type, item)?;
        }
        return Ok(());
    }

    let tag = Tag::new(field, wire_type)?;

    match (wire_type, value) {
        (WireType::Varint, Value::UInt(v)) => {
            tag.encode(dst)?;
            encode_varint(*v, dst)
        },
        (WireType::Varint, Value::Bool(b)) => {
            tag.encode(dst)?;
            encode_varint(u64::from(*b), dst)
        },
        (WireType::LengthDelimited, Value::Str(s)) => {
            tag.encode(dst)?;
            put_length_delimited(dst, s.as_bytes())
        },
        (WireType::LengthDelimited, Value::Message(m)) => {
            let body = encode_message(m)?;
            tag.encode(dst)?;
            put_length_delimited(dst, &body)
        },
        _ => Err(ProtocolError::WireTypeMismatch { field, expected: wire_type.name() }),
    }
}

/// Wire type a value is naturally carried with.
///
/// `None` for [`Value::Repeated`], whose elements each carry their own.
pub fn natural_wire_type(value: &Value) -> Option<WireType> {
    match value {
        Value::UInt(_) | Value::Bool(_) => Some(WireType::Varint),
        Value::Str(_) | Value::Message(_) => Some(WireType::LengthDelimited),
        Value::Repeated(_) => None,
    }
}

/// Encode a whole message, eliding default-valued fields.
///
/// Fields are written in ascending field-number order.
///
/// # Errors
///
/// See [`encode_field`].
pub fn encode_message(fields: &FieldMap) -> Result<Bytes> {
    let mut buf = BytesMut::new();

    for (number, value) in fields.iter() {
        if value.is_default() {
            continue;
        }

        match value {
            Value::Repeated(items) => {
                for item in items {
                    if let Some(wire_type) = natural_wire_type(item) {
                        put_field(&mut buf, number, wire_type, item)?;
                    }
                }
            },
            _ => {
                if let Some(wire_type) = natural_wire_type(value) {
                    put_field(&mut buf, number, wire_type, value)?;
                }
            },
        }
    }

    Ok(buf.freeze())
}

fn put_length_delimited(dst: &mut impl BufMut, bytes: &[u8]) -> Result<()> {
    encode_varint(bytes.len() as u64, dst)?;
    dst.put_slice(bytes);
    Ok(())
}

/// Decode `bytes` against `schema`, returning every field read before the
/// first malformed element.
pub fn decode_message(bytes: &[u8], schema: &MessageSchema) -> FieldMap {
    decode_message_checked(bytes, schema).0
}

/// Decode `bytes` against `schema`, also reporting the error that ended
/// decoding early, if any.
///
/// Errors inside nested messages are absorbed by the nested decode and do not
/// appear here; the outer loop continues after the nested value.
pub fn decode_message_checked(
    bytes: &[u8],
    schema: &MessageSchema,
) -> (FieldMap, Option<ProtocolError>) {
    let mut fields = FieldMap::new();
    let mut offset = 0;

    while offset < bytes.len() {
        match decode_one(bytes, offset, schema, &mut fields) {
            Ok(next) => offset = next,
            Err(e) => return (fields, Some(e)),
        }
    }

    (fields, None)
}

/// Decode the field starting at `offset` into `fields`, returning the offset
/// of the next field.
fn decode_one(
    bytes: &[u8],
    offset: usize,
    schema: &MessageSchema,
    fields: &mut FieldMap,
) -> Result<usize> {
    let (raw_tag, cursor) = read_varint(bytes, offset)?;
    let field = (raw_tag >> 3) as u32;
    let wire_bits = (raw_tag & 0x07) as u8;

    let Some(wire_type) = WireType::from_bits(wire_bits) else {
        return Err(ProtocolError::UnsupportedWireType { field, wire_type: wire_bits });
    };

    let descriptor = schema.field(field).filter(|d| d.kind.wire_bits() == wire_bits);

    match wire_type {
        WireType::Varint => {
            let (raw, next) = read_varint(bytes, cursor)?;
            if let Some(descriptor) = descriptor {
                let value = match descriptor.kind {
                    FieldKind::Bool => Value::Bool(raw != 0),
                    _ => Value::UInt(raw),
                };
                store(fields, field, descriptor.repeated, value);
            }
            Ok(next)
        },
        WireType::LengthDelimited => {
            let (length, start) = read_varint(bytes, cursor)?;
            let length = length as usize;
            let remaining = bytes.len() - start;
            if length > remaining {
                return Err(ProtocolError::LengthOverrun { length, remaining, offset: start });
            }
            let end = start + length;
            let body = &bytes[start..end];

            if let Some(descriptor) = descriptor {
                let value = match descriptor.kind {
                    FieldKind::Message(nested) => Value::Message(decode_message(body, nested)),
                    _ => Value::Str(String::from_utf8_lossy(body).into_owned()),
                };
                store(fields, field, descriptor.repeated, value);
            }
            Ok(end)
        },
        WireType::Fixed64 => skip_fixed(bytes, cursor, 8),
        WireType::Fixed32 => skip_fixed(bytes, cursor, 4),
    }
}

fn skip_fixed(bytes: &[u8], offset: usize, width: usize) -> Result<usize> {
    let end = offset + width;
    if end > bytes.len() {
        return Err(ProtocolError::Truncated { what: "fixed-width value", offset });
    }
    Ok(end)
}

fn store(fields: &mut FieldMap, field: u32, repeated: bool, value: Value) {
    if repeated {
        fields.push(field, value);
    } else {
        fields.insert(field, value);
    }
}
