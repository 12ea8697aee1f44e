//! Base-128 varints.
//!
//! Seven payload bits per byte, least significant group first, with 0x80 as
//! the continuation bit. Decoding enforces a 28-bit shift budget: a varint
//! may occupy at most [`MAX_VARINT_BYTES`] bytes, so runaway continuation
//! bits in hostile input are rejected after four bytes instead of being
//! consumed indefinitely.

use bytes::BufMut;

use crate::errors::{ProtocolError, Result};

/// Maximum bytes a varint may occupy (28-bit shift budget).
pub const MAX_VARINT_BYTES: usize = 4;

/// Largest value that round-trips through the varint codec.
pub const MAX_VARINT_VALUE: u64 = (1 << (7 * MAX_VARINT_BYTES)) - 1;

/// Append `value` as a varint.
///
/// # Errors
///
/// - `ProtocolError::ValueTooLarge` if `value > MAX_VARINT_VALUE`
pub fn encode_varint(value: u64, dst: &mut impl BufMut) -> Result<()> {
    if value > MAX_VARINT_VALUE {
        return Err(ProtocolError::ValueTooLarge { value, max: MAX_VARINT_VALUE });
    }

    let mut remaining = value;
    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            dst.put_u8(byte);
            return Ok(());
        }
        dst.put_u8(byte | 0x80);
    }
}

/// Number of bytes `value` occupies when varint-encoded.
pub fn encoded_len(value: u64) -> usize {
    let mut len = 1;
    let mut remaining = value >> 7;
    while remaining != 0 {
        len += 1;
        remaining >>= 7;
    }
    len
}

/// Read a varint starting at `offset`.
///
/// Returns the decoded value and the offset just past it.
///
/// # Errors
///
/// - `ProtocolError::Truncated` if the buffer ends before the final byte
/// - `ProtocolError::VarintOverflow` if more than [`MAX_VARINT_BYTES`] bytes
///   carry the continuation bit
pub fn read_varint(buf: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut cursor = offset;

    for index in 0..MAX_VARINT_BYTES {
        let Some(&byte) = buf.get(cursor) else {
            return Err(ProtocolError::Truncated { what: "varint", offset });
        };
        cursor += 1;

        value |= u64::from(byte & 0x7F) << (7 * index);

        if byte & 0x80 == 0 {
            return Ok((value, cursor));
        }
    }

    Err(ProtocolError::VarintOverflow { offset, max_bytes: MAX_VARINT_BYTES })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn single_byte_values() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7F]);
    }

    #[test]
    fn multi_byte_values() {
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xAC, 0x02]);
        assert_eq!(encode(MAX_VARINT_VALUE), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn encoded_len_matches_encoding() {
        for value in [0, 1, 127, 128, 16_383, 16_384, MAX_VARINT_VALUE] {
            assert_eq!(encoded_len(value), encode(value).len(), "value {value}");
        }
    }

    #[test]
    fn reject_value_above_budget() {
        let mut buf = Vec::new();
        let result = encode_varint(MAX_VARINT_VALUE + 1, &mut buf);
        assert!(matches!(result, Err(ProtocolError::ValueTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn read_returns_next_offset() {
        let buf = [0xAC, 0x02, 0x05];
        assert_eq!(read_varint(&buf, 0), Ok((300, 2)));
        assert_eq!(read_varint(&buf, 2), Ok((5, 3)));
    }

    #[test]
    fn read_truncated_varint() {
        let buf = [0x80, 0x80];
        assert_eq!(read_varint(&buf, 0), Err(ProtocolError::Truncated { what: "varint", offset: 0 }));
        assert_eq!(read_varint(&buf, 2), Err(ProtocolError::Truncated { what: "varint", offset: 2 }));
    }

    #[test]
    fn read_rejects_fifth_byte() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(
            read_varint(&buf, 0),
            Err(ProtocolError::VarintOverflow { offset: 0, max_bytes: MAX_VARINT_BYTES })
        );
    }
}
