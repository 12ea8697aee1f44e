//! gRPC-web body framing.
//!
//! Request and response bodies on the HTTP channel are sequences of frames:
//!
//! ```text
//! [flags: 1 byte][length: u32 big endian][payload: length bytes]
//! ```
//!
//! A data frame (flag bit 0x80 clear) carries one encoded protocol message.
//! The trailer frame (flag bit 0x80 set) carries `name: value` lines with the
//! call status (`grpc-status`, `grpc-message`). Server-streaming responses
//! are many data frames followed by one trailer frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Size of the frame prefix (flags + length).
pub const FRAME_PREFIX_SIZE: usize = 5;

/// Largest accepted frame payload (4 MiB).
pub const MAX_FRAME_PAYLOAD: usize = 4 * 1024 * 1024;

/// Flag bit marking the trailer frame.
pub const TRAILER_FLAG: u8 = 0x80;

/// gRPC status code for success.
pub const STATUS_OK: u32 = 0;

/// Kind of frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Encoded protocol message
    Data,
    /// Call status trailers
    Trailer,
}

/// One gRPC-web frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcWebFrame {
    /// Data or trailer
    pub kind: FrameKind,
    /// Frame payload
    pub payload: Bytes,
}

impl GrpcWebFrame {
    /// Data frame wrapping an encoded message.
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self { kind: FrameKind::Data, payload: payload.into() }
    }

    /// Trailer frame for `status` and an optional message.
    pub fn trailer(trailers: &Trailers) -> Self {
        Self { kind: FrameKind::Trailer, payload: trailers.to_bytes() }
    }

    /// Append the framed bytes to `dst`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds
    ///   [`MAX_FRAME_PAYLOAD`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let flags = match self.kind {
            FrameKind::Data => 0,
            FrameKind::Trailer => TRAILER_FLAG,
        };
        dst.put_u8(flags);
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Framed bytes in a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_PREFIX_SIZE + self.payload.len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode the frame at the start of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed. Trailing bytes are
    /// left for the next call.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than 5 bytes are available
    /// - `ProtocolError::PayloadTooLarge` if the length exceeds the limit
    /// - `ProtocolError::FrameTruncated` if the payload is incomplete
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < FRAME_PREFIX_SIZE {
            return Err(ProtocolError::FrameTooShort {
                expected: FRAME_PREFIX_SIZE,
                actual: bytes.len(),
            });
        }

        let flags = bytes[0];
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

        if length > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: length, max: MAX_FRAME_PAYLOAD });
        }

        let total = FRAME_PREFIX_SIZE + length;
        if bytes.len() < total {
            return Err(ProtocolError::FrameTruncated {
                expected: length,
                actual: bytes.len() - FRAME_PREFIX_SIZE,
            });
        }

        let kind = if flags & TRAILER_FLAG != 0 { FrameKind::Trailer } else { FrameKind::Data };
        let payload = Bytes::copy_from_slice(&bytes[FRAME_PREFIX_SIZE..total]);

        Ok((Self { kind, payload }, total))
    }
}

/// Call status carried by the trailer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailers {
    /// gRPC status code (0 is success)
    pub status: u32,
    /// Optional human-readable status message
    pub message: Option<String>,
}

impl Trailers {
    /// Successful status.
    pub fn ok() -> Self {
        Self { status: STATUS_OK, message: None }
    }

    /// Failed status with a message.
    pub fn error(status: u32, message: impl Into<String>) -> Self {
        Self { status, message: Some(message.into()) }
    }

    /// Returns true for status 0.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Parse `name: value` lines. Unknown headers are ignored; a missing or
    /// unparsable `grpc-status` is treated as status 2 (unknown).
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let mut status = None;
        let mut message = None;

        for line in text.split("\r\n").flat_map(|l| l.split('\n')) {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "grpc-status" => status = value.trim().parse::<u32>().ok(),
                "grpc-message" => message = Some(value.trim().to_string()),
                _ => {},
            }
        }

        Self { status: status.unwrap_or(2), message }
    }

    fn to_bytes(&self) -> Bytes {
        let mut text = format!("grpc-status:{}\r\n", self.status);
        if let Some(message) = &self.message {
            text.push_str(&format!("grpc-message:{message}\r\n"));
        }
        Bytes::from(text)
    }
}

/// Incremental frame decoder for chunked response bodies.
///
/// Chunks from the HTTP body are pushed in as they arrive; complete frames
/// are pulled out with [`FrameDecoder::next_frame`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a body chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if a frame exceeds the limit; the
    ///   buffer is unusable afterwards
    pub fn next_frame(&mut self) -> Result<Option<GrpcWebFrame>> {
        match GrpcWebFrame::decode(&self.buf) {
            Ok((frame, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(frame))
            },
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_layout() {
        let bytes = GrpcWebFrame::data(vec![0x0A, 0x01, 0x61]).to_bytes().unwrap();
        assert_eq!(&bytes[..], &[0x00, 0, 0, 0, 3, 0x0A, 0x01, 0x61]);
    }

    #[test]
    fn trailer_frame_round_trip() {
        let frame = GrpcWebFrame::trailer(&Trailers::error(16, "unauthenticated"));
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes[0], TRAILER_FLAG);

        let (decoded, consumed) = GrpcWebFrame::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.kind, FrameKind::Trailer);

        let trailers = Trailers::parse(&decoded.payload);
        assert_eq!(trailers.status, 16);
        assert_eq!(trailers.message.as_deref(), Some("unauthenticated"));
        assert!(!trailers.is_ok());
    }

    #[test]
    fn parse_trailers_case_insensitive() {
        let trailers = Trailers::parse(b"Grpc-Status: 0\r\nGrpc-Message: fine\r\nx-other: 1\r\n");
        assert!(trailers.is_ok());
        assert_eq!(trailers.message.as_deref(), Some("fine"));
    }

    #[test]
    fn missing_status_is_unknown() {
        assert_eq!(Trailers::parse(b"grpc-message: lost\r\n").status, 2);
    }

    #[test]
    fn reject_short_prefix() {
        let result = GrpcWebFrame::decode(&[0x00, 0x00]);
        assert_eq!(result, Err(ProtocolError::FrameTooShort { expected: 5, actual: 2 }));
    }

    #[test]
    fn reject_truncated_payload() {
        let result = GrpcWebFrame::decode(&[0x00, 0, 0, 0, 10, 1, 2]);
        assert_eq!(result, Err(ProtocolError::FrameTruncated { expected: 10, actual: 2 }));
    }

    #[test]
    fn reject_oversized_length() {
        let result = GrpcWebFrame::decode(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn decoder_reassembles_split_frames() {
        let mut wire = Vec::new();
        GrpcWebFrame::data(vec![1, 2, 3]).encode(&mut wire).unwrap();
        GrpcWebFrame::data(vec![4]).encode(&mut wire).unwrap();
        GrpcWebFrame::trailer(&Trailers::ok()).encode(&mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in wire.chunks(3) {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], &[1, 2, 3]);
        assert_eq!(&frames[1].payload[..], &[4]);
        assert_eq!(frames[2].kind, FrameKind::Trailer);
        assert_eq!(decoder.buffered(), 0);
    }
}
