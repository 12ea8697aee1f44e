//! Wire protocol for the room chat service.
//!
//! A hand-written tag/value binary codec plus the typed messages exchanged
//! with the chat service. There is no schema compiler: each message declares
//! a static field table ([`MessageSchema`]) and the generic codec in
//! [`wire`] does the rest.
//!
//! # Layers
//!
//! - [`varint`]: base-128 integers with a 28-bit budget
//! - [`wire`]: tags, [`encode_field`], [`encode_message`], [`decode_message`]
//! - [`payloads`]: typed request and response structs
//! - [`method`]: RPC names, paths and kinds
//! - [`frame`]: gRPC-web body framing used on the HTTP channel
//!
//! Decoding is total. Malformed input produces a partial [`FieldMap`] rather
//! than an error; [`decode_message_checked`] reports what stopped it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod method;
pub mod payloads;
pub mod schema;
pub mod value;
pub mod varint;
pub mod wire;

pub use errors::{ProtocolError, Result};
pub use frame::{FrameDecoder, FrameKind, GrpcWebFrame, Trailers};
pub use method::{Method, MethodKind, SERVICE_NAME};
pub use payloads::{
    WireMessage,
    auth::{AuthRequest, AuthResponse, ValidateTokenRequest, ValidateTokenResponse},
    chat::{HistoryRequest, HistoryResponse, MessageResponse, SendMessageRequest, StreamRequest},
};
pub use schema::{FieldDescriptor, FieldKind, MessageSchema};
pub use value::{FieldMap, Value};
pub use wire::{WireType, decode_message, decode_message_checked, encode_field, encode_message};
