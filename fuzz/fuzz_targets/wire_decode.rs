//! Fuzz target for the tag/value decoder
//!
//! Decodes arbitrary bytes against every message schema.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - Re-encoding a decoded message yields well-formed bytes

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomsync_proto::{
    decode_message_checked, encode_message,
    payloads::{auth, chat},
    MessageSchema,
};

static SCHEMAS: [&MessageSchema; 9] = [
    &auth::AUTH_REQUEST_SCHEMA,
    &auth::AUTH_RESPONSE_SCHEMA,
    &auth::VALIDATE_TOKEN_REQUEST_SCHEMA,
    &auth::VALIDATE_TOKEN_RESPONSE_SCHEMA,
    &chat::SEND_MESSAGE_REQUEST_SCHEMA,
    &chat::MESSAGE_RESPONSE_SCHEMA,
    &chat::STREAM_REQUEST_SCHEMA,
    &chat::HISTORY_REQUEST_SCHEMA,
    &chat::HISTORY_RESPONSE_SCHEMA,
];

fuzz_target!(|data: &[u8]| {
    for schema in SCHEMAS {
        let (fields, _error) = decode_message_checked(data, schema);

        // Values that exceed the varint budget cannot be re-encoded; that is
        // a legal outcome for hostile input
        let Ok(encoded) = encode_message(&fields) else {
            continue;
        };
        let (_, error) = decode_message_checked(&encoded, schema);
        assert!(error.is_none(), "encoder produced malformed bytes: {error:?}");
    }
});
