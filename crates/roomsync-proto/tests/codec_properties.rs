//! Property-based tests for the tag/value codec.
//!
//! These tests verify that encoding and decoding agree for all representable
//! inputs, and that decoding arbitrary bytes never panics.

use roomsync_proto::{
    FieldMap, GrpcWebFrame, HistoryRequest, HistoryResponse, MessageResponse, SendMessageRequest,
    Value, WireMessage, WireType, decode_message, decode_message_checked, encode_field,
    payloads::chat::{HISTORY_RESPONSE_SCHEMA, MESSAGE_RESPONSE_SCHEMA},
    varint::{MAX_VARINT_VALUE, encode_varint, read_varint},
};
use proptest::prelude::*;

/// Strategy for strings that survive a UTF-8 round trip
fn arbitrary_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _:.éü☃-]{0,40}"
}

/// Strategy for stored messages
fn arbitrary_message() -> impl Strategy<Value = MessageResponse> {
    (
        arbitrary_text(),
        arbitrary_text(),
        arbitrary_text(),
        arbitrary_text(),
        arbitrary_text(),
        prop::option::of("[a-z]{1,12}"),
    )
        .prop_map(|(message_id, user_id, content, timestamp, room_id, username)| {
            MessageResponse { message_id, user_id, content, timestamp, room_id, username }
        })
}

#[test]
fn known_fixture_decodes() {
    let bytes = hex::decode("0a03616263").expect("valid hex");
    let fields = decode_message(&bytes, &MESSAGE_RESPONSE_SCHEMA);

    assert_eq!(fields.len(), 1);
    assert_eq!(fields.str(1), Some("abc"));
}

#[test]
fn known_request_encoding() {
    let request = SendMessageRequest {
        user_id: "u1".into(),
        content: "hi".into(),
        room_id: "r".into(),
        username: None,
    };
    let bytes = request.encode().expect("encode should succeed");
    assert_eq!(hex::encode(&bytes), "0a027531120268691a0172");
}

#[test]
fn prop_varint_roundtrip() {
    proptest!(|(value in 0..=MAX_VARINT_VALUE)| {
        let mut buf = Vec::new();
        encode_varint(value, &mut buf).expect("value within budget");

        let (decoded, next) = read_varint(&buf, 0).expect("decode should succeed");

        // PROPERTY: value and consumed length are preserved
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(next, buf.len());
        prop_assert!(buf.len() <= 4);
    });
}

#[test]
fn prop_string_field_roundtrip() {
    proptest!(|(text in arbitrary_text(), field in 1u32..=6)| {
        let bytes = encode_field(field, WireType::LengthDelimited, &Value::from(text.as_str()))
            .expect("encode should succeed");
        let fields = decode_message(&bytes, &MESSAGE_RESPONSE_SCHEMA);

        // PROPERTY: the string comes back under the same field number
        prop_assert_eq!(fields.str(field), Some(text.as_str()));
    });
}

#[test]
fn prop_limit_roundtrip() {
    proptest!(|(limit in 0u32..=1_000_000, room in "[a-z]{1,10}")| {
        let request = HistoryRequest { room_id: room, user_id: None, limit };
        let decoded = HistoryRequest::decode(&request.encode().expect("encode should succeed"));

        prop_assert_eq!(decoded, request);
    });
}

#[test]
fn prop_message_roundtrip() {
    proptest!(|(message in arbitrary_message())| {
        let decoded = MessageResponse::decode(&message.encode().expect("encode should succeed"));

        // PROPERTY: every non-default field is reproduced
        prop_assert_eq!(decoded, message);
    });
}

#[test]
fn prop_history_roundtrip_preserves_order() {
    proptest!(|(messages in prop::collection::vec(arbitrary_message(), 0..20))| {
        let response = HistoryResponse { messages };
        let decoded = HistoryResponse::decode(&response.encode().expect("encode should succeed"));

        prop_assert_eq!(decoded, response);
    });
}

#[test]
fn prop_decode_arbitrary_bytes_never_panics() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..256))| {
        let (fields, _error) = decode_message_checked(&bytes, &HISTORY_RESPONSE_SCHEMA);

        // PROPERTY: only the declared field can appear
        for (number, _) in fields.iter() {
            prop_assert_eq!(number, 1);
        }
    });
}

#[test]
fn prop_truncation_yields_prefix() {
    proptest!(|(messages in prop::collection::vec(arbitrary_message(), 1..8), cut in any::<prop::sample::Index>())| {
        let response = HistoryResponse { messages };
        let bytes = response.encode().expect("encode should succeed");
        let cut = cut.index(bytes.len() + 1);

        let decoded = HistoryResponse::decode(&bytes[..cut]);

        // PROPERTY: a truncated history is a prefix of the full one
        prop_assert!(decoded.messages.len() <= response.messages.len());
        for (got, want) in decoded.messages.iter().zip(&response.messages) {
            prop_assert_eq!(got, want);
        }
    });
}

#[test]
fn prop_unknown_fields_are_skipped() {
    proptest!(|(message in arbitrary_message(), extra in 7u32..1000, noise in arbitrary_text())| {
        let mut fields = message.to_fields();
        fields.insert(extra, noise.as_str());
        fields.insert(extra + 1000, 42u64);
        let bytes = roomsync_proto::encode_message(&fields).expect("encode should succeed");

        // PROPERTY: unknown fields do not disturb known ones
        prop_assert_eq!(MessageResponse::decode(&bytes), message);
    });
}

#[test]
fn prop_frame_roundtrip() {
    proptest!(|(payload in prop::collection::vec(any::<u8>(), 0..512))| {
        let bytes = GrpcWebFrame::data(payload.clone()).to_bytes().expect("encode should succeed");
        let (frame, consumed) = GrpcWebFrame::decode(&bytes).expect("decode should succeed");

        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(&frame.payload[..], &payload[..]);
    });
}

#[test]
fn empty_field_map_encodes_to_nothing() {
    let bytes = roomsync_proto::encode_message(&FieldMap::new()).expect("encode should succeed");
    assert!(bytes.is_empty());
}
