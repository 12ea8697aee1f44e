//! Chat message as held by the local store.

use std::fmt;

use roomsync_proto::MessageResponse;

/// When a message was sent, as reported by the server.
///
/// Servers report either an RFC 3339 string or a numeric epoch value; both
/// are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    /// Textual timestamp
    Text(String),
    /// Numeric epoch timestamp
    Epoch(u64),
}

impl Timestamp {
    /// Interpret a wire timestamp. All-digit strings are numeric.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty()
            && trimmed.bytes().all(|b| b.is_ascii_digit())
            && let Ok(value) = trimmed.parse()
        {
            return Self::Epoch(value);
        }
        Self::Text(raw.to_string())
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Epoch(value) => write!(f, "{value}"),
        }
    }
}

/// A message in a room.
///
/// Identity is `id`. The store never holds two messages with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned id
    pub id: String,
    /// Author's user id
    pub author_id: String,
    /// Author's display name; empty until resolved
    pub display_name: String,
    /// Message text
    pub body: String,
    /// Send time
    pub sent_at: Timestamp,
    /// Room the message belongs to
    pub room_id: String,
}

impl Message {
    /// Returns true if the message carries an author and a body.
    ///
    /// Stream pushes failing this check are dropped.
    pub fn is_displayable(&self) -> bool {
        !self.author_id.is_empty() && !self.body.is_empty()
    }

    /// Returns true once a display name has been attached.
    pub fn has_display_name(&self) -> bool {
        !self.display_name.is_empty()
    }
}

impl From<MessageResponse> for Message {
    fn from(response: MessageResponse) -> Self {
        Self {
            id: response.message_id,
            author_id: response.user_id,
            display_name: response.username.unwrap_or_default(),
            body: response.content,
            sent_at: Timestamp::parse(&response.timestamp),
            room_id: response.room_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_timestamps_are_detected() {
        assert_eq!(Timestamp::parse("1700000000000"), Timestamp::Epoch(1_700_000_000_000));
        assert_eq!(
            Timestamp::parse("2024-01-01T00:00:00Z"),
            Timestamp::Text("2024-01-01T00:00:00Z".to_string())
        );
        assert_eq!(Timestamp::parse(""), Timestamp::Text(String::new()));
    }

    #[test]
    fn from_response_keeps_optional_name() {
        let message = Message::from(MessageResponse {
            message_id: "m1".into(),
            user_id: "u1".into(),
            content: "hi".into(),
            timestamp: "42".into(),
            room_id: "general".into(),
            username: None,
        });

        assert_eq!(message.id, "m1");
        assert!(!message.has_display_name());
        assert_eq!(message.sent_at, Timestamp::Epoch(42));
        assert!(message.is_displayable());
    }

    #[test]
    fn missing_author_or_body_is_not_displayable() {
        let mut message = Message::from(MessageResponse {
            message_id: "m1".into(),
            user_id: String::new(),
            content: "hi".into(),
            ..MessageResponse::default()
        });
        assert!(!message.is_displayable());

        message.author_id = "u1".into();
        message.body.clear();
        assert!(!message.is_displayable());
    }
}
