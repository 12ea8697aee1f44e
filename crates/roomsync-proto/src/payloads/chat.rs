//! Chat payloads: SendMessage, StreamMessages and GetMessageHistory.

use crate::{
    payloads::{WireMessage, optional_str},
    schema::{FieldDescriptor, MessageSchema},
    value::FieldMap,
};

/// Field table for [`SendMessageRequest`].
pub static SEND_MESSAGE_REQUEST_SCHEMA: MessageSchema = MessageSchema {
    name: "MessageRequest",
    fields: &[
        FieldDescriptor::string(1, "userId"),
        FieldDescriptor::string(2, "content"),
        FieldDescriptor::string(3, "roomId"),
        FieldDescriptor::string(4, "username"),
    ],
};

/// Field table for [`MessageResponse`].
pub static MESSAGE_RESPONSE_SCHEMA: MessageSchema = MessageSchema {
    name: "MessageResponse",
    fields: &[
        FieldDescriptor::string(1, "messageId"),
        FieldDescriptor::string(2, "userId"),
        FieldDescriptor::string(3, "content"),
        FieldDescriptor::string(4, "timestamp"),
        FieldDescriptor::string(5, "roomId"),
        FieldDescriptor::string(6, "username"),
    ],
};

/// Field table for [`StreamRequest`].
pub static STREAM_REQUEST_SCHEMA: MessageSchema = MessageSchema {
    name: "StreamRequest",
    fields: &[FieldDescriptor::string(1, "roomId"), FieldDescriptor::string(2, "token")],
};

/// Field table for [`HistoryRequest`].
pub static HISTORY_REQUEST_SCHEMA: MessageSchema = MessageSchema {
    name: "HistoryRequest",
    fields: &[
        FieldDescriptor::string(1, "roomId"),
        FieldDescriptor::string(2, "userId"),
        FieldDescriptor::varint(3, "limit"),
    ],
};

/// Field table for [`HistoryResponse`].
pub static HISTORY_RESPONSE_SCHEMA: MessageSchema = MessageSchema {
    name: "HistoryResponse",
    fields: &[FieldDescriptor::message(1, "messages", &MESSAGE_RESPONSE_SCHEMA).repeated()],
};

/// SendMessage request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendMessageRequest {
    /// Author
    pub user_id: String,
    /// Message body
    pub content: String,
    /// Target room
    pub room_id: String,
    /// Author's display name, sent by some client variants
    pub username: Option<String>,
}

impl WireMessage for SendMessageRequest {
    fn schema() -> &'static MessageSchema {
        &SEND_MESSAGE_REQUEST_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new()
            .with(1, self.user_id.as_str())
            .with(2, self.content.as_str())
            .with(3, self.room_id.as_str());
        if let Some(username) = &self.username {
            fields.insert(4, username.as_str());
        }
        fields
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self {
            user_id: fields.str_or_default(1),
            content: fields.str_or_default(2),
            room_id: fields.str_or_default(3),
            username: optional_str(fields, 4),
        }
    }
}

/// A stored message as returned by SendMessage, StreamMessages and
/// GetMessageHistory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageResponse {
    /// Server-assigned id
    pub message_id: String,
    /// Author
    pub user_id: String,
    /// Message body
    pub content: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Room the message belongs to
    pub room_id: String,
    /// Author's display name, when the server includes it
    pub username: Option<String>,
}

impl WireMessage for MessageResponse {
    fn schema() -> &'static MessageSchema {
        &MESSAGE_RESPONSE_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new()
            .with(1, self.message_id.as_str())
            .with(2, self.user_id.as_str())
            .with(3, self.content.as_str())
            .with(4, self.timestamp.as_str())
            .with(5, self.room_id.as_str());
        if let Some(username) = &self.username {
            fields.insert(6, username.as_str());
        }
        fields
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self {
            message_id: fields.str_or_default(1),
            user_id: fields.str_or_default(2),
            content: fields.str_or_default(3),
            timestamp: fields.str_or_default(4),
            room_id: fields.str_or_default(5),
            username: optional_str(fields, 6),
        }
    }
}

/// StreamMessages request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRequest {
    /// Room to follow
    pub room_id: String,
    /// Session token, when the server requires one
    pub token: Option<String>,
}

impl WireMessage for StreamRequest {
    fn schema() -> &'static MessageSchema {
        &STREAM_REQUEST_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new().with(1, self.room_id.as_str());
        if let Some(token) = &self.token {
            fields.insert(2, token.as_str());
        }
        fields
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self { room_id: fields.str_or_default(1), token: optional_str(fields, 2) }
    }
}

/// GetMessageHistory request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Room to read
    pub room_id: String,
    /// Requesting user, optional
    pub user_id: Option<String>,
    /// Maximum number of messages (most recent first)
    pub limit: u32,
}

impl WireMessage for HistoryRequest {
    fn schema() -> &'static MessageSchema {
        &HISTORY_REQUEST_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new().with(1, self.room_id.as_str()).with(3, self.limit);
        if let Some(user_id) = &self.user_id {
            fields.insert(2, user_id.as_str());
        }
        fields
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self {
            room_id: fields.str_or_default(1),
            user_id: optional_str(fields, 2),
            limit: fields.uint(3).and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
        }
    }
}

/// GetMessageHistory response.
///
/// Messages arrive newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryResponse {
    /// Messages, newest first
    pub messages: Vec<MessageResponse>,
}

impl WireMessage for HistoryResponse {
    fn schema() -> &'static MessageSchema {
        &HISTORY_RESPONSE_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        for message in &self.messages {
            fields.push(1, message.to_fields());
        }
        fields
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self { messages: fields.messages(1).into_iter().map(MessageResponse::from_fields).collect() }
    }
}
