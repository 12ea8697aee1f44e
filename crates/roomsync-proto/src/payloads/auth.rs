//! Authentication payloads: Register, Login and ValidateToken.

use crate::{
    payloads::WireMessage,
    schema::{FieldDescriptor, MessageSchema},
    value::FieldMap,
};

/// Field table for [`AuthRequest`].
pub static AUTH_REQUEST_SCHEMA: MessageSchema = MessageSchema {
    name: "UserRequest",
    fields: &[FieldDescriptor::string(1, "username"), FieldDescriptor::string(2, "password")],
};

/// Field table for [`AuthResponse`].
pub static AUTH_RESPONSE_SCHEMA: MessageSchema = MessageSchema {
    name: "AuthResponse",
    fields: &[
        FieldDescriptor::string(1, "token"),
        FieldDescriptor::string(2, "userId"),
        FieldDescriptor::string(3, "username"),
        FieldDescriptor::bool(4, "success"),
        FieldDescriptor::string(5, "error"),
    ],
};

/// Field table for [`ValidateTokenRequest`].
pub static VALIDATE_TOKEN_REQUEST_SCHEMA: MessageSchema =
    MessageSchema { name: "TokenRequest", fields: &[FieldDescriptor::string(1, "token")] };

/// Field table for [`ValidateTokenResponse`].
pub static VALIDATE_TOKEN_RESPONSE_SCHEMA: MessageSchema = MessageSchema {
    name: "ValidateTokenResponse",
    fields: &[
        FieldDescriptor::string(1, "userId"),
        FieldDescriptor::string(2, "username"),
        FieldDescriptor::bool(3, "valid"),
    ],
};

/// Register and Login request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    /// Account name
    pub username: String,
    /// Plaintext password (the channel is expected to be TLS)
    pub password: String,
}

impl WireMessage for AuthRequest {
    fn schema() -> &'static MessageSchema {
        &AUTH_REQUEST_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new().with(1, self.username.as_str()).with(2, self.password.as_str())
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self { username: fields.str_or_default(1), password: fields.str_or_default(2) }
    }
}

/// Register and Login response.
///
/// `success == false` carries the rejection reason in `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResponse {
    /// Session token
    pub token: String,
    /// Server-assigned user id
    pub user_id: String,
    /// Canonical username
    pub username: String,
    /// Credentials accepted
    pub success: bool,
    /// Rejection reason
    pub error: String,
}

impl WireMessage for AuthResponse {
    fn schema() -> &'static MessageSchema {
        &AUTH_RESPONSE_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with(1, self.token.as_str())
            .with(2, self.user_id.as_str())
            .with(3, self.username.as_str())
            .with(4, self.success)
            .with(5, self.error.as_str())
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self {
            token: fields.str_or_default(1),
            user_id: fields.str_or_default(2),
            username: fields.str_or_default(3),
            success: fields.flag(4),
            error: fields.str_or_default(5),
        }
    }
}

/// ValidateToken request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateTokenRequest {
    /// Token to check
    pub token: String,
}

impl WireMessage for ValidateTokenRequest {
    fn schema() -> &'static MessageSchema {
        &VALIDATE_TOKEN_REQUEST_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new().with(1, self.token.as_str())
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self { token: fields.str_or_default(1) }
    }
}

/// ValidateToken response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateTokenResponse {
    /// Owner of the token
    pub user_id: String,
    /// Owner's username
    pub username: String,
    /// Token is still valid
    pub valid: bool,
}

impl WireMessage for ValidateTokenResponse {
    fn schema() -> &'static MessageSchema {
        &VALIDATE_TOKEN_RESPONSE_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with(1, self.user_id.as_str())
            .with(2, self.username.as_str())
            .with(3, self.valid)
    }

    fn from_fields(fields: &FieldMap) -> Self {
        Self {
            user_id: fields.str_or_default(1),
            username: fields.str_or_default(2),
            valid: fields.flag(3),
        }
    }
}
