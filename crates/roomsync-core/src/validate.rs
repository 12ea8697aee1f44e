//! Input validation applied before any RPC is issued.
//!
//! Lengths are counted in characters, not bytes.

use crate::error::ValidationError;

/// Longest accepted message body.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Longest accepted room id.
pub const MAX_ROOM_ID_LEN: usize = 30;

/// Shortest accepted username.
pub const MIN_USERNAME_LEN: usize = 2;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 20;

/// Check a message body.
///
/// # Errors
///
/// - `ValidationError::EmptyMessage` if blank
/// - `ValidationError::MessageTooLong` above [`MAX_MESSAGE_LEN`]
pub fn message_body(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let len = body.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(ValidationError::MessageTooLong { len, max: MAX_MESSAGE_LEN });
    }
    Ok(())
}

/// Check a room id.
///
/// # Errors
///
/// - `ValidationError::EmptyRoom` if blank
/// - `ValidationError::RoomTooLong` above [`MAX_ROOM_ID_LEN`]
pub fn room_id(room: &str) -> Result<(), ValidationError> {
    if room.trim().is_empty() {
        return Err(ValidationError::EmptyRoom);
    }
    let len = room.chars().count();
    if len > MAX_ROOM_ID_LEN {
        return Err(ValidationError::RoomTooLong { len, max: MAX_ROOM_ID_LEN });
    }
    Ok(())
}

/// Check a username for registration or login.
///
/// # Errors
///
/// - `ValidationError::EmptyUsername` if blank
/// - `ValidationError::UsernameLength` outside
///   [`MIN_USERNAME_LEN`]..=[`MAX_USERNAME_LEN`]
/// - `ValidationError::UsernameCharset` for characters outside
///   `[A-Za-z0-9_-]`
pub fn username(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    let len = name.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ValidationError::UsernameLength {
            len,
            min: MIN_USERNAME_LEN,
            max: MAX_USERNAME_LEN,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ValidationError::UsernameCharset);
    }
    Ok(())
}

/// Check a password. Only emptiness is enforced client-side.
///
/// # Errors
///
/// - `ValidationError::EmptyPassword` if empty
pub fn password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyPassword);
    }
    Ok(())
}
