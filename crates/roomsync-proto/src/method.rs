//! RPC method table for the chat service.

use std::fmt;

/// Fully qualified service name.
pub const SERVICE_NAME: &str = "chat.ChatService";

/// Response shape of an RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One request, one response
    Unary,
    /// One request, a sequence of responses terminated by trailers
    ServerStreaming,
}

/// RPCs exposed by the chat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Create an account
    Register,
    /// Exchange credentials for a session token
    Login,
    /// Check a stored session token
    ValidateToken,
    /// Post a message to a room
    SendMessage,
    /// Follow new messages in a room
    StreamMessages,
    /// Fetch the most recent messages of a room
    GetMessageHistory,
}

impl Method {
    /// Every method, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Register,
        Self::Login,
        Self::ValidateToken,
        Self::SendMessage,
        Self::StreamMessages,
        Self::GetMessageHistory,
    ];

    /// Unqualified method name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Register => "Register",
            Self::Login => "Login",
            Self::ValidateToken => "ValidateToken",
            Self::SendMessage => "SendMessage",
            Self::StreamMessages => "StreamMessages",
            Self::GetMessageHistory => "GetMessageHistory",
        }
    }

    /// HTTP path, `/chat.ChatService/<Name>`.
    pub fn path(self) -> String {
        format!("/{SERVICE_NAME}/{}", self.name())
    }

    /// Unary or server-streaming.
    pub fn kind(self) -> MethodKind {
        match self {
            Self::StreamMessages => MethodKind::ServerStreaming,
            _ => MethodKind::Unary,
        }
    }

    /// Method for an HTTP path, if it names one of ours.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.strip_prefix('/')?.strip_prefix(SERVICE_NAME)?.strip_prefix('/')?;
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_service_qualified() {
        assert_eq!(Method::SendMessage.path(), "/chat.ChatService/SendMessage");
        assert_eq!(Method::GetMessageHistory.path(), "/chat.ChatService/GetMessageHistory");
    }

    #[test]
    fn only_stream_messages_is_streaming() {
        for method in Method::ALL {
            let expected = if method == Method::StreamMessages {
                MethodKind::ServerStreaming
            } else {
                MethodKind::Unary
            };
            assert_eq!(method.kind(), expected, "{method}");
        }
    }

    #[test]
    fn from_path_inverts_path() {
        for method in Method::ALL {
            assert_eq!(Method::from_path(&method.path()), Some(method));
        }
        assert_eq!(Method::from_path("/other.Service/Login"), None);
        assert_eq!(Method::from_path("/chat.ChatService/Nope"), None);
    }
}
