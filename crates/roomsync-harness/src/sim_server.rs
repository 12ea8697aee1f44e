//! In-memory chat server for deterministic tests.
//!
//! `SimChatServer` answers every RPC of the chat service from in-process
//! state. It speaks the same encoded request and response messages as a real
//! server, so the codec, the manager and the runtime are exercised end to end
//! without sockets.
//!
//! History is returned newest first, as the production server does. Stream
//! subscribers receive messages posted after they subscribed.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use roomsync_client::{Metadata, StreamEvent, StreamHandle, TransportError};
use roomsync_proto::{
    AuthRequest, AuthResponse, HistoryRequest, HistoryResponse, MessageResponse, Method,
    SendMessageRequest, StreamRequest, ValidateTokenRequest, ValidateTokenResponse, WireMessage,
};
use tokio::sync::mpsc;

/// gRPC status for a missing or invalid token.
pub const STATUS_UNAUTHENTICATED: u32 = 16;

/// gRPC status for a malformed request.
pub const STATUS_INVALID_ARGUMENT: u32 = 3;

/// Timestamp of the first message; later messages count up by one second.
const EPOCH_START: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    username: String,
    password: String,
}

#[derive(Default)]
struct ServerState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    rooms: HashMap<String, Vec<MessageResponse>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<StreamEvent>>>,
    next_id: u64,
}

impl ServerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn account_by_id(&self, user_id: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.user_id == user_id)
    }

    fn user_for_token(&self, token: Option<&str>) -> Option<&Account> {
        let user_id = self.tokens.get(token?)?;
        self.account_by_id(user_id)
    }

    fn issue_token(&mut self, user_id: &str) -> String {
        let token = format!("token-{}", self.next_id());
        self.tokens.insert(token.clone(), user_id.to_string());
        token
    }

    fn post(
        &mut self,
        room_id: &str,
        user_id: &str,
        username: &str,
        content: &str,
    ) -> MessageResponse {
        let n = self.next_id();
        let message = MessageResponse {
            message_id: format!("msg-{n}"),
            user_id: user_id.to_string(),
            content: content.to_string(),
            timestamp: (EPOCH_START + n).to_string(),
            room_id: room_id.to_string(),
            username: Some(username.to_string()).filter(|u| !u.is_empty()),
        };
        self.rooms.entry(room_id.to_string()).or_default().push(message.clone());
        self.broadcast(room_id, &message);
        message
    }

    fn broadcast(&mut self, room_id: &str, message: &MessageResponse) {
        let Some(subscribers) = self.subscribers.get_mut(room_id) else {
            return;
        };
        let Ok(payload) = message.encode() else {
            return;
        };
        // Closed or full subscribers are dropped
        subscribers.retain(|tx| tx.try_send(StreamEvent::Data(payload.clone())).is_ok());
    }
}

/// In-memory chat server.
///
/// Shared between transports with [`SharedSimServer`]. All operations are
/// synchronous and take effect immediately.
#[derive(Default)]
pub struct SimChatServer {
    state: Mutex<ServerState>,
}

/// Server shared by several transports or drivers.
pub type SharedSimServer = Arc<SimChatServer>;

/// Create a server ready to share.
pub fn create_shared_server() -> SharedSimServer {
    Arc::new(SimChatServer::new())
}

impl SimChatServer {
    /// Empty server.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        // A panicking test thread must not hide the state from later checks
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create an account directly and return its user id.
    pub fn add_user(&self, username: &str, password: &str) -> String {
        let mut state = self.state();
        let user_id = format!("user-{}", state.next_id());
        state.accounts.insert(
            username.to_string(),
            Account {
                user_id: user_id.clone(),
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        user_id
    }

    /// Post a message on behalf of `user_id`, as another client would.
    ///
    /// Subscribers of the room receive it immediately.
    pub fn post_as(
        &self,
        room_id: &str,
        user_id: &str,
        username: &str,
        content: &str,
    ) -> MessageResponse {
        self.state().post(room_id, user_id, username, content)
    }

    /// Every message in a room, oldest first.
    pub fn room_messages(&self, room_id: &str) -> Vec<MessageResponse> {
        self.state().rooms.get(room_id).cloned().unwrap_or_default()
    }

    /// Open stream subscriptions for a room.
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        let mut state = self.state();
        let Some(subscribers) = state.subscribers.get_mut(room_id) else {
            return 0;
        };
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Close every stream on a room cleanly.
    pub fn end_streams(&self, room_id: &str) {
        for tx in self.state().subscribers.remove(room_id).unwrap_or_default() {
            let _ = tx.try_send(StreamEvent::End);
        }
    }

    /// Fail every stream on a room.
    pub fn fail_streams(&self, room_id: &str, reason: &str) {
        for tx in self.state().subscribers.remove(room_id).unwrap_or_default() {
            let _ = tx.try_send(StreamEvent::Error(TransportError::Stream(reason.to_string())));
        }
    }

    /// Answer a unary call.
    ///
    /// # Errors
    ///
    /// - `TransportError::Status` for calls a real server rejects with a
    ///   status (bad token on send, streaming method called as unary)
    pub fn handle_call(
        &self,
        method: Method,
        request: &[u8],
        metadata: &Metadata,
    ) -> Result<Bytes, TransportError> {
        let response = match method {
            Method::Register => self.register(&AuthRequest::decode(request)).encode(),
            Method::Login => self.login(&AuthRequest::decode(request)).encode(),
            Method::ValidateToken => {
                self.validate_token(&ValidateTokenRequest::decode(request)).encode()
            },
            Method::SendMessage => {
                self.send_message(&SendMessageRequest::decode(request), metadata)?.encode()
            },
            Method::GetMessageHistory => self.history(&HistoryRequest::decode(request)).encode(),
            Method::StreamMessages => {
                return Err(TransportError::Status {
                    code: STATUS_INVALID_ARGUMENT,
                    message: format!("{method} is a streaming method"),
                });
            },
        };
        response.map_err(TransportError::from)
    }

    /// Subscribe to a room's new messages.
    ///
    /// # Errors
    ///
    /// - `TransportError::Status` if `method` is not the streaming method or
    ///   the room id is empty
    pub fn open_stream(
        &self,
        method: Method,
        request: &[u8],
        _metadata: &Metadata,
    ) -> Result<StreamHandle, TransportError> {
        if method != Method::StreamMessages {
            return Err(TransportError::Status {
                code: STATUS_INVALID_ARGUMENT,
                message: format!("{method} is not a streaming method"),
            });
        }

        let request = StreamRequest::decode(request);
        if request.room_id.is_empty() {
            return Err(TransportError::Status {
                code: STATUS_INVALID_ARGUMENT,
                message: "room id required".to_string(),
            });
        }

        let (tx, handle) = StreamHandle::channel();
        self.state().subscribers.entry(request.room_id).or_default().push(tx);
        Ok(handle)
    }

    fn register(&self, request: &AuthRequest) -> AuthResponse {
        let mut state = self.state();
        if state.accounts.contains_key(&request.username) {
            return rejected("Username already exists");
        }

        let user_id = format!("user-{}", state.next_id());
        state.accounts.insert(
            request.username.clone(),
            Account {
                user_id: user_id.clone(),
                username: request.username.clone(),
                password: request.password.clone(),
            },
        );
        let token = state.issue_token(&user_id);

        AuthResponse {
            token,
            user_id,
            username: request.username.clone(),
            success: true,
            error: String::new(),
        }
    }

    fn login(&self, request: &AuthRequest) -> AuthResponse {
        let mut state = self.state();
        let Some(account) = state.accounts.get(&request.username).cloned() else {
            return rejected("Invalid username or password");
        };
        if account.password != request.password {
            return rejected("Invalid username or password");
        }

        let token = state.issue_token(&account.user_id);
        AuthResponse {
            token,
            user_id: account.user_id,
            username: account.username,
            success: true,
            error: String::new(),
        }
    }

    fn validate_token(&self, request: &ValidateTokenRequest) -> ValidateTokenResponse {
        let state = self.state();
        match state.user_for_token(Some(request.token.as_str())) {
            Some(account) => ValidateTokenResponse {
                user_id: account.user_id.clone(),
                username: account.username.clone(),
                valid: true,
            },
            None => ValidateTokenResponse::default(),
        }
    }

    fn send_message(
        &self,
        request: &SendMessageRequest,
        metadata: &Metadata,
    ) -> Result<MessageResponse, TransportError> {
        let mut state = self.state();
        let Some(account) = state.user_for_token(metadata.bearer_token()).cloned() else {
            return Err(TransportError::Status {
                code: STATUS_UNAUTHENTICATED,
                message: "invalid token".to_string(),
            });
        };
        if request.room_id.is_empty() || request.content.trim().is_empty() {
            return Err(TransportError::Status {
                code: STATUS_INVALID_ARGUMENT,
                message: "room id and content required".to_string(),
            });
        }

        Ok(state.post(&request.room_id, &account.user_id, &account.username, &request.content))
    }

    fn history(&self, request: &HistoryRequest) -> HistoryResponse {
        let state = self.state();
        let messages = state
            .rooms
            .get(&request.room_id)
            .map(|all| all.iter().rev().take(request.limit as usize).cloned().collect())
            .unwrap_or_default();
        HistoryResponse { messages }
    }
}

fn rejected(reason: &str) -> AuthResponse {
    AuthResponse { error: reason.to_string(), ..AuthResponse::default() }
}
