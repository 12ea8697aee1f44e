//! Room connection state machine.
//!
//! Arbitrates between the push stream and the fallback poll loop, merges
//! incoming batches into the [`MessageStore`], and tracks optimistic sends.
//! Uses the action pattern: [`ConnectionManager::handle`] takes the current
//! time and an event and returns actions for the driver to execute. No I/O
//! happens here.
//!
//! # State Machine
//!
//! ```text
//!                 Connect           stream opened
//! ┌──────────────┐─────>┌────────────┐──────────────>┌───────────┐
//! │ Disconnected │      │ Connecting │               │ Streaming │
//! └──────────────┘<─────└────────────┘               └───────────┘
//!        ^  Disconnect        │ open failed /              │ error / end
//!        │                    │ no streaming               ↓
//!        │                    └──────────────────────>┌─────────┐
//!        └────────────────────────────────────────────│ Polling │
//!                        Disconnect                   └─────────┘
//! ```
//!
//! # Invariants
//!
//! - Every completion carries the [`Ticket`] of the action that caused it.
//!   Tickets from an earlier generation are ignored, so nothing issued before
//!   a disconnect can touch the store afterwards.
//! - At most one send and at most one poll are outstanding.
//! - Poll and refresh snapshots merge against the store revision their call
//!   was issued at. A push that lands while the call is outstanding survives
//!   a snapshot that predates it.
//! - Every batch runs: decode, resolve display names, confirm pending sends,
//!   merge, sweep expired confirmations.

use std::{
    collections::HashMap,
    ops::Sub,
    time::{Duration, Instant},
};

use bytes::Bytes;
use roomsync_proto::{
    HistoryRequest, HistoryResponse, MessageResponse, Method, SendMessageRequest, StreamRequest,
    WireMessage,
};

use crate::{
    error::{SyncError, ValidationError},
    event::{CallPurpose, SyncAction, SyncEvent, Ticket},
    message::Message,
    pending::PendingConfirmationTracker,
    session::Session,
    store::{DEFAULT_PAGE_SIZE, MergeStrategy, MessageStore},
    validate,
};

/// Messages requested when joining a room.
pub const DEFAULT_HISTORY_LIMIT: u32 = 1000;

/// Messages requested by each poll and refresh.
pub const DEFAULT_POLL_LIMIT: u32 = 1000;

/// Delay between polls while they succeed.
pub const DEFAULT_POLL_BASE_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on the poll delay after repeated failures.
pub const DEFAULT_POLL_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Time after which an unconfirmed send is cleared.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Status text before the first connect.
pub const STATUS_READY: &str = "Ready to connect";

/// Connection state of a room session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No room session
    Disconnected,
    /// History requested, stream not yet established
    Connecting,
    /// Receiving pushes over the stream
    Streaming,
    /// Periodically re-fetching history
    Polling,
}

impl ConnectionState {
    /// Returns true in `Streaming` and `Polling`.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Streaming | Self::Polling)
    }
}

/// Sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Messages requested on connect
    pub history_limit: u32,
    /// Messages requested by polls and refreshes
    pub poll_limit: u32,
    /// Messages per displayed page
    pub page_size: usize,
    /// Poll delay while polls succeed
    pub poll_base_interval: Duration,
    /// Poll delay cap under backoff
    pub poll_max_interval: Duration,
    /// Age at which unconfirmed sends are cleared
    pub confirmation_timeout: Duration,
    /// Try the push stream before falling back to polling
    pub streaming_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            poll_limit: DEFAULT_POLL_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            poll_base_interval: DEFAULT_POLL_BASE_INTERVAL,
            poll_max_interval: DEFAULT_POLL_MAX_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            streaming_enabled: true,
        }
    }
}

/// Room connection state machine
///
/// Owns one room session: its store, pending confirmations and the
/// streaming/polling decision. Switching rooms is disconnect, then
/// [`ConnectionManager::set_room`], then connect.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: SyncConfig,
    session: Session,
    room_id: String,
    state: ConnectionState,
    status: String,
    store: MessageStore,
    pending: PendingConfirmationTracker<I>,
    /// Bumped on connect and disconnect
    generation: u64,
    next_id: u64,
    calls: HashMap<Ticket, IssuedCall>,
    stream: Option<Ticket>,
    poll_timer: Option<Ticket>,
    send_in_flight: Option<Ticket>,
    poll_failures: u32,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`].
    pub fn new(session: Session, room_id: impl Into<String>, config: SyncConfig) -> Self {
        let store = MessageStore::new(config.page_size);
        Self {
            config,
            session,
            room_id: room_id.into(),
            state: ConnectionState::Disconnected,
            status: STATUS_READY.to_string(),
            store,
            pending: PendingConfirmationTracker::new(),
            generation: 0,
            next_id: 0,
            calls: HashMap::new(),
            stream: None,
            poll_timer: None,
            send_in_flight: None,
            poll_failures: 0,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Room this manager connects to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Message store.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Pending confirmations.
    pub fn pending(&self) -> &PendingConfirmationTracker<I> {
        &self.pending
    }

    /// Configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Consecutive failed polls.
    pub fn poll_failures(&self) -> u32 {
        self.poll_failures
    }

    /// Returns true while a send awaits its response.
    pub fn is_sending(&self) -> bool {
        self.send_in_flight.is_some()
    }

    /// Returns true if a message could be sent now.
    pub fn can_send(&self) -> bool {
        self.check_can_send().is_ok()
    }

    /// Delay before the next poll: the base interval doubled per consecutive
    /// failure, capped at the maximum.
    pub fn poll_interval(&self) -> Duration {
        let factor = 1u32 << self.poll_failures.min(16);
        self.config.poll_base_interval.saturating_mul(factor).min(self.config.poll_max_interval)
    }

    /// Change the room.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` unless disconnected
    pub fn set_room(&mut self, room_id: impl Into<String>) -> Result<(), SyncError> {
        self.require_disconnected("set_room")?;
        self.room_id = room_id.into();
        Ok(())
    }

    /// Replace the session, e.g. after login.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` unless disconnected
    pub fn set_session(&mut self, session: Session) -> Result<(), SyncError> {
        self.require_disconnected("set_session")?;
        self.session = session;
        Ok(())
    }

    /// Process one event.
    ///
    /// Completions for tickets that are stale or unknown are ignored and
    /// produce no actions.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` for `Connect` while not disconnected and
    ///   for `Refresh` while not connected
    /// - `SyncError::Validation` for a rejected room id or message
    /// - `SyncError::Auth` for `Connect` without a logged-in user
    /// - `SyncError::Protocol` if a request cannot be encoded
    pub fn handle(&mut self, now: I, event: SyncEvent) -> Result<Vec<SyncAction>, SyncError> {
        match event {
            SyncEvent::Connect => self.connect(),
            SyncEvent::Disconnect => Ok(self.disconnect()),
            SyncEvent::Logout => Ok(self.logout()),
            SyncEvent::CallCompleted { ticket, result } => {
                Ok(self.call_completed(now, ticket, result))
            },
            SyncEvent::StreamOpened { ticket } => Ok(self.stream_opened(ticket)),
            SyncEvent::StreamOpenFailed { ticket, reason } => {
                Ok(self.stream_failed(ticket, "open failed", &reason))
            },
            SyncEvent::StreamData { ticket, payload } => Ok(self.stream_data(now, ticket, &payload)),
            SyncEvent::StreamError { ticket, reason } => {
                Ok(self.stream_failed(ticket, "error", &reason))
            },
            SyncEvent::StreamEnded { ticket } => Ok(self.stream_failed(ticket, "ended", "")),
            SyncEvent::PollDue { ticket } => Ok(self.poll_due(ticket)),
            SyncEvent::SendMessage { content } => self.send_message(content),
            SyncEvent::LoadMore => Ok(self.load_more()),
            SyncEvent::Refresh => self.refresh(),
            SyncEvent::Tick => Ok(self.tick(now)),
        }
    }

    fn connect(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        self.require_disconnected("connect")?;
        validate::room_id(&self.room_id)?;
        let Some(user) = self.session.user() else {
            return Err(SyncError::Auth("not logged in".to_string()));
        };

        let request = HistoryRequest {
            room_id: self.room_id.clone(),
            user_id: Some(user.user_id.clone()),
            limit: self.config.history_limit,
        }
        .encode()?;

        self.generation += 1;
        self.transition(ConnectionState::Connecting);
        tracing::info!(room = %self.room_id, generation = self.generation, "connecting to room");

        let mut actions = Vec::new();
        self.set_status("Connecting to room...", &mut actions);
        actions.push(self.call(CallPurpose::ConnectHistory, Method::GetMessageHistory, request));
        Ok(actions)
    }

    fn disconnect(&mut self) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::Disconnected {
            return actions;
        }

        if self.stream.take().is_some() {
            actions.push(SyncAction::CancelStream);
        }
        if self.poll_timer.take().is_some() || self.state == ConnectionState::Polling {
            actions.push(SyncAction::CancelPoll);
        }

        self.generation += 1;
        self.calls.clear();
        self.send_in_flight = None;
        self.poll_failures = 0;
        self.store.clear();
        self.pending.clear();
        self.transition(ConnectionState::Disconnected);
        tracing::info!(room = %self.room_id, "disconnected from room");

        let status = format!("Disconnected from room: {}", self.room_id);
        self.set_status(status, &mut actions);
        actions.push(SyncAction::ViewChanged);
        actions
    }

    fn logout(&mut self) -> Vec<SyncAction> {
        let mut actions = self.disconnect();
        self.session = std::mem::take(&mut self.session).logout();
        tracing::info!("logged out");
        self.set_status("Logged out", &mut actions);
        actions
    }

    fn call_completed(
        &mut self,
        now: I,
        ticket: Ticket,
        result: Result<Bytes, SyncError>,
    ) -> Vec<SyncAction> {
        if ticket.generation != self.generation {
            tracing::debug!(?ticket, generation = self.generation, "ignoring stale completion");
            return Vec::new();
        }
        let Some(issued) = self.calls.remove(&ticket) else {
            tracing::debug!(?ticket, "ignoring unknown completion");
            return Vec::new();
        };

        let snapshot = MergeStrategy::Snapshot { since: issued.revision };
        match issued.purpose {
            CallPurpose::ConnectHistory => self.history_loaded(now, result),
            CallPurpose::Poll => self.poll_completed(now, result, snapshot),
            CallPurpose::Refresh => self.refresh_completed(now, result, snapshot),
            CallPurpose::Send => self.send_completed(now, result),
        }
    }

    fn history_loaded(&mut self, now: I, result: Result<Bytes, SyncError>) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.state != ConnectionState::Connecting {
            return actions;
        }

        match result {
            Ok(bytes) => {
                let batch = decode_history(&bytes);
                tracing::debug!(count = batch.len(), "history loaded");
                self.apply_batch(now, batch, MergeStrategy::Replace, &mut actions);
                self.store.reset_window();
                push_once(&mut actions, SyncAction::ViewChanged);

                if self.config.streaming_enabled {
                    self.open_stream(&mut actions);
                } else {
                    self.enter_polling(&mut actions);
                }
            },
            Err(e) => {
                tracing::warn!(room = %self.room_id, error = %e, "history load failed, polling");
                self.enter_polling(&mut actions);
                let status = format!("Connected to room: {} (history unavailable)", self.room_id);
                self.set_status(status, &mut actions);
            },
        }

        actions
    }

    fn open_stream(&mut self, actions: &mut Vec<SyncAction>) {
        let request = StreamRequest {
            room_id: self.room_id.clone(),
            token: self.session.token().map(str::to_string),
        }
        .encode();

        match request {
            Ok(request) => {
                let ticket = self.issue();
                self.stream = Some(ticket);
                actions.push(SyncAction::OpenStream {
                    ticket,
                    method: Method::StreamMessages,
                    request,
                });
            },
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode stream request, polling");
                self.enter_polling(actions);
            },
        }
    }

    fn stream_opened(&mut self, ticket: Ticket) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.stream != Some(ticket) || self.state != ConnectionState::Connecting {
            return actions;
        }

        self.transition(ConnectionState::Streaming);
        tracing::info!(room = %self.room_id, "streaming");
        self.set_connected_status(&mut actions);
        actions
    }

    fn stream_data(&mut self, now: I, ticket: Ticket, payload: &[u8]) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.stream != Some(ticket) {
            return actions;
        }

        let message = Message::from(MessageResponse::decode(payload));
        if !message.is_displayable() {
            tracing::debug!(id = %message.id, "dropping pushed message without author or body");
            return actions;
        }

        self.apply_batch(now, vec![message], MergeStrategy::Append, &mut actions);
        actions
    }

    fn stream_failed(&mut self, ticket: Ticket, what: &str, reason: &str) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.stream != Some(ticket) {
            return actions;
        }

        tracing::warn!(room = %self.room_id, what, reason, "stream lost, falling back to polling");
        self.stream = None;
        actions.push(SyncAction::CancelStream);
        self.enter_polling(&mut actions);
        actions
    }

    fn enter_polling(&mut self, actions: &mut Vec<SyncAction>) {
        self.transition(ConnectionState::Polling);
        self.poll_failures = 0;
        self.set_connected_status(actions);
        self.start_poll(actions);
    }

    fn start_poll(&mut self, actions: &mut Vec<SyncAction>) {
        match self.history_request(self.config.poll_limit) {
            Ok(request) => {
                actions.push(self.call(CallPurpose::Poll, Method::GetMessageHistory, request));
            },
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode poll request");
                self.poll_failures = self.poll_failures.saturating_add(1);
                self.schedule_poll(actions);
            },
        }
    }

    fn schedule_poll(&mut self, actions: &mut Vec<SyncAction>) {
        let ticket = self.issue();
        self.poll_timer = Some(ticket);
        actions.push(SyncAction::SchedulePoll { ticket, after: self.poll_interval() });
    }

    fn poll_due(&mut self, ticket: Ticket) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.poll_timer != Some(ticket) || self.state != ConnectionState::Polling {
            return actions;
        }

        self.poll_timer = None;
        self.start_poll(&mut actions);
        actions
    }

    fn poll_completed(
        &mut self,
        now: I,
        result: Result<Bytes, SyncError>,
        strategy: MergeStrategy,
    ) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.state != ConnectionState::Polling {
            return actions;
        }

        match result {
            Ok(bytes) => {
                self.poll_failures = 0;
                let batch = decode_history(&bytes);
                self.apply_batch(now, batch, strategy, &mut actions);
            },
            Err(e) => {
                self.poll_failures = self.poll_failures.saturating_add(1);
                tracing::warn!(
                    error = %e,
                    failures = self.poll_failures,
                    next = ?self.poll_interval(),
                    "poll failed"
                );
            },
        }

        self.schedule_poll(&mut actions);
        actions
    }

    fn refresh(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        if !self.state.is_connected() {
            return Err(SyncError::InvalidState { state: self.state, operation: "refresh" });
        }

        let request = self.history_request(self.config.poll_limit)?;
        let mut actions = Vec::new();
        self.set_status("Refreshing messages...", &mut actions);
        actions.push(self.call(CallPurpose::Refresh, Method::GetMessageHistory, request));
        Ok(actions)
    }

    fn refresh_completed(
        &mut self,
        now: I,
        result: Result<Bytes, SyncError>,
        strategy: MergeStrategy,
    ) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        match result {
            Ok(bytes) => {
                let batch = decode_history(&bytes);
                self.apply_batch(now, batch, strategy, &mut actions);
                self.set_status("Messages refreshed", &mut actions);
            },
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed");
                self.set_status("Failed to refresh messages", &mut actions);
            },
        }
        actions
    }

    fn check_can_send(&self) -> Result<(), ValidationError> {
        if !self.session.is_authenticated() {
            return Err(ValidationError::NotAuthenticated);
        }
        if self.room_id.trim().is_empty() {
            return Err(ValidationError::EmptyRoom);
        }
        if !self.state.is_connected() {
            return Err(ValidationError::NotConnected);
        }
        if self.send_in_flight.is_some() {
            return Err(ValidationError::SendInFlight);
        }
        Ok(())
    }

    fn send_message(&mut self, content: String) -> Result<Vec<SyncAction>, SyncError> {
        self.check_can_send()?;
        validate::message_body(&content)?;

        let username = self.session.user().map(|u| u.username.clone());
        let user_id = self.session.user().map(|u| u.user_id.clone()).unwrap_or_default();
        let request =
            SendMessageRequest { user_id, content, room_id: self.room_id.clone(), username }
                .encode()?;

        let mut actions = Vec::new();
        self.set_status("Sending message...", &mut actions);
        let action = self.call(CallPurpose::Send, Method::SendMessage, request);
        if let SyncAction::Call { ticket, .. } = &action {
            self.send_in_flight = Some(*ticket);
        }
        actions.push(action);
        Ok(actions)
    }

    fn send_completed(&mut self, now: I, result: Result<Bytes, SyncError>) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        self.send_in_flight = None;

        let response = match result {
            Ok(bytes) => MessageResponse::decode(&bytes),
            Err(e) => {
                self.send_failed(e.to_string(), &mut actions);
                return actions;
            },
        };

        if response.message_id.is_empty() {
            self.send_failed("server returned no message id".to_string(), &mut actions);
            return actions;
        }

        let hint = response
            .username
            .clone()
            .or_else(|| self.session.user().map(|u| u.username.clone()))
            .unwrap_or_default();
        self.session.remember_name(&response.user_id, &hint);

        let message_id = response.message_id;
        tracing::debug!(%message_id, "message accepted");
        actions.push(SyncAction::MessageSent { message_id: message_id.clone() });

        if self.store.contains(&message_id) {
            // Already pushed by the stream before the response arrived
            self.set_status("Message delivered!", &mut actions);
            actions.push(SyncAction::Delivered { message_ids: vec![message_id] });
        } else {
            self.pending.add(&message_id, now);
            self.set_status("Message sent! Waiting for it to appear...", &mut actions);
        }

        actions.push(SyncAction::ViewChanged);
        actions
    }

    fn send_failed(&mut self, reason: String, actions: &mut Vec<SyncAction>) {
        tracing::error!(room = %self.room_id, %reason, "send failed");
        self.set_status(format!("Failed to send message: {reason}"), actions);
        actions.push(SyncAction::SendFailed { reason });
    }

    fn load_more(&mut self) -> Vec<SyncAction> {
        if self.store.advance_page() {
            tracing::debug!(page = self.store.window().current_page(), "page advanced");
            vec![SyncAction::ViewChanged]
        } else {
            Vec::new()
        }
    }

    fn tick(&mut self, now: I) -> Vec<SyncAction> {
        let expired = self.pending.sweep_expired(now, self.config.confirmation_timeout);
        if expired.is_empty() {
            return Vec::new();
        }
        tracing::debug!(?expired, "confirmation timeout, clearing optimistically");
        vec![SyncAction::ViewChanged]
    }

    /// Decode-resolve-confirm-merge-sweep for one batch (oldest first).
    fn apply_batch(
        &mut self,
        now: I,
        mut batch: Vec<Message>,
        strategy: MergeStrategy,
        actions: &mut Vec<SyncAction>,
    ) {
        for message in &mut batch {
            self.session.resolve_display_name(message);
        }

        let confirmed = self.pending.confirm_all(batch.iter().map(|m| m.id.as_str()));
        let outcome = self.store.merge(batch, strategy);
        let expired = self.pending.sweep_expired(now, self.config.confirmation_timeout);

        if outcome.changed {
            tracing::debug!(?strategy, added = outcome.added.len(), total = self.store.len(), "merged");
        }

        if !confirmed.is_empty() {
            if self.pending.is_empty() {
                self.set_status("Message delivered!", actions);
            }
            actions.push(SyncAction::Delivered { message_ids: confirmed.clone() });
        }

        if outcome.changed || !confirmed.is_empty() || !expired.is_empty() {
            push_once(actions, SyncAction::ViewChanged);
        }
    }

    fn history_request(&self, limit: u32) -> Result<Bytes, SyncError> {
        let request = HistoryRequest {
            room_id: self.room_id.clone(),
            user_id: self.session.user().map(|u| u.user_id.clone()),
            limit,
        };
        Ok(request.encode()?)
    }

    fn call(&mut self, purpose: CallPurpose, method: Method, request: Bytes) -> SyncAction {
        let ticket = self.issue();
        self.calls.insert(ticket, IssuedCall { purpose, revision: self.store.revision() });
        SyncAction::Call { ticket, purpose, method, request }
    }

    fn issue(&mut self) -> Ticket {
        self.next_id += 1;
        Ticket { generation: self.generation, id: self.next_id }
    }

    fn transition(&mut self, to: ConnectionState) {
        tracing::debug!(from = ?self.state, ?to, "state transition");
        self.state = to;
    }

    fn set_connected_status(&mut self, actions: &mut Vec<SyncAction>) {
        let status = format!("Connected to room: {}", self.room_id);
        self.set_status(status, actions);
    }

    fn set_status(&mut self, status: impl Into<String>, actions: &mut Vec<SyncAction>) {
        let status = status.into();
        if status != self.status {
            self.status.clone_from(&status);
            actions.push(SyncAction::StatusChanged(status));
        }
    }

    fn require_disconnected(&self, operation: &'static str) -> Result<(), SyncError> {
        if self.state == ConnectionState::Disconnected {
            Ok(())
        } else {
            Err(SyncError::InvalidState { state: self.state, operation })
        }
    }
}

/// History arrives newest first; the store holds oldest first.
/// Bookkeeping for an outstanding call.
#[derive(Debug, Clone, Copy)]
struct IssuedCall {
    purpose: CallPurpose,
    /// Store revision when the call was issued
    revision: u64,
}

fn decode_history(bytes: &[u8]) -> Vec<Message> {
    HistoryResponse::decode(bytes).messages.into_iter().rev().map(Message::from).collect()
}

fn push_once(actions: &mut Vec<SyncAction>, action: SyncAction) {
    if !actions.contains(&action) {
        actions.push(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Session::authenticated("tok", "u1", "alice"),
            "general",
            SyncConfig::default(),
        )
    }

    fn response(id: &str) -> MessageResponse {
        MessageResponse {
            message_id: id.to_string(),
            user_id: "u2".to_string(),
            content: format!("body {id}"),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            room_id: "general".to_string(),
            username: Some("bob".to_string()),
        }
    }

    fn history(ids_newest_first: &[&str]) -> Bytes {
        HistoryResponse { messages: ids_newest_first.iter().map(|id| response(id)).collect() }
            .encode()
            .unwrap()
    }

    fn call_ticket(actions: &[SyncAction], want: CallPurpose) -> Ticket {
        actions
            .iter()
            .find_map(|a| match a {
                SyncAction::Call { ticket, purpose, .. } if *purpose == want => Some(*ticket),
                _ => None,
            })
            .unwrap()
    }

    fn stream_ticket(actions: &[SyncAction]) -> Ticket {
        actions
            .iter()
            .find_map(|a| match a {
                SyncAction::OpenStream { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .unwrap()
    }

    fn stored_ids(manager: &ConnectionManager) -> Vec<String> {
        manager.store().messages().iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn connect_requests_history() {
        let mut m = manager();
        let actions = m.handle(Instant::now(), SyncEvent::Connect).unwrap();

        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.status(), "Connecting to room...");
        let request = actions
            .iter()
            .find_map(|a| match a {
                SyncAction::Call { method: Method::GetMessageHistory, request, .. } => {
                    Some(HistoryRequest::decode(request))
                },
                _ => None,
            })
            .unwrap();
        assert_eq!(request.limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(request.room_id, "general");
    }

    #[test]
    fn connect_twice_is_rejected() {
        let mut m = manager();
        m.handle(Instant::now(), SyncEvent::Connect).unwrap();

        let result = m.handle(Instant::now(), SyncEvent::Connect);
        assert!(matches!(result, Err(SyncError::InvalidState { operation: "connect", .. })));
    }

    #[test]
    fn connect_requires_login() {
        let mut m: ConnectionManager =
            ConnectionManager::new(Session::anonymous(), "general", SyncConfig::default());
        let result = m.handle(Instant::now(), SyncEvent::Connect);

        assert!(matches!(result, Err(SyncError::Auth(_))));
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_rejects_blank_room() {
        let mut m = manager();
        m.set_room("  ").unwrap();

        let result = m.handle(Instant::now(), SyncEvent::Connect);
        assert_eq!(result, Err(SyncError::Validation(ValidationError::EmptyRoom)));
    }

    #[test]
    fn history_is_reversed_then_stream_opens() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);

        let actions = m
            .handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&["3", "2", "1"])) })
            .unwrap();

        assert_eq!(stored_ids(&m), ["1", "2", "3"]);
        assert!(actions.contains(&SyncAction::ViewChanged));
        let stream = stream_ticket(&actions);

        m.handle(now, SyncEvent::StreamOpened { ticket: stream }).unwrap();
        assert_eq!(m.state(), ConnectionState::Streaming);
        assert_eq!(m.status(), "Connected to room: general");
    }

    #[test]
    fn history_failure_still_connects_by_polling() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);

        let actions = m
            .handle(
                now,
                SyncEvent::CallCompleted {
                    ticket,
                    result: Err(SyncError::Transport("unreachable".to_string())),
                },
            )
            .unwrap();

        assert_eq!(m.state(), ConnectionState::Polling);
        assert!(m.status().contains("history unavailable"));
        call_ticket(&actions, CallPurpose::Poll);
    }

    #[test]
    fn disconnect_during_history_load_ignores_late_result() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);

        let actions = m.handle(now, SyncEvent::Disconnect).unwrap();
        assert!(!actions.contains(&SyncAction::CancelStream));
        assert_eq!(m.status(), "Disconnected from room: general");

        let late = m
            .handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&["1"])) })
            .unwrap();

        assert!(late.is_empty());
        assert!(m.store().is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_when_disconnected_is_noop() {
        let mut m = manager();
        assert!(m.handle(Instant::now(), SyncEvent::Disconnect).unwrap().is_empty());
    }

    #[test]
    fn stream_push_appends_and_dedups() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);
        let actions = m
            .handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&["1"])) })
            .unwrap();
        let stream = stream_ticket(&actions);
        m.handle(now, SyncEvent::StreamOpened { ticket: stream }).unwrap();

        let payload = response("2").encode().unwrap();
        let first = m
            .handle(now, SyncEvent::StreamData { ticket: stream, payload: payload.clone() })
            .unwrap();
        let second = m.handle(now, SyncEvent::StreamData { ticket: stream, payload }).unwrap();

        assert!(first.contains(&SyncAction::ViewChanged));
        assert!(second.is_empty());
        assert_eq!(stored_ids(&m), ["1", "2"]);
    }

    #[test]
    fn stream_push_without_author_is_dropped() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);
        let actions = m
            .handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&[])) })
            .unwrap();
        let stream = stream_ticket(&actions);

        let mut anonymous = response("9");
        anonymous.user_id.clear();
        let payload = anonymous.encode().unwrap();
        m.handle(now, SyncEvent::StreamData { ticket: stream, payload }).unwrap();

        assert!(m.store().is_empty());
    }

    #[test]
    fn stream_end_falls_back_to_polling_immediately() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);
        let actions = m
            .handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&[])) })
            .unwrap();
        let stream = stream_ticket(&actions);
        m.handle(now, SyncEvent::StreamOpened { ticket: stream }).unwrap();

        let actions = m.handle(now, SyncEvent::StreamEnded { ticket: stream }).unwrap();

        assert_eq!(m.state(), ConnectionState::Polling);
        assert!(actions.contains(&SyncAction::CancelStream));
        call_ticket(&actions, CallPurpose::Poll);

        // Data from the discarded stream is ignored
        let payload = response("5").encode().unwrap();
        assert!(m.handle(now, SyncEvent::StreamData { ticket: stream, payload }).unwrap().is_empty());
    }

    #[test]
    fn poll_backoff_doubles_and_resets() {
        let now = Instant::now();
        let config = SyncConfig { streaming_enabled: false, ..SyncConfig::default() };
        let mut m: ConnectionManager =
            ConnectionManager::new(Session::authenticated("tok", "u1", "alice"), "general", config);
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);
        let mut actions = m
            .handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&[])) })
            .unwrap();
        assert_eq!(m.state(), ConnectionState::Polling);

        let mut delays = Vec::new();
        for outcome in [false, false, false, true] {
            let ticket = call_ticket(&actions, CallPurpose::Poll);
            let result = if outcome {
                Ok(history(&["1"]))
            } else {
                Err(SyncError::Transport("503".to_string()))
            };
            let completed = m.handle(now, SyncEvent::CallCompleted { ticket, result }).unwrap();
            let (timer, after) = completed
                .iter()
                .find_map(|a| match a {
                    SyncAction::SchedulePoll { ticket, after } => Some((*ticket, *after)),
                    _ => None,
                })
                .unwrap();
            delays.push(after);
            actions = m.handle(now, SyncEvent::PollDue { ticket: timer }).unwrap();
        }

        assert_eq!(
            delays,
            [
                Duration::from_secs(20),
                Duration::from_secs(30),
                Duration::from_secs(30),
                Duration::from_secs(10)
            ]
        );
        assert_eq!(stored_ids(&m), ["1"]);
    }

    #[test]
    fn send_requires_connection() {
        let mut m = manager();
        let result = m.handle(Instant::now(), SyncEvent::SendMessage { content: "hi".into() });
        assert_eq!(result, Err(SyncError::Validation(ValidationError::NotConnected)));
        assert!(!m.can_send());
    }

    #[test]
    fn load_more_reveals_older_messages() {
        let now = Instant::now();
        let mut m = manager();
        let actions = m.handle(now, SyncEvent::Connect).unwrap();
        let ticket = call_ticket(&actions, CallPurpose::ConnectHistory);
        let ids: Vec<String> = (1..=12).rev().map(|i| i.to_string()).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        m.handle(now, SyncEvent::CallCompleted { ticket, result: Ok(history(&ids)) }).unwrap();

        assert_eq!(m.store().page().len(), 5);
        assert_eq!(m.handle(now, SyncEvent::LoadMore).unwrap(), vec![SyncAction::ViewChanged]);
        assert_eq!(m.handle(now, SyncEvent::LoadMore).unwrap(), vec![SyncAction::ViewChanged]);
        assert_eq!(m.store().page().len(), 12);
        assert!(m.handle(now, SyncEvent::LoadMore).unwrap().is_empty());
    }

    #[test]
    fn logout_returns_fresh_session() {
        let mut m = manager();
        m.handle(Instant::now(), SyncEvent::Connect).unwrap();

        m.handle(Instant::now(), SyncEvent::Logout).unwrap();

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.session().is_authenticated());
        assert_eq!(m.status(), "Logged out");
    }

    #[test]
    fn poll_interval_caps() {
        let mut m = manager();
        m.poll_failures = 40;
        assert_eq!(m.poll_interval(), DEFAULT_POLL_MAX_INTERVAL);
    }
}
