//! Synchronous driver for a [`ConnectionManager`].
//!
//! `SimDriver` executes the manager's actions against a [`SimChatServer`]
//! without an async runtime. Calls queue up until the test completes them, so
//! tests control exactly when each response arrives. Stream events are pulled
//! from the subscription channel, and poll timers fire when the mock clock
//! passes their deadline.
//!
//! [`SimChatServer`]: crate::SimChatServer

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use bytes::Bytes;
use roomsync_client::{Metadata, StreamEvent, StreamHandle};
use roomsync_core::{
    ConnectionManager, ConnectionState, Environment, Session, SyncAction, SyncConfig, SyncError,
    SyncEvent, Ticket, env::test_utils::MockEnv,
};
use roomsync_proto::{AuthRequest, AuthResponse, Method, WireMessage};

use crate::{
    Operation,
    invariants::{InvariantRegistry, RoomSnapshot},
    sim_server::SharedSimServer,
};

/// Upper bound on work done by [`SimDriver::settle`].
const SETTLE_LIMIT: usize = 10_000;

/// Name of the remote user who posts with [`Operation::ExternalPost`].
const OTHER_USER: &str = "bob";

/// Drives one room connection against an in-memory server.
pub struct SimDriver {
    server: SharedSimServer,
    env: MockEnv,
    manager: ConnectionManager<Instant>,
    username: String,
    password: String,
    other_user_id: String,
    inbox: VecDeque<SyncEvent>,
    calls: VecDeque<(Ticket, Method, Bytes)>,
    stream: Option<(Ticket, StreamHandle)>,
    poll: Option<(Ticket, Instant)>,
    fail_next_call: bool,
    refuse_streams: bool,
    invariants: Option<InvariantRegistry>,
    sent: Vec<String>,
    delivered: Vec<String>,
    send_failures: usize,
}

impl SimDriver {
    /// Register `username` on the server and prepare a logged-in driver for
    /// `room_id`.
    pub fn new(server: SharedSimServer, username: &str, room_id: &str, config: SyncConfig) -> Self {
        let password = "password".to_string();
        server.add_user(username, &password);
        let other_user_id = server.add_user(OTHER_USER, "password");

        let mut driver = Self {
            server,
            env: MockEnv::new(),
            manager: ConnectionManager::new(Session::anonymous(), room_id, config),
            username: username.to_string(),
            password,
            other_user_id,
            inbox: VecDeque::new(),
            calls: VecDeque::new(),
            stream: None,
            poll: None,
            fail_next_call: false,
            refuse_streams: false,
            invariants: None,
            sent: Vec::new(),
            delivered: Vec::new(),
            send_failures: 0,
        };
        driver.login();
        driver
    }

    /// Enable invariant checking after every event.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Manager under test.
    pub fn manager(&self) -> &ConnectionManager<Instant> {
        &self.manager
    }

    /// Connection state shorthand.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Clock shared with the manager.
    pub fn env(&self) -> &MockEnv {
        &self.env
    }

    /// Server behind the driver.
    pub fn server(&self) -> &SharedSimServer {
        &self.server
    }

    /// Observable state.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::from_manager(&self.manager)
    }

    /// Calls issued but not yet completed.
    pub fn outstanding_calls(&self) -> usize {
        self.calls.len()
    }

    /// Stream is subscribed on the server side.
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Poll deadline, if one is scheduled.
    pub fn poll_deadline(&self) -> Option<Instant> {
        self.poll.map(|(_, at)| at)
    }

    /// Ids reported by `MessageSent`.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Ids reported by `Delivered`.
    pub fn delivered(&self) -> &[String] {
        &self.delivered
    }

    /// Number of `SendFailed` actions.
    pub fn send_failures(&self) -> usize {
        self.send_failures
    }

    /// Feed an event and execute the resulting actions, including any events
    /// they produce synchronously.
    ///
    /// Returns the manager's verdict on `event` itself.
    pub fn handle(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        let result = self.dispatch(event);
        while let Some(next) = self.inbox.pop_front() {
            // Follow-up events come from the transport and are never rejected
            let _ = self.dispatch(next);
        }
        result
    }

    /// Complete the oldest outstanding call.
    ///
    /// Returns false if there was none.
    pub fn deliver_next_call(&mut self) -> bool {
        let Some((ticket, method, request)) = self.calls.pop_front() else {
            return false;
        };

        let result = if std::mem::take(&mut self.fail_next_call) {
            Err(SyncError::Transport(format!("injected failure on {method}")))
        } else {
            self.server.handle_call(method, &request, &self.metadata()).map_err(SyncError::from)
        };

        let _ = self.handle(SyncEvent::CallCompleted { ticket, result });
        true
    }

    /// Feed every queued stream event.
    ///
    /// Returns the number of events delivered.
    pub fn pump_stream(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let Some((ticket, stream)) = &mut self.stream else {
                return delivered;
            };
            let ticket = *ticket;
            let Some(event) = stream.try_next() else {
                return delivered;
            };

            let event = match event {
                StreamEvent::Data(payload) => SyncEvent::StreamData { ticket, payload },
                StreamEvent::Error(e) => {
                    self.stream = None;
                    SyncEvent::StreamError { ticket, reason: e.to_string() }
                },
                StreamEvent::End => {
                    self.stream = None;
                    SyncEvent::StreamEnded { ticket }
                },
            };
            delivered += 1;
            let _ = self.handle(event);
        }
    }

    /// Complete all calls and drain the stream until nothing moves.
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_LIMIT {
            let called = self.deliver_next_call();
            let streamed = self.pump_stream() > 0;
            if !called && !streamed {
                return;
            }
        }
        tracing::warn!(limit = SETTLE_LIMIT, "settle did not quiesce");
    }

    /// Advance the clock, firing a due poll and a tick.
    pub fn advance(&mut self, duration: Duration) {
        self.env.advance(duration);
        let now = self.env.now();

        if let Some((ticket, at)) = self.poll
            && at <= now
        {
            self.poll = None;
            let _ = self.handle(SyncEvent::PollDue { ticket });
        }
        let _ = self.handle(SyncEvent::Tick);
    }

    /// Apply one model operation.
    ///
    /// # Errors
    ///
    /// Whatever the manager returns for the corresponding event. Operations
    /// with no event (network faults, clock) never fail.
    pub fn apply(&mut self, operation: &Operation) -> Result<(), SyncError> {
        match operation {
            Operation::Connect => self.handle(SyncEvent::Connect),
            Operation::Disconnect => self.handle(SyncEvent::Disconnect),
            Operation::Logout => self.handle(SyncEvent::Logout),
            Operation::Login => {
                if !self.manager.session().is_authenticated() {
                    self.login();
                }
                Ok(())
            },
            Operation::Send(text) => self.handle(SyncEvent::SendMessage { content: text.body() }),
            Operation::ExternalPost(text) => {
                let body = text.body();
                if !body.is_empty() {
                    let room = self.manager.room_id().to_string();
                    self.server.post_as(&room, &self.other_user_id, OTHER_USER, &body);
                }
                Ok(())
            },
            Operation::LoadMore => self.handle(SyncEvent::LoadMore),
            Operation::Refresh => self.handle(SyncEvent::Refresh),
            Operation::DeliverNext => {
                self.deliver_next_call();
                Ok(())
            },
            Operation::Settle => {
                self.settle();
                Ok(())
            },
            Operation::FailNextCall => {
                self.fail_next_call = true;
                Ok(())
            },
            Operation::EndStream => {
                self.server.end_streams(self.manager.room_id());
                self.pump_stream();
                Ok(())
            },
            Operation::FailStream => {
                self.server.fail_streams(self.manager.room_id(), "connection reset");
                self.pump_stream();
                Ok(())
            },
            Operation::ToggleStreams => {
                self.refuse_streams = !self.refuse_streams;
                Ok(())
            },
            Operation::Advance(millis) => {
                self.advance(Duration::from_millis(u64::from(*millis)));
                Ok(())
            },
        }
    }

    fn login(&mut self) {
        let request =
            AuthRequest { username: self.username.clone(), password: self.password.clone() };
        let response = request
            .encode()
            .map_err(SyncError::from)
            .and_then(|bytes| {
                self.server.handle_call(Method::Login, &bytes, &Metadata::new()).map_err(Into::into)
            })
            .map(|bytes| AuthResponse::decode(&bytes));

        match response {
            Ok(response) if response.success => {
                let session =
                    Session::authenticated(response.token, response.user_id, response.username);
                if let Err(e) = self.manager.set_session(session) {
                    tracing::debug!(error = %e, "login ignored while connected");
                }
            },
            Ok(response) => tracing::warn!(reason = %response.error, "login rejected"),
            Err(e) => tracing::warn!(error = %e, "login failed"),
        }
    }

    fn dispatch(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        let label = self.invariants.as_ref().map(|_| format!("{event:?}"));
        let now = self.env.now();
        let actions = self.manager.handle(now, event)?;

        for action in actions {
            self.execute(action);
        }

        if let (Some(registry), Some(label)) = (&self.invariants, label) {
            registry.assert_all(&self.snapshot(), &format!("after {label}"));
        }
        Ok(())
    }

    fn execute(&mut self, action: SyncAction) {
        match action {
            SyncAction::Call { ticket, method, request, .. } => {
                self.calls.push_back((ticket, method, request));
            },
            SyncAction::OpenStream { ticket, method, request } => {
                let opened = if self.refuse_streams {
                    Err(SyncError::Transport("streams refused".to_string()))
                } else {
                    self.server
                        .open_stream(method, &request, &self.metadata())
                        .map_err(SyncError::from)
                };
                match opened {
                    Ok(stream) => {
                        self.stream = Some((ticket, stream));
                        self.inbox.push_back(SyncEvent::StreamOpened { ticket });
                    },
                    Err(e) => {
                        let reason = e.to_string();
                        self.inbox.push_back(SyncEvent::StreamOpenFailed { ticket, reason });
                    },
                }
            },
            SyncAction::CancelStream => self.stream = None,
            SyncAction::SchedulePoll { ticket, after } => {
                self.poll = Some((ticket, self.env.now() + after));
            },
            SyncAction::CancelPoll => self.poll = None,
            SyncAction::MessageSent { message_id } => self.sent.push(message_id),
            SyncAction::SendFailed { .. } => self.send_failures += 1,
            SyncAction::Delivered { message_ids } => self.delivered.extend(message_ids),
            SyncAction::StatusChanged(_) | SyncAction::ViewChanged => {},
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata::with_token(self.manager.session().token())
    }
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDriver")
            .field("state", &self.manager.state())
            .field("outstanding_calls", &self.calls.len())
            .field("stream", &self.stream.as_ref().map(|(t, _)| *t))
            .field("poll", &self.poll.map(|(t, _)| t))
            .finish_non_exhaustive()
    }
}
