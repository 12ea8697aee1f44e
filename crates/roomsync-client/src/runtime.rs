//! Async runtime for a room connection.
//!
//! [`SyncRuntime`] owns a [`ConnectionManager`] and executes the actions it
//! returns on tokio:
//! - Unary calls run as spawned tasks and report back through an internal
//!   channel as `CallCompleted`
//! - The server stream runs in one task whose abort handle is kept so
//!   `CancelStream` can stop it
//! - Poll timers are tasks sleeping on the [`Environment`] clock
//! - A periodic tick drives confirmation expiry
//!
//! Callers talk to the runtime through a [`RuntimeHandle`] and observe it
//! through a [`RoomView`] published on a `watch` channel after every event.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use roomsync_core::{
    CallPurpose, ConnectionManager, ConnectionState, Environment, Message, Session, SyncAction,
    SyncError, SyncEvent, Ticket,
};
use roomsync_proto::Method;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{AbortHandle, JoinHandle},
    time::MissedTickBehavior,
};

use crate::{
    config::ClientConfig,
    error::TransportError,
    transport::{Metadata, StreamEvent, Transport},
};

/// Queued commands before callers wait.
const COMMAND_BUFFER: usize = 32;

/// Snapshot of what a room UI displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    /// Current room
    pub room_id: String,
    /// Connection state
    pub state: ConnectionState,
    /// Human-readable status line
    pub status: String,
    /// Displayed page, oldest first
    pub messages: Vec<Message>,
    /// Older messages are hidden
    pub has_more: bool,
    /// Sent messages not yet seen in the room
    pub pending_confirmations: usize,
    /// A send is in flight
    pub is_sending: bool,
    /// A send would be accepted now
    pub can_send: bool,
    /// Logged-in username
    pub username: Option<String>,
}

impl RoomView {
    /// Capture the manager's current state.
    pub fn capture<I>(manager: &ConnectionManager<I>) -> Self
    where
        I: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>,
    {
        let store = manager.store();
        Self {
            room_id: manager.room_id().to_string(),
            state: manager.state(),
            status: manager.status().to_string(),
            messages: store.page().to_vec(),
            has_more: store.has_more(),
            pending_confirmations: manager.pending().len(),
            is_sending: manager.is_sending(),
            can_send: manager.can_send(),
            username: manager.session().user().map(|u| u.username.clone()),
        }
    }
}

enum Command {
    Event { event: SyncEvent, reply: oneshot::Sender<Result<(), SyncError>> },
    SetSession { session: Session, reply: oneshot::Sender<Result<(), SyncError>> },
    SetRoom { room_id: String, reply: oneshot::Sender<Result<(), SyncError>> },
    Shutdown,
}

/// Caller side of a running [`SyncRuntime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RoomView>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event { event, .. } => f.debug_tuple("Event").field(event).finish(),
            Self::SetSession { .. } => f.write_str("SetSession"),
            Self::SetRoom { room_id, .. } => f.debug_tuple("SetRoom").field(room_id).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl RuntimeHandle {
    /// Join the room.
    ///
    /// Returns once the history request is issued; progress shows up in the
    /// view.
    ///
    /// # Errors
    ///
    /// - `SyncError::Validation` if the room id is invalid
    /// - `SyncError::Auth` if no user is logged in
    /// - `SyncError::InvalidState` if already connected
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.submit(SyncEvent::Connect).await
    }

    /// Leave the room.
    ///
    /// # Errors
    ///
    /// Only if the runtime has stopped.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.submit(SyncEvent::Disconnect).await
    }

    /// Send a message to the room.
    ///
    /// # Errors
    ///
    /// - `SyncError::Validation` if the body is invalid or sending is not
    ///   possible right now
    pub async fn send(&self, content: impl Into<String>) -> Result<(), SyncError> {
        self.submit(SyncEvent::SendMessage { content: content.into() }).await
    }

    /// Show one more page of older messages.
    ///
    /// # Errors
    ///
    /// Only if the runtime has stopped.
    pub async fn load_more(&self) -> Result<(), SyncError> {
        self.submit(SyncEvent::LoadMore).await
    }

    /// Re-fetch the room history.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` if not connected
    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.submit(SyncEvent::Refresh).await
    }

    /// Disconnect and clear the session.
    ///
    /// # Errors
    ///
    /// Only if the runtime has stopped.
    pub async fn logout(&self) -> Result<(), SyncError> {
        self.submit(SyncEvent::Logout).await
    }

    /// Replace the session while disconnected.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` if connected
    pub async fn set_session(&self, session: Session) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SetSession { session, reply }, rx).await
    }

    /// Switch rooms while disconnected.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidState` if connected
    pub async fn set_room(&self, room_id: impl Into<String>) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SetRoom { room_id: room_id.into(), reply }, rx).await
    }

    /// Current view.
    pub fn view(&self) -> RoomView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<RoomView> {
        self.view.clone()
    }

    /// Stop the runtime. Open streams and timers are cancelled.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn submit(&self, event: SyncEvent) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Event { event, reply }, rx).await
    }

    async fn request(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<(), SyncError>>,
    ) -> Result<(), SyncError> {
        self.commands.send(command).await.map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }
}

fn stopped() -> SyncError {
    SyncError::Transport("sync runtime stopped".to_string())
}

/// Executes [`ConnectionManager`] actions on tokio.
///
/// # Type Parameters
///
/// - `T`: RPC transport
/// - `E`: Clock used for poll timers and the manager's timestamps
pub struct SyncRuntime<T, E>
where
    T: Transport,
    E: Environment,
{
    transport: Arc<T>,
    env: E,
    manager: ConnectionManager<E::Instant>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<SyncEvent>,
    completions: mpsc::UnboundedReceiver<SyncEvent>,
    view: watch::Sender<RoomView>,
    request_timeout: Duration,
    sweep_interval: Duration,
    stream_task: Option<AbortHandle>,
    poll_task: Option<AbortHandle>,
}

impl<T, E> SyncRuntime<T, E>
where
    T: Transport,
    E: Environment,
{
    /// Create a runtime for `room_id` and the handle that controls it.
    pub fn new(
        transport: Arc<T>,
        env: E,
        session: Session,
        room_id: impl Into<String>,
        config: &ClientConfig,
    ) -> (Self, RuntimeHandle) {
        let manager = ConnectionManager::new(session, room_id, config.sync.clone());
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(RoomView::capture(&manager));

        let runtime = Self {
            transport,
            env,
            manager,
            commands,
            completions_tx,
            completions,
            view,
            request_timeout: config.request_timeout,
            sweep_interval: config.sweep_interval.max(Duration::from_millis(1)),
            stream_task: None,
            poll_task: None,
        };

        (runtime, RuntimeHandle { commands: commands_tx, view: view_rx })
    }

    /// Run on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the event loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(room_id = %self.manager.room_id(), "sync runtime started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.completions.recv() => {
                    if let Err(e) = self.dispatch(event) {
                        tracing::warn!(error = %e, "completion rejected");
                    }
                },
                _ = sweep.tick() => {
                    if let Err(e) = self.dispatch(SyncEvent::Tick) {
                        tracing::warn!(error = %e, "tick rejected");
                    }
                },
            }
        }

        self.stop_tasks();
        tracing::debug!(room_id = %self.manager.room_id(), "sync runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Event { event, reply } => {
                let _ = reply.send(self.dispatch(event));
            },
            Command::SetSession { session, reply } => {
                let result = self.manager.set_session(session);
                self.publish();
                let _ = reply.send(result);
            },
            Command::SetRoom { room_id, reply } => {
                let result = self.manager.set_room(room_id);
                self.publish();
                let _ = reply.send(result);
            },
            Command::Shutdown => {},
        }
    }

    fn dispatch(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        let now = self.env.now();
        let result = self.manager.handle(now, event);

        if let Ok(actions) = &result {
            for action in actions.iter().cloned() {
                self.execute(action);
            }
        }

        self.publish();
        result.map(|_| ())
    }

    fn execute(&mut self, action: SyncAction) {
        match action {
            SyncAction::Call { ticket, purpose, method, request } => {
                self.spawn_call(ticket, purpose, method, request);
            },
            SyncAction::OpenStream { ticket, method, request } => {
                self.spawn_stream(ticket, method, request);
            },
            SyncAction::CancelStream => {
                if let Some(task) = self.stream_task.take() {
                    task.abort();
                }
            },
            SyncAction::SchedulePoll { ticket, after } => self.schedule_poll(ticket, after),
            SyncAction::CancelPoll => {
                if let Some(task) = self.poll_task.take() {
                    task.abort();
                }
            },
            SyncAction::StatusChanged(status) => {
                tracing::info!(room_id = %self.manager.room_id(), status = %status, "status");
            },
            SyncAction::MessageSent { message_id } => {
                tracing::debug!(message_id = %message_id, "message accepted");
            },
            SyncAction::SendFailed { reason } => {
                tracing::error!(reason = %reason, "send failed");
            },
            SyncAction::Delivered { message_ids } => {
                tracing::debug!(count = message_ids.len(), "messages delivered");
            },
            // Published after every dispatch
            SyncAction::ViewChanged => {},
        }
    }

    fn spawn_call(&self, ticket: Ticket, purpose: CallPurpose, method: Method, request: Bytes) {
        let transport = Arc::clone(&self.transport);
        let tx = self.completions_tx.clone();
        let metadata = self.metadata();
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, transport.call(method, request, &metadata))
                .await
                .unwrap_or(Err(TransportError::Timeout));

            if let Err(e) = &result {
                tracing::warn!(method = %method, purpose = ?purpose, error = %e, "call failed");
            }

            // Receiver is gone only after shutdown
            let _ = tx.send(SyncEvent::CallCompleted { ticket, result: result.map_err(Into::into) });
        });
    }

    fn spawn_stream(&mut self, ticket: Ticket, method: Method, request: Bytes) {
        let transport = Arc::clone(&self.transport);
        let tx = self.completions_tx.clone();
        let metadata = self.metadata();
        let timeout = self.request_timeout;

        let task = tokio::spawn(async move {
            let opened =
                tokio::time::timeout(timeout, transport.open_stream(method, request, &metadata))
                    .await
                    .unwrap_or(Err(TransportError::Timeout));

            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(method = %method, error = %e, "stream open failed");
                    let _ = tx.send(SyncEvent::StreamOpenFailed { ticket, reason: e.to_string() });
                    return;
                },
            };

            if tx.send(SyncEvent::StreamOpened { ticket }).is_err() {
                return;
            }

            loop {
                let event = match stream.next().await {
                    StreamEvent::Data(payload) => SyncEvent::StreamData { ticket, payload },
                    StreamEvent::Error(e) => {
                        tracing::warn!(error = %e, "stream failed");
                        let _ = tx.send(SyncEvent::StreamError { ticket, reason: e.to_string() });
                        break;
                    },
                    StreamEvent::End => {
                        let _ = tx.send(SyncEvent::StreamEnded { ticket });
                        break;
                    },
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.stream_task.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    fn schedule_poll(&mut self, ticket: Ticket, after: Duration) {
        let env = self.env.clone();
        let tx = self.completions_tx.clone();

        let task = tokio::spawn(async move {
            env.sleep(after).await;
            let _ = tx.send(SyncEvent::PollDue { ticket });
        });

        if let Some(previous) = self.poll_task.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata::with_token(self.manager.session().token())
    }

    fn publish(&self) {
        let next = RoomView::capture(&self.manager);
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn stop_tasks(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}
