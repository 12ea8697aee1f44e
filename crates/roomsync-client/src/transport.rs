//! Transport abstraction for RPC calls and server streams.
//!
//! [`Transport`] is the seam between the runtime and the network. The
//! runtime only ever sees encoded request and response messages; framing,
//! headers and status handling belong to the implementation.
//!
//! Server streams surface as a [`StreamHandle`], a channel of
//! [`StreamEvent`]s fed by a task the implementation owns. Dropping or
//! cancelling the handle aborts that task.

use async_trait::async_trait;
use bytes::Bytes;
use roomsync_proto::Method;
use tokio::{sync::mpsc, task::AbortHandle};

use crate::error::TransportError;

/// Buffered events per stream before the producer waits.
pub const STREAM_BUFFER: usize = 64;

/// Per-call metadata sent as request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// No metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying a bearer token, if there is one.
    pub fn with_token(token: Option<&str>) -> Self {
        let mut metadata = Self::new();
        if let Some(token) = token {
            metadata.insert("authorization", format!("Bearer {token}"));
        }
        metadata
    }

    /// Add or replace an entry. Names are lowercased.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up an entry.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    /// Bearer token from the `authorization` entry.
    pub fn bearer_token(&self) -> Option<&str> {
        self.get("authorization").and_then(|v| v.strip_prefix("Bearer "))
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Event on an open server stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// One encoded message.
    Data(Bytes),
    /// The stream failed. No further events follow.
    Error(TransportError),
    /// The server closed the stream cleanly. No further events follow.
    End,
}

/// Receiving side of an open server stream.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    abort_handle: Option<AbortHandle>,
}

impl StreamHandle {
    /// Wrap a receiver fed by the task behind `abort_handle`.
    pub fn new(events: mpsc::Receiver<StreamEvent>, abort_handle: Option<AbortHandle>) -> Self {
        Self { events, abort_handle }
    }

    /// Channel-backed handle for in-process producers.
    pub fn channel() -> (mpsc::Sender<StreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (tx, Self::new(rx, None))
    }

    /// Attach the producer task to abort when the handle is cancelled.
    pub fn with_abort_handle(mut self, abort_handle: AbortHandle) -> Self {
        self.abort_handle = Some(abort_handle);
        self
    }

    /// Next event.
    ///
    /// A producer that goes away without a final event reads as
    /// [`StreamEvent::End`].
    pub async fn next(&mut self) -> StreamEvent {
        self.events.recv().await.unwrap_or(StreamEvent::End)
    }

    /// Next event if one is already queued.
    ///
    /// Returns `None` while the producer is alive but idle. A producer that
    /// went away reads as [`StreamEvent::End`].
    pub fn try_next(&mut self) -> Option<StreamEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(StreamEvent::End),
        }
    }

    /// Stop the producer and close the channel.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.abort_handle.take() {
            handle.abort();
        }
        self.events.close();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// RPC transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue a unary call and return the encoded response message.
    ///
    /// # Errors
    ///
    /// - `TransportError::Connection` if the server is unreachable
    /// - `TransportError::Status` if the call finished with a non-OK status
    /// - `TransportError::Protocol` if the response is not a valid reply
    async fn call(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<Bytes, TransportError>;

    /// Open a server stream.
    ///
    /// Returns once the server has accepted the call. Failures after that
    /// arrive as [`StreamEvent::Error`].
    ///
    /// # Errors
    ///
    /// - `TransportError::Connection` if the server is unreachable
    /// - `TransportError::Status` if the server rejects the call up front
    async fn open_stream(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<StreamHandle, TransportError>;
}
