//! Sync events and actions.

use std::time::Duration;

use bytes::Bytes;
use roomsync_proto::Method;

use crate::error::SyncError;

/// Correlates an action with the event that completes it.
///
/// `generation` changes on every connect and disconnect, so completions that
/// arrive after a disconnect never match the live session. `id` is unique
/// within the manager's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    /// Session generation the ticket was issued in
    pub generation: u64,
    /// Request id
    pub id: u64,
}

/// Why a unary call was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPurpose {
    /// Initial history load on connect
    ConnectHistory,
    /// Recurring poll
    Poll,
    /// User-requested refresh
    Refresh,
    /// Outgoing message
    Send,
}

/// Events the caller feeds into the connection manager.
///
/// The caller is responsible for:
/// - Executing calls and streams and reporting their outcome
/// - Firing scheduled polls
/// - Driving time forward via ticks
/// - Forwarding user intents (connect, send, load more)
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Join the configured room.
    Connect,

    /// Leave the room, cancelling the stream and poll timer.
    Disconnect,

    /// Disconnect and replace the session with a fresh one.
    Logout,

    /// A unary call finished.
    CallCompleted {
        /// Ticket from the `Call` action
        ticket: Ticket,
        /// Response message bytes or the failure
        result: Result<Bytes, SyncError>,
    },

    /// The stream was established.
    StreamOpened {
        /// Ticket from the `OpenStream` action
        ticket: Ticket,
    },

    /// The stream could not be established.
    StreamOpenFailed {
        /// Ticket from the `OpenStream` action
        ticket: Ticket,
        /// Failure description
        reason: String,
    },

    /// One pushed message.
    StreamData {
        /// Ticket from the `OpenStream` action
        ticket: Ticket,
        /// Encoded `MessageResponse`
        payload: Bytes,
    },

    /// The stream failed after opening.
    StreamError {
        /// Ticket from the `OpenStream` action
        ticket: Ticket,
        /// Failure description
        reason: String,
    },

    /// The server closed the stream.
    StreamEnded {
        /// Ticket from the `OpenStream` action
        ticket: Ticket,
    },

    /// A poll scheduled by `SchedulePoll` is due.
    PollDue {
        /// Ticket from the `SchedulePoll` action
        ticket: Ticket,
    },

    /// User wants to send a message.
    SendMessage {
        /// Message text
        content: String,
    },

    /// User wants to see one more page of older messages.
    LoadMore,

    /// User wants to re-fetch the room history.
    Refresh,

    /// Periodic housekeeping (confirmation expiry).
    Tick,
}

/// Actions the connection manager produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Issue a unary call; report with `CallCompleted`.
    Call {
        /// Correlation ticket
        ticket: Ticket,
        /// What the result is for
        purpose: CallPurpose,
        /// RPC to call
        method: Method,
        /// Encoded request message
        request: Bytes,
    },

    /// Open a server stream; report with the `Stream*` events.
    OpenStream {
        /// Correlation ticket
        ticket: Ticket,
        /// RPC to call
        method: Method,
        /// Encoded request message
        request: Bytes,
    },

    /// Cancel and discard the open stream.
    CancelStream,

    /// Fire `PollDue` after `after`.
    SchedulePoll {
        /// Correlation ticket
        ticket: Ticket,
        /// Delay before the poll
        after: Duration,
    },

    /// Cancel the scheduled poll.
    CancelPoll,

    /// Status text changed.
    StatusChanged(String),

    /// The server accepted a sent message.
    MessageSent {
        /// Id assigned by the server
        message_id: String,
    },

    /// A send failed.
    SendFailed {
        /// Failure description
        reason: String,
    },

    /// Sent messages were observed in the room.
    Delivered {
        /// Confirmed ids
        message_ids: Vec<String>,
    },

    /// The displayed page or its metadata changed.
    ViewChanged,
}
