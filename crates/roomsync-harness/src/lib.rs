//! Deterministic simulation harness for roomsync testing.
//!
//! In-memory implementations of the server and the [`Transport`] trait, so
//! the codec, the connection manager and the async runtime are tested end to
//! end without sockets or wall-clock time.
//!
//! # Model-Based Testing
//!
//! [`SimDriver`] runs a connection manager synchronously against
//! [`SimChatServer`]. Random [`Operation`] sequences interleave user intents
//! with network outcomes (late responses, failed calls, broken streams).
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold after every event. Use
//! [`InvariantRegistry::standard()`] for the room invariants.
//!
//! [`Transport`]: roomsync_client::Transport

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod operation;
pub mod sim_driver;
pub mod sim_server;
pub mod sim_transport;

pub use invariants::{
    DisconnectedIsIdle, DisplayNamesResolved, Invariant, InvariantRegistry, InvariantResult,
    PageWindow, RoomSnapshot, StoreSnapshot, UniqueMessageIds, Violation,
};
pub use operation::{Operation, SmallText};
pub use sim_driver::SimDriver;
pub use sim_server::{SharedSimServer, SimChatServer, create_shared_server};
pub use sim_transport::SimTransport;
