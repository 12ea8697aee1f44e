//! Core
//!
//! Sans-IO message synchronization for a room-based chat client. Keeps a
//! local, deduplicated, paginated view of a room consistent with the server
//! using either a push stream or a fallback poll loop.
//!
//! # Architecture
//!
//! [`ConnectionManager`] receives events ([`SyncEvent`]), processes them
//! through pure state machine logic, and returns actions ([`SyncAction`]) for
//! the caller to execute. Time is passed in; nothing here performs I/O, so the
//! same logic runs in production and in deterministic tests.
//!
//! # Components
//!
//! - [`ConnectionManager`]: Streaming/polling arbitration and merge pipeline
//! - [`MessageStore`]: Ordered, deduplicated messages plus [`PaginationWindow`]
//! - [`PendingConfirmationTracker`]: Sent ids awaiting confirmation
//! - [`Session`]: Logged-in user and [`DisplayNameCache`]
//! - [`validate`]: Input checks applied before any RPC

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod event;
pub mod message;
pub mod pending;
pub mod session;
pub mod store;
pub mod validate;

pub use connection::{ConnectionManager, ConnectionState, SyncConfig};
pub use env::Environment;
pub use error::{SyncError, ValidationError};
pub use event::{CallPurpose, SyncAction, SyncEvent, Ticket};
pub use message::{Message, Timestamp};
pub use pending::PendingConfirmationTracker;
pub use session::{Session, UserIdentity};
pub use store::{DisplayNameCache, MergeOutcome, MergeStrategy, MessageStore, PaginationWindow};
