//! Client
//!
//! IO side of roomsync. Executes the actions produced by
//! [`roomsync_core::ConnectionManager`] against a real server.
//!
//! # Architecture
//!
//! The sync logic stays in the Sans-IO core. This crate supplies the pieces
//! that touch the outside world:
//! - A [`Transport`] seam for unary calls and server streams
//! - A [`SyncRuntime`] that feeds transport results back into the manager
//!   and publishes a [`RoomView`]
//! - An [`AuthClient`] for the account RPCs that happen before joining a room
//!
//! # Components
//!
//! - [`Transport`]: RPC transport trait
//! - [`StreamHandle`]: Cancellable server stream
//! - [`SyncRuntime`] / [`RuntimeHandle`]: Room connection on tokio
//! - [`AuthClient`]: Register, login, token validation
//! - [`SystemEnv`]: Tokio clock
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`grpc_web::GrpcWebTransport`], a gRPC-web transport over HTTP.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod auth;
pub mod config;
mod error;
pub mod runtime;
mod system_env;
pub mod transport;

#[cfg(feature = "transport")]
pub mod grpc_web;

pub use auth::AuthClient;
pub use config::ClientConfig;
pub use error::TransportError;
pub use runtime::{RoomView, RuntimeHandle, SyncRuntime};
pub use system_env::SystemEnv;
pub use transport::{Metadata, StreamEvent, StreamHandle, Transport};
