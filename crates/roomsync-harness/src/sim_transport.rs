//! Transport backed by [`SimChatServer`] with fault injection.
//!
//! Faults are either scripted (fail the next N calls, refuse streams, go
//! offline) or drawn from a seeded RNG, so a failing run reproduces from its
//! seed.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roomsync_client::{Metadata, StreamHandle, Transport, TransportError};
use roomsync_proto::Method;

use crate::sim_server::SharedSimServer;

#[derive(Default)]
struct Faults {
    offline: bool,
    refuse_streams: bool,
    fail_next: HashMap<Method, u32>,
    random: Option<(ChaCha8Rng, f64)>,
    calls: Vec<Method>,
}

impl Faults {
    /// Decide whether this call fails, consuming scripted failures.
    fn should_fail(&mut self, method: Method) -> bool {
        self.calls.push(method);
        if self.offline {
            return true;
        }
        if let Some(remaining) = self.fail_next.get_mut(&method)
            && *remaining > 0
        {
            *remaining -= 1;
            return true;
        }
        match &mut self.random {
            Some((rng, rate)) => rng.gen_bool(*rate),
            None => false,
        }
    }
}

/// Transport that talks to an in-memory server.
pub struct SimTransport {
    server: SharedSimServer,
    faults: Mutex<Faults>,
}

impl SimTransport {
    /// Transport with no faults.
    pub fn new(server: SharedSimServer) -> Self {
        Self { server, faults: Mutex::new(Faults::default()) }
    }

    /// Fail calls and stream opens at random with probability `rate`.
    ///
    /// `rate` is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_failure_rate(self, seed: u64, rate: f64) -> Self {
        self.faults().random = Some((ChaCha8Rng::seed_from_u64(seed), rate.clamp(0.0, 1.0)));
        self
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Server behind this transport.
    pub fn server(&self) -> &SharedSimServer {
        &self.server
    }

    /// Fail every call and stream open until set back.
    pub fn set_offline(&self, offline: bool) {
        self.faults().offline = offline;
    }

    /// Refuse stream opens until set back.
    pub fn refuse_streams(&self, refuse: bool) {
        self.faults().refuse_streams = refuse;
    }

    /// Fail the next `count` calls of `method`.
    pub fn fail_next(&self, method: Method, count: u32) {
        *self.faults().fail_next.entry(method).or_default() += count;
    }

    /// Methods called so far, in order, including failed attempts.
    pub fn calls(&self) -> Vec<Method> {
        self.faults().calls.clone()
    }

    /// Number of calls made to `method`.
    pub fn call_count(&self, method: Method) -> usize {
        self.faults().calls.iter().filter(|m| **m == method).count()
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn call(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<Bytes, TransportError> {
        if self.faults().should_fail(method) {
            return Err(TransportError::Connection(format!("injected failure on {method}")));
        }
        self.server.handle_call(method, &request, metadata)
    }

    async fn open_stream(
        &self,
        method: Method,
        request: Bytes,
        metadata: &Metadata,
    ) -> Result<StreamHandle, TransportError> {
        let refused = {
            let mut faults = self.faults();
            faults.should_fail(method) || faults.refuse_streams
        };
        if refused {
            return Err(TransportError::Connection(format!("injected failure on {method}")));
        }
        self.server.open_stream(method, &request, metadata)
    }
}
