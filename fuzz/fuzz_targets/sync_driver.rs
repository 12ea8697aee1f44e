//! Fuzz target for the connection manager
//!
//! Drives a room connection against the in-memory server with arbitrary
//! operation sequences: user intents, late and failed responses, broken
//! streams and clock jumps.
//!
//! # Invariants
//!
//! - No panics
//! - The standard room invariants hold after every event (checked by the
//!   driver)

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomsync_core::SyncConfig;
use roomsync_harness::{create_shared_server, InvariantRegistry, Operation, SimDriver};

fuzz_target!(|ops: Vec<Operation>| {
    let config = SyncConfig { page_size: 3, ..SyncConfig::default() };
    let mut driver = SimDriver::new(create_shared_server(), "alice", "general", config)
        .with_invariants(InvariantRegistry::standard());

    for op in ops.iter().take(256) {
        let _ = driver.apply(op);
    }
});
