//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest (or decoded from fuzzer
//! input) and applied to a [`crate::SimDriver`]. They mix user intents with
//! network outcomes so the order of completions is part of the search space.

use arbitrary::Arbitrary;

/// One step of a simulated session.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Join the room.
    Connect,
    /// Leave the room.
    Disconnect,
    /// Log out, which also leaves the room.
    Logout,
    /// Log back in after a logout.
    Login,
    /// Send a message from the local user.
    Send(SmallText),
    /// Another user posts to the room.
    ExternalPost(SmallText),
    /// Show one more page.
    LoadMore,
    /// Re-fetch history.
    Refresh,
    /// Complete the oldest outstanding call.
    DeliverNext,
    /// Complete every outstanding call and drain the stream.
    Settle,
    /// Make the next completed call fail.
    FailNextCall,
    /// Server closes the stream.
    EndStream,
    /// Stream breaks with an error.
    FailStream,
    /// Toggle refusing new streams.
    ToggleStreams,
    /// Advance the clock by this many milliseconds.
    Advance(u16),
}

/// Short message body. Zero maps to an empty body, which must be rejected.
#[derive(Debug, Clone, Copy, Arbitrary)]
pub struct SmallText(pub u8);

impl SmallText {
    /// Message body for this value.
    pub fn body(self) -> String {
        if self.0 == 0 { String::new() } else { format!("message {}", self.0) }
    }
}
