//! Environment abstraction for deterministic testing.
//!
//! Decouples sync logic from the clock. Production uses the tokio clock, which
//! tests can pause and advance; pure state machine tests use [`test_utils`].

use std::{fmt::Debug, ops::Sub, time::Duration};

/// Abstract environment providing time and async sleep.
///
/// # Invariants
///
/// - `now()` never goes backwards
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    type Instant: Copy + Ord + Debug + Send + Sync + Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; the sync state machine never does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Manual clock for state machine tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use super::Environment;

    /// Environment whose clock only moves when told to.
    ///
    /// Clones share the same clock. `sleep` advances the clock and returns
    /// immediately.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        base: Instant,
        offset_micros: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Clock starting at an arbitrary fixed origin.
        pub fn new() -> Self {
            Self { base: Instant::now(), offset_micros: Arc::new(AtomicU64::new(0)) }
        }

        /// Move the clock forward.
        pub fn advance(&self, duration: Duration) {
            let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
            self.offset_micros.fetch_add(micros, Ordering::SeqCst);
        }

        /// Time elapsed since the origin.
        pub fn elapsed(&self) -> Duration {
            Duration::from_micros(self.offset_micros.load(Ordering::SeqCst))
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            self.base + self.elapsed()
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.advance(duration);
            std::future::ready(())
        }
    }

}
