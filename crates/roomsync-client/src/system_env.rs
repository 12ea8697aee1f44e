//! Production environment backed by the tokio clock.

use std::time::Duration;

use roomsync_core::Environment;
use tokio::time::Instant;

/// Production environment.
///
/// Uses the tokio clock so tests running with paused time stay
/// deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_follows_paused_clock() {
        let env = SystemEnv::new();
        let start = env.now();

        env.sleep(Duration::from_secs(30)).await;

        assert!(env.now() - start >= Duration::from_secs(30));
    }
}
