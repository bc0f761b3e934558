//! Fixed-attempt retry for extraction commands.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Attempt count and delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or `max_tries` attempts have failed, and
    /// return the last error unchanged. At least one attempt is always made.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_tries = self.max_tries.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_tries => return Err(e),
                Err(e) => {
                    warn!(
                        attempt,
                        max_tries,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
