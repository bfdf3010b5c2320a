//! Exponential backoff with jitter for reading inputs from slow or flaky
//! storage (network mounts, object-store fuses).

use rand::Rng;
use std::future::Future;
use std::io;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            jitter_ratio: 0.2,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.max);
        jittered(self.current, self.jitter_ratio)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(5))
    }
}

/// Stretch `delay` by a random share of at most `ratio`.
fn jittered(delay: Duration, ratio: f64) -> Duration {
    let spread_ms = (delay.as_millis() as f64 * ratio.clamp(0.0, 1.0)) as u64;
    if spread_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread_ms))
}

/// Missing or malformed inputs will not fix themselves.
fn is_transient(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
    )
}

/// Run `op` up to `retries + 1` times, sleeping per `backoff` between
/// transient failures.
pub async fn retry<T, F, Fut>(what: &str, retries: u32, mut backoff: Backoff, mut op: F) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retries && is_transient(&err) => {
                attempt += 1;
                let delay = backoff.fail();
                tracing::warn!(input = what, attempt, ?delay, error = %err, "load failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
