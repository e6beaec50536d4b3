//! Bandwidth shaping using the token bucket algorithm
//!
//! - Tokens are bytes, refilled at `bytes_per_second`
//! - The bucket holds at most one second's worth, so short bursts pass
//! - Transfers larger than what is available push the bucket into debt and
//!   the caller sleeps until it is paid back

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct LinkSpeed {
    tokens: f64,
    capacity: f64,
    bytes_per_second: f64,
    last_refill: Instant,
}

impl LinkSpeed {
    #[allow(clippy::cast_precision_loss, reason = "Link speeds are far below 2^52")]
    #[must_use]
    pub fn new(bytes_per_second: u64) -> Self {
        let rate = bytes_per_second.max(1) as f64;
        Self {
            tokens: rate,
            capacity: rate,
            bytes_per_second: rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(self.bytes_per_second, self.tokens).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes `bytes` from the bucket and returns how long to wait before
    /// the transfer is within the configured rate.
    #[allow(clippy::cast_precision_loss, reason = "Chunk sizes are tiny")]
    pub fn reserve(&mut self, bytes: usize, now: Instant) -> Duration {
        self.refill(now);
        self.tokens -= bytes as f64;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.bytes_per_second)
        }
    }

    /// Sleeps as long as needed to keep `bytes` within the rate.
    pub async fn pace(&mut self, bytes: usize) {
        let delay = self.reserve(bytes, Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
