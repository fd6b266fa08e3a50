//! Real-time pacing of the emitted stream

use std::time::Duration;
use tokio::time::Instant;

/// Delays emission so that bytes leave at `bitrate / 8` bytes per second
///
/// The schedule is absolute (computed from the first byte), so small timer
/// jitter does not accumulate into drift.
#[derive(Debug)]
pub struct RateLimiter {
    bytes_per_sec: f64,
    started: Option<Instant>,
    sent: u64,
}

impl RateLimiter {
    /// `bitrate` in bits per second
    pub fn new(bitrate: u32) -> Self {
        Self {
            bytes_per_sec: (bitrate.max(8) as f64) / 8.0,
            started: None,
            sent: 0,
        }
    }

    pub fn bytes_per_sec(&self) -> f64 {
        self.bytes_per_sec
    }

    /// Accounts for `len` bytes and waits until they are due
    pub async fn pace(&mut self, len: usize) {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.sent += len as u64;
        let due = started + Duration::from_secs_f64(self.sent as f64 / self.bytes_per_sec);
        tokio::time::sleep_until(due).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_paces_to_bitrate() {
        let mut limiter = RateLimiter::new(128_000);
        assert_eq!(limiter.bytes_per_sec(), 16_000.0);

        let start = Instant::now();
        for _ in 0..10 {
            limiter.pace(1_600).await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(999));
        assert!(elapsed <= Duration::from_millis(1010));
    }
}
