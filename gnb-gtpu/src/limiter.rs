//! Per-UE AMBR enforcement.

use std::sync::Mutex;
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter for the UE's Aggregate Maximum Bit Rate.
///
/// One limiter is shared by all tunnels of a UE; each received PDU consumes
/// its on-the-wire length in bytes. Refill is lazy, computed from the time
/// elapsed since the last successful or failed consume.
pub struct UeAmbrLimiter {
    rate_bytes_per_sec: f64,
    capacity_bytes: f64,
    state: Mutex<BucketState>,
}

impl UeAmbrLimiter {
    /// Creates a limiter with the given sustained rate and burst capacity.
    /// The bucket starts full.
    pub fn new(rate_bytes_per_sec: u64, capacity_bytes: u64, now: Instant) -> Self {
        Self {
            rate_bytes_per_sec: rate_bytes_per_sec as f64,
            capacity_bytes: capacity_bytes as f64,
            state: Mutex::new(BucketState {
                tokens: capacity_bytes as f64,
                last_refill: now,
            }),
        }
    }

    /// Attempts to consume `bytes` tokens. Returns false when the bucket
    /// does not hold enough, in which case nothing is consumed.
    pub fn consume(&self, bytes: usize, now: Instant) -> bool {
        let mut st = self.state.lock().unwrap();
        let elapsed = now.saturating_duration_since(st.last_refill);
        st.tokens =
            (st.tokens + elapsed.as_secs_f64() * self.rate_bytes_per_sec).min(self.capacity_bytes);
        st.last_refill = now;

        if st.tokens >= bytes as f64 {
            st.tokens -= bytes as f64;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, in bytes.
    pub fn available(&self, now: Instant) -> usize {
        let st = self.state.lock().unwrap();
        let elapsed = now.saturating_duration_since(st.last_refill);
        (st.tokens + elapsed.as_secs_f64() * self.rate_bytes_per_sec).min(self.capacity_bytes)
            as usize
    }
}
