//! Injectable wall clock.
//!
//! All staleness, dedup and spacing windows compare epoch milliseconds, so
//! the clock sits behind a trait and tests can drive time deterministically.

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
