use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

/// Time source for the recording pipeline.
///
/// Wall-clock milliseconds drive track bookkeeping (durations, waypoint
/// times). The monotonic counter is only used to judge fix age, so a user
/// changing the system time cannot make stale fixes look fresh.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Monotonic nanoseconds since an arbitrary fixed origin
    fn elapsed_realtime_nanos(&self) -> i64;
}

/// Clock backed by the system time and `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn elapsed_realtime_nanos(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Hand-driven clock for replays and tests. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
    nanos: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start at `start_millis` wall time with the monotonic counter at zero
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
            nanos: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Advance both clocks by `millis`
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
        self.nanos.fetch_add(millis * 1_000_000, Ordering::SeqCst);
    }

    /// Jump the wall clock only (simulates a user changing the system time)
    pub fn set_wall_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn elapsed_realtime_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();
        clock.advance(250);
        assert_eq!(shared.now_millis(), 1_250);
        assert_eq!(shared.elapsed_realtime_nanos(), 250_000_000);
    }

    #[test]
    fn test_wall_jump_keeps_monotonic() {
        let clock = ManualClock::new(5_000);
        clock.advance(10);
        clock.set_wall_millis(0);
        assert_eq!(clock.now_millis(), 0);
        assert_eq!(clock.elapsed_realtime_nanos(), 10_000_000);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.elapsed_realtime_nanos();
        let b = clock.elapsed_realtime_nanos();
        assert!(b >= a);
        assert!(clock.now_millis() > 0);
    }
}
