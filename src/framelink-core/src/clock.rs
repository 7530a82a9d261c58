//! Time sources for stream pacing and timed reads.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// TAI is ahead of UTC by this many seconds (since 2017-01-01).
pub const TAI_UTC_OFFSET_SECS: u64 = 37;

pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Wall-clock time as TAI nanoseconds since 1970.
    fn tai_now_ns(&self) -> u64;
}

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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn tai_now_ns(&self) -> u64 {
        let utc = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let tai = utc + Duration::from_secs(TAI_UTC_OFFSET_SECS);
        u64::try_from(tai.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when advanced. Sleeping advances it instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    tai_base_ns: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manual clock whose TAI reading starts at `tai_base_ns`.
    pub fn with_tai_base(tai_base_ns: u64) -> Self {
        Self {
            elapsed: Mutex::new(Duration::ZERO),
            tai_base_ns,
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn tai_now_ns(&self) -> u64 {
        let elapsed = u64::try_from(self.now().as_nanos()).unwrap_or(u64::MAX);
        self.tai_base_ns.saturating_add(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::with_tai_base(1_000);
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(40));
        assert_eq!(clock.now(), Duration::from_millis(40));
        clock.sleep(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(50));
        assert_eq!(clock.tai_now_ns(), 1_000 + 50_000_000);
    }

    #[test]
    fn system_clock_is_ahead_of_utc() {
        let clock = SystemClock::new();
        let utc = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        assert!(clock.tai_now_ns() >= utc + TAI_UTC_OFFSET_SECS * 1_000_000_000);
    }
}
