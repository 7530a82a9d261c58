//! Frame pacing for clocked sources.
//!
//! Unit `k` after the anchor becomes available at
//! `anchor + (k + 1) * period`. Units that pile up beyond `capacity` are
//! dropped oldest first, as a live device would.

use framelink_core::{PluginError, PluginResult, Rational};
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Clone)]
pub(crate) struct Cadence {
    rate: Rational,
    anchor: Duration,
    anchor_index: u64,
    next_index: u64,
    capacity: u64,
    limit: Option<u64>,
}

impl Cadence {
    /// `rate` is units per second and must be valid and non-zero.
    pub(crate) fn new(rate: Rational, capacity: u64, limit: Option<u64>, now: Duration) -> Self {
        Self {
            rate,
            anchor: now,
            anchor_index: 0,
            next_index: 0,
            capacity: capacity.max(1),
            limit,
        }
    }

    pub(crate) fn rate(&self) -> Rational {
        self.rate
    }

    /// One past the last unit that has arrived by `now`.
    fn arrived_end(&self, now: Duration) -> u64 {
        let arrived = match now.checked_sub(self.anchor) {
            Some(elapsed) => {
                let scaled = elapsed.as_nanos() * u128::from(self.rate.numerator);
                scaled / (u128::from(self.rate.denominator) * NANOS_PER_SEC)
            }
            None => 0,
        };
        let end = u128::from(self.anchor_index) + arrived;
        let end = u64::try_from(end).unwrap_or(u64::MAX);
        match self.limit {
            Some(limit) => end.min(limit),
            None => end,
        }
    }

    /// Range of units currently queued, after overflow drops.
    fn window(&self, now: Duration) -> (u64, u64) {
        let end = self.arrived_end(now);
        let first = self.next_index.max(end.saturating_sub(self.capacity));
        (first, end.max(first))
    }

    pub(crate) fn pending(&self, now: Duration) -> u64 {
        let (first, end) = self.window(now);
        end - first
    }

    /// Index the next read would yield, if one is available at `now`.
    pub(crate) fn peek(&self, now: Duration) -> Option<u64> {
        let (first, end) = self.window(now);
        (first < end).then_some(first)
    }

    /// Marks `index` as consumed. Anything older that was still queued is
    /// gone too.
    pub(crate) fn commit(&mut self, index: u64) {
        if index > self.next_index {
            tracing::trace!(dropped = index - self.next_index, "queue overflow dropped units");
        }
        self.next_index = index.saturating_add(1);
    }

    /// When the next unit will be readable. `None` once a finite stream has
    /// delivered everything.
    pub(crate) fn next_arrival(&self, now: Duration) -> Option<Duration> {
        let (first, end) = self.window(now);
        if first < end {
            return Some(now);
        }
        if self.limit.is_some_and(|limit| end >= limit) {
            return None;
        }
        Some(self.arrival_of(end))
    }

    fn arrival_of(&self, index: u64) -> Duration {
        let units = u128::from(index.saturating_sub(self.anchor_index)) + 1;
        let nanos = (units * u128::from(self.rate.denominator) * NANOS_PER_SEC)
            .div_ceil(u128::from(self.rate.numerator));
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        self.anchor.saturating_add(Duration::from_nanos(nanos))
    }

    /// Re-anchors at `now` so that `index` is the next unit to arrive.
    pub(crate) fn seek(&mut self, index: u64, now: Duration) -> PluginResult<()> {
        if let Some(limit) = self.limit {
            if index >= limit {
                return Err(PluginError::error(format!(
                    "seek to {index} is past the end of a {limit} unit stream"
                )));
            }
        }
        self.anchor = now;
        self.anchor_index = index;
        self.next_index = index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn units_arrive_one_period_after_anchor() {
        let cadence = Cadence::new(Rational::new(25, 1), 8, None, Duration::ZERO);
        assert_eq!(cadence.pending(at(39)), 0);
        assert_eq!(cadence.peek(at(39)), None);
        assert_eq!(cadence.pending(at(40)), 1);
        assert_eq!(cadence.pending(at(120)), 3);
        assert_eq!(cadence.next_arrival(at(0)), Some(at(40)));
    }

    #[test]
    fn commit_consumes_in_order() {
        let mut cadence = Cadence::new(Rational::new(25, 1), 8, None, Duration::ZERO);
        let now = at(120);
        assert_eq!(cadence.peek(now), Some(0));
        cadence.commit(0);
        assert_eq!(cadence.peek(now), Some(1));
        assert_eq!(cadence.pending(now), 2);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut cadence = Cadence::new(Rational::new(25, 1), 2, None, Duration::ZERO);
        let now = at(200);
        assert_eq!(cadence.pending(now), 2);
        assert_eq!(cadence.peek(now), Some(3));
        cadence.commit(3);
        assert_eq!(cadence.peek(now), Some(4));
    }

    #[test]
    fn finite_stream_ends() {
        let mut cadence = Cadence::new(Rational::new(25, 1), 8, Some(2), Duration::ZERO);
        let now = at(1000);
        assert_eq!(cadence.pending(now), 2);
        cadence.commit(0);
        cadence.commit(1);
        assert_eq!(cadence.peek(now), None);
        assert_eq!(cadence.next_arrival(now), None);
        assert!(cadence.seek(2, now).is_err());
        cadence.seek(1, now).unwrap();
        assert_eq!(cadence.next_arrival(now), Some(now + at(40)));
    }

    #[test]
    fn fractional_rates_round_arrivals_up() {
        let cadence = Cadence::new(Rational::new(30000, 1001), 8, None, Duration::ZERO);
        let first = cadence.next_arrival(Duration::ZERO).unwrap();
        assert_eq!(first, Duration::from_nanos(33_366_667));
        assert_eq!(cadence.pending(first), 1);
        assert_eq!(cadence.pending(first - Duration::from_nanos(1)), 0);
    }

    #[test]
    fn seek_reanchors_at_now() {
        let mut cadence = Cadence::new(Rational::new(25, 1), 8, None, Duration::ZERO);
        cadence.seek(100, at(500)).unwrap();
        assert_eq!(cadence.pending(at(500)), 0);
        assert_eq!(cadence.peek(at(540)), Some(100));
    }
}
