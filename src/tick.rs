//! Fixed-interval tick scheduling.
//!
//! Ticks fire when the clock crosses an absolute deadline that advances by
//! exactly one interval per fired tick. Comparing against the deadline
//! rather than against time-since-last-step keeps drift from compounding.
//! After a stall the scheduler is behind by several ticks; it catches up one
//! tick per poll instead of bursting.
use std::time::{Duration, Instant};

/// Default simulation tick length.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(30);

#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
    next_deadline: Instant,
    fired: u64,
}

impl TickScheduler {
    /// First tick is due one `interval` after `start`. `interval` must be
    /// non-zero.
    pub fn new(interval: Duration, start: Instant) -> Self {
        debug_assert!(!interval.is_zero(), "tick interval must be non-zero");
        Self {
            interval,
            next_deadline: start + interval,
            fired: 0,
        }
    }

    /// Returns true if a tick is due at `now`, advancing the deadline by one
    /// interval. At most one tick per call.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_deadline {
            return false;
        }
        self.next_deadline += self.interval;
        self.fired += 1;
        true
    }

    /// Number of ticks already due at `now` that have not fired yet.
    pub fn behind(&self, now: Instant) -> u64 {
        if now < self.next_deadline {
            return 0;
        }
        let overdue = (now - self.next_deadline).as_nanos() / self.interval.as_nanos();
        u64::try_from(overdue).unwrap_or(u64::MAX).saturating_add(1)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[cfg(test)]
    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Ticks fired since `start`.
    pub fn ticks_fired(&self) -> u64 {
        self.fired
    }
}
