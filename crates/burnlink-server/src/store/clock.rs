use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" for expiry decisions. The store only trusts its own clock.
pub trait Clock: Send + Sync {
    /// Current unix time in milliseconds.
    fn now_millis(&self) -> i64;

    /// Current unix time in whole seconds, rounded down.
    fn now(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Settable clock for tests. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    /// Starts at `start` unix seconds.
    pub fn new(start: i64) -> Self {
        Self::from_millis(start.saturating_mul(1000))
    }

    pub fn from_millis(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now.saturating_mul(1000), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.advance_millis(secs.saturating_mul(1000));
    }

    pub fn advance_millis(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_down() {
        let clock = ManualClock::from_millis(1_999);
        assert_eq!(clock.now(), 1);
        clock.advance_millis(1);
        assert_eq!(clock.now(), 2);
        clock.advance(3);
        assert_eq!(clock.now_millis(), 5_000);

        let before_epoch = ManualClock::from_millis(-1);
        assert_eq!(before_epoch.now(), -1);
    }
}
