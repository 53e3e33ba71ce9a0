//! Heartbeat acknowledgment tracking
//!
//! Pure bookkeeping driven by explicit instants, so staleness can be checked
//! without a running connection or real sleeps.

use std::time::Duration;

use tokio::time::Instant;

/// Raised once when heartbeats have gone unacknowledged for the whole window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleConnectionWarning {
    /// Time since the oldest unacknowledged heartbeat was sent
    pub silent_for: Duration,
    /// Heartbeats sent without any liveness response
    pub missed_acks: u32,
    /// `missed_ack_limit × heartbeat_interval`
    pub window: Duration,
}

/// Tracks liveness responses against sent heartbeats
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    interval: Duration,
    missed_ack_limit: u32,
    last_liveness: Option<Instant>,
    oldest_unacked: Option<Instant>,
    unacked: u32,
    warned: bool,
}

impl LivenessTracker {
    pub fn new(interval: Duration, missed_ack_limit: u32) -> Self {
        Self {
            interval,
            missed_ack_limit: missed_ack_limit.max(1),
            last_liveness: None,
            oldest_unacked: None,
            unacked: 0,
            warned: false,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Silence tolerated before a warning
    pub fn window(&self) -> Duration {
        self.interval.saturating_mul(self.missed_ack_limit)
    }

    pub fn last_liveness(&self) -> Option<Instant> {
        self.last_liveness
    }

    pub fn unacked(&self) -> u32 {
        self.unacked
    }

    /// A pong or heartbeat ack arrived; re-arms the warning
    pub fn record_liveness(&mut self, now: Instant) {
        self.last_liveness = Some(now);
        self.oldest_unacked = None;
        self.unacked = 0;
        self.warned = false;
    }

    pub fn record_heartbeat_sent(&mut self, now: Instant) {
        if self.oldest_unacked.is_none() {
            self.oldest_unacked = Some(now);
        }
        self.unacked = self.unacked.saturating_add(1);
    }

    /// Returns a warning the first time the window is exceeded
    ///
    /// Further calls stay silent until liveness is recorded again.
    pub fn check(&mut self, now: Instant) -> Option<StaleConnectionWarning> {
        let since = self.oldest_unacked?;
        if self.warned {
            return None;
        }

        let silent_for = now.saturating_duration_since(since);
        let window = self.window();
        if silent_for < window {
            return None;
        }

        self.warned = true;
        Some(StaleConnectionWarning {
            silent_for,
            missed_acks: self.unacked,
            window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(20);

    /// Drive `ticks` heartbeat ticks without any acknowledgment, collecting warnings
    fn run_unacked(tracker: &mut LivenessTracker, start: Instant, ticks: u32) -> Vec<StaleConnectionWarning> {
        let mut warnings = Vec::new();
        for n in 1..=ticks {
            let now = start + INTERVAL * n;
            warnings.extend(tracker.check(now));
            tracker.record_heartbeat_sent(now);
        }
        warnings
    }

    #[test]
    fn test_no_warning_before_any_heartbeat() {
        let mut tracker = LivenessTracker::new(INTERVAL, 3);
        let start = Instant::now();
        assert!(tracker.check(start + Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn test_single_warning_after_three_missed_acks() {
        let mut tracker = LivenessTracker::new(INTERVAL, 3);
        let start = Instant::now();

        let warnings = run_unacked(&mut tracker, start, 10);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].missed_acks, 3);
        assert_eq!(warnings[0].window, Duration::from_secs(60));
        assert_eq!(warnings[0].silent_for, Duration::from_secs(60));
    }

    #[test]
    fn test_no_warning_inside_window() {
        let mut tracker = LivenessTracker::new(INTERVAL, 3);
        let start = Instant::now();
        assert!(run_unacked(&mut tracker, start, 3).is_empty());
        assert_eq!(tracker.unacked(), 3);
    }

    #[test]
    fn test_acks_keep_connection_fresh() {
        let mut tracker = LivenessTracker::new(INTERVAL, 3);
        let start = Instant::now();

        for n in 1..=20 {
            let now = start + INTERVAL * n;
            assert!(tracker.check(now).is_none());
            tracker.record_heartbeat_sent(now);
            tracker.record_liveness(now + Duration::from_millis(50));
        }
        assert_eq!(tracker.unacked(), 0);
        assert!(tracker.last_liveness().is_some());
    }

    #[test]
    fn test_liveness_rearms_warning() {
        let mut tracker = LivenessTracker::new(INTERVAL, 3);
        let start = Instant::now();

        assert_eq!(run_unacked(&mut tracker, start, 5).len(), 1);

        let recovered = start + INTERVAL * 5 + Duration::from_secs(1);
        tracker.record_liveness(recovered);
        assert_eq!(run_unacked(&mut tracker, recovered, 5).len(), 1);
    }

    #[test]
    fn test_limit_of_zero_is_treated_as_one() {
        let mut tracker = LivenessTracker::new(INTERVAL, 0);
        assert_eq!(tracker.window(), INTERVAL);
        let start = Instant::now();
        assert_eq!(run_unacked(&mut tracker, start, 3).len(), 1);
    }

    #[test]
    fn test_interval_change_moves_window() {
        let mut tracker = LivenessTracker::new(INTERVAL, 3);
        tracker.set_interval(Duration::from_millis(100));
        assert_eq!(tracker.window(), Duration::from_millis(300));
    }
}
