//! Periodic tick schedule for a recording session.

use chrono::{DateTime, Duration, Utc};

/// Tracks when the next sampling tick is due.
///
/// One scheduler exists per active session. Ticks never overlap: `poll`
/// refuses to fire again until `finish_tick` is called, so a re-entrant
/// poll during tick execution is a no-op.
pub struct Scheduler {
    period: Duration,
    next_due: DateTime<Utc>,
    in_tick: bool,
}

impl Scheduler {
    pub fn new(period_secs: u32, now: DateTime<Utc>) -> Self {
        let period = Duration::seconds(period_secs.max(1) as i64);
        Self {
            period,
            next_due: now + period,
            in_tick: false,
        }
    }

    /// Whether a tick is due. On `true` the deadline advances to
    /// `now + period` (a late tick does not trigger a catch-up burst) and
    /// the tick-in-progress guard engages.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if self.in_tick || now < self.next_due {
            return false;
        }
        self.in_tick = true;
        self.next_due = now + self.period;
        true
    }

    /// Release the tick-in-progress guard.
    pub fn finish_tick(&mut self) {
        self.in_tick = false;
    }

    /// How long the host loop may block before the next tick is due.
    pub fn timeout_until_due(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_due - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, secs).unwrap()
    }

    #[test]
    fn test_not_due_before_period_elapses() {
        let mut scheduler = Scheduler::new(5, at(0));
        assert!(!scheduler.poll(at(4)));
        assert!(scheduler.poll(at(5)));
    }

    #[test]
    fn test_deadline_advances_from_fire_time() {
        let mut scheduler = Scheduler::new(2, at(0));
        // Late tick: next deadline is measured from when it fired.
        assert!(scheduler.poll(at(7)));
        scheduler.finish_tick();
        assert!(!scheduler.poll(at(8)));
        assert!(scheduler.poll(at(9)));
    }

    #[test]
    fn test_ticks_never_overlap() {
        let mut scheduler = Scheduler::new(1, at(0));
        assert!(scheduler.poll(at(1)));
        // Still inside the first tick: a due poll must not fire.
        assert!(!scheduler.poll(at(10)));
        scheduler.finish_tick();
        assert!(scheduler.poll(at(10)));
    }

    #[test]
    fn test_timeout_until_due() {
        let scheduler = Scheduler::new(5, at(0));
        assert_eq!(
            scheduler.timeout_until_due(at(2)),
            std::time::Duration::from_secs(3)
        );
        assert_eq!(
            scheduler.timeout_until_due(at(9)),
            std::time::Duration::ZERO
        );
    }
}
