use core::cmp;

use super::{Duration, Expiration, Instant};

/// A clock that advances on demand.
///
/// The virtual clock replaces the live wait/poll loop in tests and
/// simulations: time moves only when [`elapse`] is called, and every alarm
/// that comes due inside the elapsed window fires synchronously, in deadline
/// order, before the call returns. Protocol scenarios replay identically on
/// every run.
///
/// [`elapse`]: #method.elapse
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Instant,
}

impl VirtualClock {
    /// Create a clock whose time starts at zero.
    pub fn new() -> Self {
        VirtualClock { now: Instant::from_micros(0) }
    }

    /// The current virtual time.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Advance the clock by `delta`, firing due alarms along the way.
    ///
    /// `poll` is invoked with the current time whenever alarms may have come
    /// due; it must dispatch them and report the next pending deadline. The
    /// clock steps to each deadline inside the window in order rather than
    /// jumping to the end, so an action that re-arms its alarm (a
    /// retransmission re-scheduling itself, say) fires again within the same
    /// `elapse` call.
    pub fn elapse<F>(&mut self, delta: Duration, mut poll: F)
    where
        F: FnMut(Instant) -> Expiration,
    {
        let target = self.now + delta;
        while self.now < target {
            match poll(self.now) {
                Expiration::When(at) if at < target => {
                    self.now = cmp::max(at, self.now);
                }
                _ => self.now = target,
            }
        }
        poll(self.now);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::Alarm;

    #[test]
    fn elapse_fires_in_order() {
        let mut clock = VirtualClock::new();
        let mut first = Alarm::new();
        let mut second = Alarm::new();
        first.set(Instant::from_millis(3));
        second.set(Instant::from_millis(7));

        let mut fired = Vec::new();
        clock.elapse(Duration::from_millis(10), |now| {
            if first.fire(now) {
                fired.push(("first", now));
            }
            if second.fire(now) {
                fired.push(("second", now));
            }
            cmp::min(first.deadline(), second.deadline())
        });

        assert_eq!(clock.now(), Instant::from_millis(10));
        assert_eq!(fired, vec![
            ("first", Instant::from_millis(3)),
            ("second", Instant::from_millis(7)),
        ]);
    }

    #[test]
    fn rearmed_alarm_fires_repeatedly() {
        let mut clock = VirtualClock::new();
        let mut alarm = Alarm::new();
        alarm.set(Instant::from_secs(1));

        let mut count = 0;
        clock.elapse(Duration::from_secs(3), |now| {
            if alarm.fire(now) {
                count += 1;
                alarm.set(now + Duration::from_secs(1));
            }
            alarm.deadline()
        });

        // due at 1s, 2s and 3s
        assert_eq!(count, 3);
    }

    #[test]
    fn deadline_outside_window_stays_pending() {
        let mut clock = VirtualClock::new();
        let mut alarm = Alarm::new();
        alarm.set(Instant::from_secs(5));

        clock.elapse(Duration::from_secs(2), |now| {
            assert!(!alarm.fire(now));
            alarm.deadline()
        });

        assert_eq!(clock.now(), Instant::from_secs(2));
        assert!(alarm.is_set());
    }
}
