use super::{Duration, Expiration, Instant};

/// A one-shot deadline owned by the component that scheduled it.
///
/// An alarm carries no callback of its own. The owning component keeps one
/// alarm per purpose (a send buffer its retransmission alarm, a session its
/// TIME-WAIT alarm) and when the driving clock reports the alarm due via
/// [`fire`], the owner dispatches the matching action itself. Firing clears
/// the deadline *before* the owner acts, so the action may safely re-arm the
/// same alarm.
///
/// [`fire`]: #method.fire
#[derive(Debug, Default)]
pub struct Alarm {
    deadline: Option<Instant>,
}

impl Alarm {
    /// Reschedules below this threshold are ignored by [`update`].
    ///
    /// [`update`]: #method.update
    pub const DEFAULT_GRANULARITY: Duration = Duration::from_millis(1);

    /// Create an unarmed alarm.
    pub fn new() -> Self {
        Alarm { deadline: None }
    }

    /// Arm the alarm to come due at `deadline`.
    ///
    /// # Panics
    /// Must not be called while the alarm is armed. To reschedule, call
    /// [`cancel`] first or use [`update`].
    ///
    /// [`cancel`]: #method.cancel
    /// [`update`]: #method.update
    pub fn set(&mut self, deadline: Instant) {
        assert!(self.deadline.is_none(), "alarm is already set");
        self.deadline = Some(deadline);
    }

    /// Disarm the alarm. A no-op if it is not armed.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Re-arm to a new deadline, or disarm when `deadline` is `None`.
    ///
    /// An armed alarm is only moved when the deadline changes by more than
    /// `granularity`; rescheduling for a negligible difference would churn
    /// the driving clock for nothing.
    pub fn update(&mut self, deadline: Option<Instant>, granularity: Duration) {
        let deadline = match deadline {
            None => return self.cancel(),
            Some(deadline) => deadline,
        };

        if let Some(current) = self.deadline {
            if current - deadline <= granularity {
                return;
            }
        }

        self.deadline = Some(deadline);
    }

    /// Whether the alarm is armed.
    pub fn is_set(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if any.
    pub fn deadline(&self) -> Expiration {
        self.deadline.into()
    }

    /// Report whether the alarm has come due at `now`, clearing the deadline
    /// if so.
    ///
    /// The owner runs its action exactly once per armed deadline:
    ///
    /// ```
    /// # use ustack::time::{Alarm, Instant};
    /// # let mut alarm = Alarm::new();
    /// # let now = Instant::from_secs(1);
    /// # fn retransmit() {}
    /// if alarm.fire(now) {
    ///     retransmit();
    /// }
    /// ```
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_and_fire() {
        let mut alarm = Alarm::new();
        assert!(!alarm.is_set());
        alarm.set(Instant::from_millis(10));
        assert!(alarm.is_set());
        assert!(!alarm.fire(Instant::from_millis(9)));
        assert!(alarm.is_set());
        assert!(alarm.fire(Instant::from_millis(10)));
        assert!(!alarm.is_set());
        // cleared: the same deadline does not fire twice
        assert!(!alarm.fire(Instant::from_millis(11)));
    }

    #[test]
    #[should_panic(expected = "alarm is already set")]
    fn double_set() {
        let mut alarm = Alarm::new();
        alarm.set(Instant::from_millis(1));
        alarm.set(Instant::from_millis(2));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut alarm = Alarm::new();
        alarm.cancel();
        alarm.set(Instant::from_millis(1));
        alarm.cancel();
        assert!(!alarm.is_set());
        alarm.cancel();
    }

    #[test]
    fn update_granularity() {
        let mut alarm = Alarm::new();
        alarm.update(Some(Instant::from_millis(100)), Alarm::DEFAULT_GRANULARITY);
        assert_eq!(alarm.deadline(), Expiration::When(Instant::from_millis(100)));

        // below the granularity: the deadline stays put
        alarm.update(Some(Instant::from_micros(100_500)), Alarm::DEFAULT_GRANULARITY);
        assert_eq!(alarm.deadline(), Expiration::When(Instant::from_millis(100)));

        // beyond the granularity: re-armed
        alarm.update(Some(Instant::from_millis(200)), Alarm::DEFAULT_GRANULARITY);
        assert_eq!(alarm.deadline(), Expiration::When(Instant::from_millis(200)));

        // `None` disarms
        alarm.update(None, Alarm::DEFAULT_GRANULARITY);
        assert!(!alarm.is_set());
    }
}
