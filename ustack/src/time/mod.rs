/*! Time structures, alarms and clock sources.

The `time` module contains the structures used to represent time and the
deadline machinery built on them.

 - [Instant] is used to represent absolute time.
 - [Duration] is used to represent relative time.
 - [Expiration] is an `Option`-like wrapper ordering pending deadlines.
 - [Alarm] is a one-shot deadline owned by the component that scheduled it.
 - [VirtualClock] advances on demand and drives alarms deterministically;
   [sys] reads the monotonic system clock for a live wait/poll loop.

[Instant]: struct.Instant.html
[Duration]: struct.Duration.html
[Expiration]: enum.Expiration.html
[Alarm]: struct.Alarm.html
[VirtualClock]: struct.VirtualClock.html
[sys]: sys/index.html
*/
use core::{cmp, fmt, ops};
pub use core::time::Duration;

mod alarm;
mod clock;
#[cfg(feature = "std")]
pub mod sys;

pub use self::alarm::Alarm;
pub use self::clock::VirtualClock;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around an `i64` value that represents a
/// number of microseconds, monotonically increasing since an arbitrary moment
/// in time, such as system startup.
///
/// * A value of `0` is inherently arbitrary.
/// * A value less than `0` indicates a time before the starting point.
///
/// Instants taken from different clock sources share no epoch and must not be
/// compared to each other.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    /// Microseconds since the clock's arbitrary starting point.
    pub micros: i64,
}

impl Instant {
    /// Create a new `Instant` from a number of microseconds.
    pub fn from_micros<T: Into<i64>>(micros: T) -> Instant {
        Instant { micros: micros.into() }
    }

    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { micros: millis.into() * 1000 }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { micros: secs.into() * 1_000_000 }
    }

    /// The number of whole seconds that have passed since the beginning of
    /// time.
    pub fn secs(&self) -> i64 {
        self.micros / 1_000_000
    }

    /// The fractional number of milliseconds within the current second.
    pub fn millis(&self) -> i64 {
        self.micros % 1_000_000 / 1000
    }

    /// The total number of milliseconds that have passed since the beginning
    /// of time.
    pub fn total_millis(&self) -> i64 {
        self.micros / 1000
    }

    /// The total number of microseconds that have passed since the beginning
    /// of time.
    pub fn total_micros(&self) -> i64 {
        self.micros
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros + rhs.as_micros() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.micros += rhs.as_micros() as i64;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros - rhs.as_micros() as i64)
    }
}

impl ops::SubAssign<Duration> for Instant {
    fn sub_assign(&mut self, rhs: Duration) {
        self.micros -= rhs.as_micros() as i64;
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_micros((self.micros - rhs.micros).abs() as u64)
    }
}

/// An expiration time, inversion of `Option`.
///
/// Contrary to the `Option` ordering, a pending deadline compares smaller
/// than `Never` so that the minimum over a set of expirations is the next
/// deadline to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// A deadline is pending at the contained instant.
    When(Instant),
    /// Nothing is scheduled.
    Never,
}

use self::Expiration::{Never, When};

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

impl From<Option<Instant>> for Expiration {
    fn from(opt: Option<Instant>) -> Self {
        match opt {
            Some(instant) => When(instant),
            None => Never,
        }
    }
}

impl From<Expiration> for Option<Instant> {
    fn from(expiration: Expiration) -> Self {
        match expiration {
            When(instant) => Some(instant),
            Never => None,
        }
    }
}

impl cmp::PartialOrd<Self> for Expiration {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::Ord for Expiration {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (*self, *other) {
            (Never, Never) => cmp::Ordering::Equal,
            (Never, When(_)) => cmp::Ordering::Greater,
            (When(_), Never) => cmp::Ordering::Less,
            (When(ref a), When(ref b)) => a.cmp(b),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn instant_ops() {
        assert_eq!(Instant::from_millis(4) + Duration::from_millis(6), Instant::from_millis(10));
        assert_eq!(Instant::from_millis(7) - Duration::from_millis(5), Instant::from_millis(2));
        assert_eq!(Instant::from_secs(1) - Instant::from_millis(400), Duration::from_millis(600));
    }

    #[test]
    fn instant_getters() {
        let instant = Instant::from_micros(5_674_000);
        assert_eq!(instant.secs(), 5);
        assert_eq!(instant.millis(), 674);
        assert_eq!(instant.total_millis(), 5674);
        assert_eq!(instant.total_micros(), 5_674_000);
    }

    #[test]
    fn instant_display() {
        assert_eq!(format!("{}", Instant::from_millis(5674)), "5.674s");
        assert_eq!(format!("{}", Instant::from_millis(5004)), "5.004s");
    }

    #[test]
    fn expiration_order() {
        let sooner = When(Instant::from_millis(1));
        let later = When(Instant::from_millis(2));
        assert!(sooner < later);
        assert!(sooner < Never);
        assert!(later < Never);
        assert_eq!(cmp::min(Never, sooner), sooner);
        assert_eq!(cmp::min(Never, Never), Never);
    }
}
