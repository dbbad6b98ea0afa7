//! The monotonic system clock.
//!
//! A live loop reads [`now`] after every wake-up, compares it against the
//! next pending [`Expiration`](../enum.Expiration.html) and polls its
//! sessions; the kernel supplies the wait primitive (epoll, select) and this
//! module supplies the time base. Instants from this clock count from boot
//! and are unrelated to the virtual clock's epoch.
//!
//! [`now`]: fn.now.html
#![allow(unsafe_code)]
use core::fmt;
use core::mem;

use libc;

use super::Instant;

/// An errno value.
///
/// The error representation of raw libc calls.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

#[cfg(feature = "std")]
impl From<Errno> for std::io::Error {
    fn from(Errno(err): Errno) -> std::io::Error {
        std::io::Error::from_raw_os_error(err)
    }
}

#[derive(Clone, Copy)]
struct ClockResult(libc::c_int);

impl ClockResult {
    fn errno(self) -> Result<(), Errno> {
        if self.0 == -1 {
            Err(Errno(unsafe { *libc::__errno_location() }))
        } else {
            Ok(())
        }
    }
}

/// Read `CLOCK_MONOTONIC`.
pub fn now() -> Result<Instant, Errno> {
    let ts = unsafe {
        let mut ts = mem::MaybeUninit::<libc::timespec>::uninit();
        let res = libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr());

        ClockResult(res).errno()?;

        ts.assume_init()
    };

    Ok(Instant::from_micros(ts.tv_sec * 1_000_000 + ts.tv_nsec / 1000))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn monotonic() {
        let earlier = now().unwrap();
        let later = now().unwrap();
        assert!(earlier <= later);
    }
}
