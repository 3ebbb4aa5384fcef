//! Clock abstraction for deadline arithmetic.

use chrono::{DateTime, Utc};

/// Abstraction over system time so deadline and credential checks stay
/// deterministic under test.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time as whole seconds since the Unix epoch, the
    /// unit used by `application_start_time`.
    fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
