// Time utility types and HTTP date handling.

use std::fmt;
use std::ops::{Add, Deref, Sub};
use std::time::{Duration, SystemTime};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Seconds(u64);

impl Seconds {
    pub const ZERO: Seconds = Seconds(0);

    pub fn new(seconds: u64) -> Self {
        Seconds(seconds)
    }
}

impl Add<Seconds> for Seconds {
    type Output = Seconds;

    fn add(self, rhs: Seconds) -> Self::Output {
        Seconds(self.0.saturating_add(rhs.0))
    }
}

impl Sub<Seconds> for Seconds {
    type Output = Seconds;

    fn sub(self, rhs: Seconds) -> Self::Output {
        Seconds(self.0.saturating_sub(rhs.0))
    }
}

impl Deref for Seconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for Seconds {
    fn from(seconds: u64) -> Self {
        Seconds(seconds)
    }
}

impl From<Seconds> for Duration {
    fn from(seconds: Seconds) -> Self {
        Duration::from_secs(seconds.0)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whole seconds elapsed between two wall clock instants. Clock skew can make
/// `from` later than `to`; that counts as zero.
pub fn elapsed_seconds(from: SystemTime, to: SystemTime) -> Seconds {
    match to.duration_since(from) {
        Ok(duration) => Seconds(duration.as_secs()),
        Err(_) => Seconds(0),
    }
}

pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

pub fn fmt_http_date(instant: SystemTime) -> String {
    httpdate::fmt_http_date(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_elapsed_seconds() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1000);
        let t1 = UNIX_EPOCH + Duration::from_secs(1065);
        assert_eq!(Seconds::new(65), elapsed_seconds(t0, t1));
    }

    #[test]
    fn test_elapsed_seconds_backwards_clock_is_zero() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1000);
        let t1 = UNIX_EPOCH + Duration::from_secs(900);
        assert_eq!(Seconds::new(0), elapsed_seconds(t0, t1));
    }

    #[test]
    fn test_seconds_saturating_arithmetic() {
        assert_eq!(Seconds::new(5), Seconds::new(65) - Seconds::new(60));
        assert_eq!(Seconds::new(0), Seconds::new(60) - Seconds::new(65));
        assert_eq!(Seconds::new(90), Seconds::new(60) + Seconds::new(30));
    }

    #[test]
    fn test_http_date_round_trip() {
        let date = "Sun, 06 Nov 1994 08:49:37 GMT";
        let parsed = parse_http_date(date).unwrap();
        assert_eq!(date, fmt_http_date(parsed));
    }

    #[test]
    fn test_http_date_garbage_is_none() {
        assert!(parse_http_date("not a date").is_none());
        assert!(parse_http_date("").is_none());
    }
}
