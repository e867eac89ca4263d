//! Wall clock abstraction and millisecond timestamp helpers

use chrono::{DateTime, Duration, Utc};

/// Clock trait for testable time
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Milliseconds since the Unix epoch, the storage resolution for timestamps
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Truncate to storage resolution so values survive a database round trip
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(to_millis(time)).unwrap_or(time)
}

/// Next `updated` stamp: `now`, unless that would not move past `previous`
pub fn next_stamp(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_millis(now);
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
