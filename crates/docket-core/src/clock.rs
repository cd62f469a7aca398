//! Wall-clock helper.

use chrono::{DateTime, Timelike, Utc};

/// Current UTC time truncated to microseconds, the precision the record
/// codec persists. Item stamps must survive an encode/decode cycle intact.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}
