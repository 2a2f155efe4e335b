//! Civil-timezone conversion, isolated here so that slot arithmetic and
//! timestamp formatting can be tested (or re-zoned) without touching any
//! upload or acquisition logic.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Timezone used for slot alignment and human-facing timestamps. Uploads
/// align to boundaries in this zone, not UTC, so that "one upload per
/// minute" means one per local calendar minute.
pub const CIVIL_TZ: Tz = chrono_tz::Asia::Tokyo;

/// Seconds of the civil wall clock at `now`, i.e. the UTC epoch shifted by
/// the zone offset in effect at that instant.
pub fn civil_epoch_seconds(now: DateTime<Utc>) -> i64 {
    now.with_timezone(&CIVIL_TZ).naive_local().and_utc().timestamp()
}

/// Formats an instant as `YYYY-MM-DD HH:MM:SS JST`, the legacy timestamp
/// shape every payload and log entry carries.
pub fn format_civil(at: DateTime<Utc>) -> String {
    at.with_timezone(&CIVIL_TZ)
        .format("%Y-%m-%d %H:%M:%S JST")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test_log::test]
    fn test_civil_epoch_is_offset_from_utc() {
        // Japan has no DST; the offset is a constant +9h.
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(civil_epoch_seconds(now), now.timestamp() + 9 * 3600);
    }

    #[test_log::test]
    fn test_format_civil_crosses_the_date_line() {
        let now = Utc.with_ymd_and_hms(2025, 5, 31, 23, 30, 0).unwrap();
        assert_eq!(format_civil(now), "2025-06-01 08:30:00 JST");
    }
}
