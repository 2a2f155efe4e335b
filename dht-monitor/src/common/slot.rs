//! Discrete upload slots derived from civil wall-clock time.
//!
//! A slot is a fixed-width bucket of wall-clock time (one calendar minute
//! by default). The uploader sends at most one update per slot, which is
//! the sole deduplication mechanism between the acquisition cadence and
//! the telemetry endpoint's rate limit.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::walltime;

/// Index of the slot containing `now`, for buckets `interval` wide aligned
/// to the civil wall clock. Intervals shorter than a second are clamped up
/// to one second, matching the legacy firmware.
pub fn slot_index(now: DateTime<Utc>, interval: Duration) -> i64 {
    let interval_sec = (interval.as_secs() as i64).max(1);
    walltime::civil_epoch_seconds(now).div_euclid(interval_sec)
}

/// Upload bookkeeping for one telemetry channel. Mutated only by the
/// uploader, and only after a successful send, so a failed upload leaves
/// the slot open for an implicit retry on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    interval: Duration,
    last_uploaded_slot: Option<i64>,
}

impl SlotState {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_uploaded_slot: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn current_slot(&self, now: DateTime<Utc>) -> i64 {
        slot_index(now, self.interval)
    }

    pub fn last_uploaded_slot(&self) -> Option<i64> {
        self.last_uploaded_slot
    }

    /// True iff `slot` has not been uploaded yet, or the caller forces a
    /// resend regardless of slot equality.
    pub fn should_upload(&self, slot: i64, force: bool) -> bool {
        force || self.last_uploaded_slot != Some(slot)
    }

    /// Records a successful upload. The stored slot never decreases, so a
    /// stale caller cannot roll the deduplication window backwards.
    pub fn mark_uploaded(&mut self, slot: i64) {
        match self.last_uploaded_slot {
            Some(prev) if prev >= slot => {}
            _ => self.last_uploaded_slot = Some(slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test_log::test]
    fn test_slot_index_is_monotonic() {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 2, 59, 0).unwrap();
        let mut last = i64::MIN;
        for offset in (0..600).step_by(7) {
            let slot = slot_index(base + chrono::Duration::seconds(offset), MINUTE);
            assert!(slot >= last, "slot went backwards at +{offset}s");
            last = slot;
        }
    }

    #[test_log::test]
    fn test_same_civil_minute_same_slot() {
        let a = Utc.with_ymd_and_hms(2025, 6, 1, 2, 59, 1).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 6, 1, 2, 59, 58).unwrap();
        let c = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
        assert_eq!(slot_index(a, MINUTE), slot_index(b, MINUTE));
        assert_eq!(slot_index(c, MINUTE), slot_index(a, MINUTE) + 1);
    }

    #[test_log::test]
    fn test_slot_boundary_follows_civil_midnight() {
        // 15:00 UTC is midnight in Tokyo; a day-wide slot flips there, not
        // at UTC midnight.
        let before = Utc.with_ymd_and_hms(2025, 6, 1, 14, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap();
        let day = Duration::from_secs(86_400);
        assert_eq!(slot_index(after, day), slot_index(before, day) + 1);
    }

    #[test_log::test]
    fn test_subsecond_interval_clamps_to_one_second() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 30).unwrap();
        assert_eq!(
            slot_index(now, Duration::from_millis(10)),
            slot_index(now, Duration::from_secs(1))
        );
    }

    #[test_log::test]
    fn test_mark_uploaded_never_decreases() {
        let mut state = SlotState::new(MINUTE);
        assert_eq!(state.last_uploaded_slot(), None);
        state.mark_uploaded(100);
        state.mark_uploaded(99);
        assert_eq!(state.last_uploaded_slot(), Some(100));
        state.mark_uploaded(101);
        assert_eq!(state.last_uploaded_slot(), Some(101));
    }

    #[test_log::test]
    fn test_should_upload_dedups_unless_forced() {
        let mut state = SlotState::new(MINUTE);
        assert!(state.should_upload(7, false));
        state.mark_uploaded(7);
        assert!(!state.should_upload(7, false));
        assert!(state.should_upload(7, true));
        assert!(state.should_upload(8, false));
    }
}
