//! Capacity-bounded history of valid readings, the acquisition-side
//! source of truth for trend/range displays.

use std::mem::MaybeUninit;
use std::time::{Duration, Instant};

use ringbuf::{ring_buffer::RbBase, LocalRb, Rb};

use super::sensor::Reading;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Two values closer than this (one display decimal) count as equal when
/// classifying a trend.
const TREND_EPSILON: f64 = 0.1;

/// A reading plus the monotonic instant it was recorded. Owned exclusively
/// by the store; consumers get clones.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub reading: Reading,
    pub recorded_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

/// Aggregate over a time window of history entries.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSummary {
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub min_humidity: f64,
    pub max_humidity: f64,
    pub temperature_trend: Trend,
    pub humidity_trend: Trend,
    pub samples: usize,
}

type HistoryRb = LocalRb<HistoryEntry, Vec<MaybeUninit<HistoryEntry>>>;

pub struct HistoryStore {
    ring: HistoryRb,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: LocalRb::new(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn record(&mut self, reading: Reading) {
        self.record_at(reading, Instant::now());
    }

    /// Entries are appended in acquisition-completion order; once the
    /// store is full the oldest entry is dropped.
    pub fn record_at(&mut self, reading: Reading, recorded_at: Instant) {
        self.ring.push_overwrite(HistoryEntry {
            reading,
            recorded_at,
        });
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self.ring.iter().cloned().collect();
        entries.reverse();
        entries.truncate(n);
        entries
    }

    pub fn range(&self, window: Duration) -> Option<RangeSummary> {
        self.range_at(window, Instant::now())
    }

    /// Aggregates entries recorded within `window` of `now`. Returns
    /// `None` when the window holds no samples.
    pub fn range_at(&self, window: Duration, now: Instant) -> Option<RangeSummary> {
        let cutoff = now.checked_sub(window);
        let in_window: Vec<&HistoryEntry> = self
            .ring
            .iter()
            .filter(|e| match cutoff {
                Some(cutoff) => e.recorded_at >= cutoff,
                // The window reaches past the process start; keep everything.
                None => true,
            })
            .collect();
        if in_window.is_empty() {
            return None;
        }

        let mut min_temperature = f64::INFINITY;
        let mut max_temperature = f64::NEG_INFINITY;
        let mut min_humidity = f64::INFINITY;
        let mut max_humidity = f64::NEG_INFINITY;
        for entry in &in_window {
            min_temperature = min_temperature.min(entry.reading.temperature);
            max_temperature = max_temperature.max(entry.reading.temperature);
            min_humidity = min_humidity.min(entry.reading.humidity);
            max_humidity = max_humidity.max(entry.reading.humidity);
        }

        let middle = in_window.len() / 2;
        let temperature_trend = classify_trend(
            in_window[0].reading.temperature,
            in_window[middle].reading.temperature,
            in_window[in_window.len() - 1].reading.temperature,
        );
        let humidity_trend = classify_trend(
            in_window[0].reading.humidity,
            in_window[middle].reading.humidity,
            in_window[in_window.len() - 1].reading.humidity,
        );

        Some(RangeSummary {
            min_temperature,
            max_temperature,
            min_humidity,
            max_humidity,
            temperature_trend,
            humidity_trend,
            samples: in_window.len(),
        })
    }
}

/// Three-point classification over the window's boundary, middle, and
/// newest samples. A single spike that reverses between the half-windows
/// reads as flat.
fn classify_trend(oldest: f64, middle: f64, newest: f64) -> Trend {
    let span = newest - oldest;
    let first_half = middle - oldest;
    let second_half = newest - middle;
    if span.abs() < TREND_EPSILON || first_half * second_half < 0.0 {
        Trend::Flat
    } else if span > 0.0 {
        Trend::Rising
    } else {
        Trend::Falling
    }
}
