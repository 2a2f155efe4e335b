//! Retrying reader for a DHT22-class temperature/humidity sensor.
//!
//! The one-wire protocol is slow and glitchy: a read can time out, fail
//! its checksum, or return a wedged response in which the humidity word
//! decodes to exactly 1.0 %. A failed read can also leave the driver's
//! protocol state inconsistent, so from the second attempt onward the
//! driver is re-initialized before retrying.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Physical range of the DHT22 (datasheet): -40..80 °C, 0..100 %RH.
pub const VALID_TEMP_RANGE: (f64, f64) = (-40.0, 80.0);
pub const VALID_HUM_RANGE: (f64, f64) = (0.0, 100.0);

/// A wedged driver decodes the humidity word to exactly 1.0 %; readings
/// carrying it are discarded even though the transfer itself succeeded.
pub const HUMIDITY_SENTINEL: f64 = 1.0;

/// Minimum settle time before pulling the data line low for a read.
pub const STABILIZATION_DELAY: Duration = Duration::from_millis(60);

/// Total read attempts per acquisition, the first one included.
pub const MAX_ATTEMPTS: u8 = 3;

/// Raw transfer result, unvalidated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub temperature: f64,
    pub humidity: f64,
}

/// A validated reading. Constructed only through [`Reading::from_raw`],
/// so a `Reading` in a store always satisfies the range invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn from_raw(raw: RawSample, timestamp: DateTime<Utc>) -> Result<Self, AcquisitionError> {
        if !raw_sample_is_valid(&raw) {
            return Err(AcquisitionError::Invalid {
                temperature: raw.temperature,
                humidity: raw.humidity,
            });
        }
        Ok(Self {
            temperature: raw.temperature,
            humidity: raw.humidity,
            timestamp,
        })
    }
}

fn raw_sample_is_valid(raw: &RawSample) -> bool {
    (VALID_TEMP_RANGE.0..=VALID_TEMP_RANGE.1).contains(&raw.temperature)
        && (VALID_HUM_RANGE.0..=VALID_HUM_RANGE.1).contains(&raw.humidity)
        && raw.humidity != HUMIDITY_SENTINEL
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("timeout waiting for the sensor response")]
    Timeout,
    #[error("checksum mismatch in the sensor response")]
    Checksum,
    #[error("driver error: {0}")]
    Bus(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquisitionError {
    #[error(transparent)]
    Transient(#[from] DriverError),
    #[error("reading out of range: t={temperature} h={humidity}")]
    Invalid { temperature: f64, humidity: f64 },
    #[error("all {attempts} read attempts failed")]
    Exhausted { attempts: u8 },
}

/// Seam over the physical transport. The firmware build implements this
/// on the one-wire pin; native builds and tests use [`ScriptedDriver`].
pub trait DhtDriver {
    fn read_raw(&mut self) -> Result<RawSample, DriverError>;

    /// Tears the protocol state down and brings the line back to idle.
    fn reinit(&mut self) -> Result<(), DriverError>;
}

/// Retry progression for one acquisition. A transient transport failure
/// and an out-of-range value consume an attempt the same way; only the
/// second and later attempts re-initialize the driver first, since a
/// single glitch often clears on a free retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    Idle,
    Attempt(u8),
    ReinitAndRetry(u8),
    Exhausted,
}

impl RetryState {
    fn begin(self) -> Self {
        match self {
            RetryState::Idle => RetryState::Attempt(1),
            other => other,
        }
    }

    fn after_failure(self, max_attempts: u8) -> Self {
        match self {
            RetryState::Attempt(n) | RetryState::ReinitAndRetry(n) if n < max_attempts => {
                RetryState::ReinitAndRetry(n + 1)
            }
            _ => RetryState::Exhausted,
        }
    }
}

/// Owns the driver and the retry policy. Does not touch the history or
/// snapshot stores; recording a successful reading is the caller's job.
pub struct SensorReader<D: DhtDriver> {
    driver: D,
    stabilization_delay: Duration,
    max_attempts: u8,
    measurement_count: u64,
}

impl<D: DhtDriver> SensorReader<D> {
    pub fn new(driver: D) -> Self {
        Self::with_policy(driver, STABILIZATION_DELAY, MAX_ATTEMPTS)
    }

    pub fn with_policy(driver: D, stabilization_delay: Duration, max_attempts: u8) -> Self {
        Self {
            driver,
            stabilization_delay,
            max_attempts: max_attempts.max(1),
            measurement_count: 0,
        }
    }

    /// Successful acquisitions since startup.
    pub fn measurement_count(&self) -> u64 {
        self.measurement_count
    }

    /// Acquires one validated reading, retrying up to the attempt bound.
    /// Exhaustion is reported, never fatal; the caller falls back to its
    /// last known-good snapshot.
    pub fn acquire(&mut self, now: DateTime<Utc>) -> Result<Reading, AcquisitionError> {
        let mut state = RetryState::Idle.begin();
        loop {
            let attempt = match state {
                RetryState::Attempt(n) => n,
                RetryState::ReinitAndRetry(n) => {
                    if let Err(err) = self.driver.reinit() {
                        log::warn!("sensor re-init before attempt {n} failed: {err}");
                    }
                    n
                }
                RetryState::Exhausted => {
                    log::error!(
                        "sensor read failed after {} attempts",
                        self.max_attempts
                    );
                    return Err(AcquisitionError::Exhausted {
                        attempts: self.max_attempts,
                    });
                }
                RetryState::Idle => unreachable!("acquisition begins at Attempt(1)"),
            };

            if !self.stabilization_delay.is_zero() {
                std::thread::sleep(self.stabilization_delay);
            }

            match self.driver.read_raw() {
                Ok(raw) => match Reading::from_raw(raw, now) {
                    Ok(reading) => {
                        self.measurement_count += 1;
                        return Ok(reading);
                    }
                    Err(err) => {
                        log::warn!("invalid sensor data on attempt {attempt}: {err}");
                        state = state.after_failure(self.max_attempts);
                    }
                },
                Err(err) => {
                    log::warn!("sensor read failed on attempt {attempt}: {err}");
                    state = state.after_failure(self.max_attempts);
                }
            }
        }
    }
}

/// Deterministic stand-in for the hardware driver. Plays back a script of
/// results and falls back to a steady sample once the script runs out.
pub struct ScriptedDriver {
    script: VecDeque<Result<RawSample, DriverError>>,
    fallback: RawSample,
    reinit_count: usize,
}

impl ScriptedDriver {
    pub fn steady(sample: RawSample) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: sample,
            reinit_count: 0,
        }
    }

    pub fn from_script(script: Vec<Result<RawSample, DriverError>>, fallback: RawSample) -> Self {
        Self {
            script: script.into(),
            fallback,
            reinit_count: 0,
        }
    }

    pub fn reinit_count(&self) -> usize {
        self.reinit_count
    }
}

impl DhtDriver for ScriptedDriver {
    fn read_raw(&mut self) -> Result<RawSample, DriverError> {
        self.script.pop_front().unwrap_or(Ok(self.fallback))
    }

    fn reinit(&mut self) -> Result<(), DriverError> {
        self.reinit_count += 1;
        Ok(())
    }
}
