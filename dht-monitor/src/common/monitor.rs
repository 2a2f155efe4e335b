//! Tick coordinator owning the engine's mutable state.
//!
//! One [`SensorMonitor`] exists per process. The tick thread is the only
//! writer: it acquires, updates the snapshot/history/event stores, and
//! drives the slot-gated uploader. Request handlers hold a
//! [`MonitorHandle`] and only read copies, so the sensor protocol is
//! never re-entered and a hung upload can at worst delay the next tick,
//! not a read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::api::{
    round1, ConfigPayload, DataPayload, HealthPayload, LogsPayload, RealtimePayload,
    SystemPayload, DEVICE_NAME, LEGACY_SENSOR_TYPE, SENSOR_MODEL,
};
use super::config::MonitorConfig;
use super::event_log::{EventLog, LogCategory, LogLevel, LogQuery};
use super::history::{HistoryEntry, HistoryStore, RangeSummary};
use super::sensor::{DhtDriver, Reading, SensorReader};
use super::thingspeak::{SendOutcome, TelemetryTransport, ThingSpeakClient};
use super::walltime;

/// Last known-good reading plus the monotonic instant it was taken.
#[derive(Debug, Clone)]
struct Snapshot {
    reading: Reading,
    taken_at: Instant,
}

/// What the read API hands out: the reading, whether the last tick
/// produced it fresh, and how old it is. The legacy firmware
/// substituted the cache silently; callers here can tell.
#[derive(Debug, Clone)]
pub struct CurrentReading {
    pub reading: Reading,
    pub is_fresh: bool,
    pub age: Duration,
    pub measurement_count: u64,
}

struct SharedState {
    snapshot: Option<Snapshot>,
    history: HistoryStore,
    events: EventLog,
    measurement_count: u64,
    last_tick_fresh: bool,
    boot_at: Instant,
}

pub struct SensorMonitor<D: DhtDriver, T: TelemetryTransport> {
    reader: SensorReader<D>,
    cloud: ThingSpeakClient<T>,
    config: MonitorConfig,
    state: Arc<Mutex<SharedState>>,
}

impl<D: DhtDriver, T: TelemetryTransport> SensorMonitor<D, T> {
    pub fn new(config: MonitorConfig, driver: D, transport: T) -> Self {
        let cloud = ThingSpeakClient::new(transport, &config.thingspeak);
        let mut events = EventLog::new(config.max_log_size);
        events.push(
            LogCategory::System,
            LogLevel::Info,
            "monitor started",
            Utc::now(),
        );
        if !cloud.enabled() {
            events.push(
                LogCategory::Cloud,
                LogLevel::Warning,
                "cloud uploads disabled or write key not configured",
                Utc::now(),
            );
        }
        let state = SharedState {
            snapshot: None,
            history: HistoryStore::new(config.max_history_size),
            events,
            measurement_count: 0,
            last_tick_fresh: false,
            boot_at: Instant::now(),
        };
        Self {
            reader: SensorReader::new(driver),
            cloud,
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Read-only facade for the serving layer. Cheap to clone.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    pub fn tick(&mut self) {
        self.tick_at(Utc::now());
    }

    /// One acquisition cycle. Acquisition and upload both happen outside
    /// the state lock; readers only wait for the short bookkeeping
    /// sections.
    pub fn tick_at(&mut self, now: DateTime<Utc>) {
        match self.reader.acquire(now) {
            Ok(reading) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.snapshot = Some(Snapshot {
                        reading: reading.clone(),
                        taken_at: Instant::now(),
                    });
                    state.last_tick_fresh = true;
                    state.measurement_count = self.reader.measurement_count();
                    state.history.record(reading.clone());
                    let message = format!(
                        "reading ok: {:.1}C {:.1}%",
                        reading.temperature, reading.humidity
                    );
                    state
                        .events
                        .push(LogCategory::Sensor, LogLevel::Info, message, now);
                }
                self.sync_cloud(&reading, now, false);
            }
            Err(err) => {
                let mut state = self.state.lock().unwrap();
                state.last_tick_fresh = false;
                state.events.push(
                    LogCategory::Sensor,
                    LogLevel::Error,
                    format!("acquisition failed: {err}"),
                    now,
                );
            }
        }
    }

    /// Slot-gated upload. Failures are logged under the cloud category
    /// and swallowed; the slot stays unmarked so the next tick inside
    /// the same slot retries.
    fn sync_cloud(&mut self, reading: &Reading, now: DateTime<Utc>, force: bool) {
        let outcome = self.cloud.send(reading, now, force);
        let mut state = self.state.lock().unwrap();
        match outcome {
            Ok(SendOutcome::Sent { entry_id }) => state.events.push(
                LogCategory::Cloud,
                LogLevel::Info,
                format!("update accepted (entry {entry_id})"),
                now,
            ),
            Ok(SendOutcome::SkippedSameSlot) => state.events.push(
                LogCategory::Cloud,
                LogLevel::Debug,
                "slot already uploaded, skipping",
                now,
            ),
            Ok(SendOutcome::Disabled) => {}
            Err(err) => state.events.push(
                LogCategory::Cloud,
                LogLevel::Error,
                format!("upload failed: {err}"),
                now,
            ),
        }
    }

    /// Appends an operational event; for components (like the serving
    /// layer's host) that sit outside the tick path.
    pub fn log_event(&self, category: LogCategory, level: LogLevel, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.events.push(category, level, message, Utc::now());
    }

    /// Periodic drive loop for a dedicated thread: one immediate tick,
    /// then one per poll interval until `shutdown` is raised.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        let period = self.poll_interval();
        log::info!(
            "acquisition loop starting (period {}s)",
            period.as_secs()
        );
        while !shutdown.load(Ordering::Relaxed) {
            self.tick();
            std::thread::sleep(period);
        }
        log::info!("acquisition loop stopped");
    }
}

/// Read-only view over the engine state, safe to share with concurrent
/// request handlers. Never acquires, never mutates.
#[derive(Clone)]
pub struct MonitorHandle {
    state: Arc<Mutex<SharedState>>,
    config: MonitorConfig,
}

impl MonitorHandle {
    /// Last known-good reading, or `None` before the first success since
    /// boot (the explicit "no data yet" state).
    pub fn current(&self) -> Option<CurrentReading> {
        let state = self.state.lock().unwrap();
        state.snapshot.as_ref().map(|snapshot| CurrentReading {
            reading: snapshot.reading.clone(),
            is_fresh: state.last_tick_fresh,
            age: snapshot.taken_at.elapsed(),
            measurement_count: state.measurement_count,
        })
    }

    pub fn has_ever_succeeded(&self) -> bool {
        self.state.lock().unwrap().snapshot.is_some()
    }

    pub fn recent_history(&self, n: usize) -> Vec<HistoryEntry> {
        self.state.lock().unwrap().history.recent(n)
    }

    pub fn range(&self, window: Duration) -> Option<RangeSummary> {
        self.state.lock().unwrap().history.range(window)
    }

    pub fn realtime_payload(&self) -> Option<RealtimePayload> {
        self.current().map(|current| RealtimePayload {
            sensor_type: LEGACY_SENSOR_TYPE.to_string(),
            temp_c: round1(current.reading.temperature),
            hum_pct: round1(current.reading.humidity),
            timestamp: walltime::format_civil(current.reading.timestamp),
            measurement_count: current.measurement_count,
        })
    }

    /// Legacy shape; on acquisition failure this is the cached snapshot
    /// verbatim, never an error.
    pub fn data_payload(&self) -> Option<DataPayload> {
        self.current().map(|current| DataPayload {
            temperature: round1(current.reading.temperature),
            humidity: round1(current.reading.humidity),
            timestamp: walltime::format_civil(current.reading.timestamp),
            measurement_count: current.measurement_count,
        })
    }

    pub fn logs_payload(&self, query: &LogQuery, now: DateTime<Utc>) -> LogsPayload {
        let state = self.state.lock().unwrap();
        let result = state.events.query(query);
        LogsPayload {
            total_logs: state.events.total(),
            filtered_count: result.matched,
            categories: state.events.categories(),
            levels: state.events.levels(),
            logs: result.entries,
            timestamp: walltime::format_civil(now),
        }
    }

    pub fn system_payload(&self, now: DateTime<Utc>) -> SystemPayload {
        let state = self.state.lock().unwrap();
        let history_len = state.history.len();
        SystemPayload {
            platform: DEVICE_NAME.to_string(),
            timestamp: walltime::format_civil(now),
            uptime_seconds: state.boot_at.elapsed().as_secs(),
            temperature_history_count: history_len,
            humidity_history_count: history_len,
        }
    }

    /// Sensor status is derived from tick outcomes rather than probed
    /// in-place: request handlers are not allowed to touch the sensor.
    pub fn health_payload(&self, now: DateTime<Utc>) -> HealthPayload {
        let state = self.state.lock().unwrap();
        let sensor_status = if state.last_tick_fresh {
            "OK"
        } else if state.snapshot.is_some() {
            "Warning"
        } else {
            "Error"
        };
        HealthPayload {
            status: "healthy".to_string(),
            timestamp: walltime::format_civil(now),
            uptime_seconds: state.boot_at.elapsed().as_secs(),
            sensor_status: sensor_status.to_string(),
            measurement_count: state.measurement_count,
        }
    }

    pub fn config_payload(&self, now: DateTime<Utc>) -> ConfigPayload {
        let thingspeak = &self.config.thingspeak;
        ConfigPayload {
            device: DEVICE_NAME.to_string(),
            sensor_type: SENSOR_MODEL.to_string(),
            sensor_pin: self.config.sensor_pin,
            internal_pullup: self.config.use_internal_pullup,
            max_history_size: self.config.max_history_size,
            thingspeak_enabled: thingspeak.enabled,
            thingspeak_channel_id: thingspeak
                .enabled
                .then(|| thingspeak.channel_id.clone()),
            thingspeak_api_key_configured: thingspeak.api_key_configured(),
            thingspeak_interval_sec: thingspeak
                .enabled
                .then(|| thingspeak.interval_ms / 1000),
            timestamp: walltime::format_civil(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::ThingSpeakConfig;
    use crate::common::sensor::{DriverError, RawSample, ScriptedDriver};
    use crate::common::thingspeak::UploadError;
    use crate::common::thingspeak::UpdateRequest;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    const GOOD: RawSample = RawSample {
        temperature: 22.5,
        humidity: 55.0,
    };

    /// Transport that counts sends; shared handle so tests can inspect it
    /// after the monitor takes ownership.
    #[derive(Clone, Default)]
    struct CountingTransport {
        sent: Arc<StdMutex<Vec<UpdateRequest>>>,
    }

    impl CountingTransport {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl TelemetryTransport for CountingTransport {
        fn send_update(&self, request: &UpdateRequest) -> Result<String, UploadError> {
            self.sent.lock().unwrap().push(request.clone());
            Ok("1".to_string())
        }
    }

    fn cloud_config() -> MonitorConfig {
        MonitorConfig {
            thingspeak: ThingSpeakConfig {
                enabled: true,
                api_key: "ABCDEF0123456789".to_string(),
                channel_id: "123456".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn monitor_with_script(
        config: MonitorConfig,
        script: Vec<Result<RawSample, DriverError>>,
    ) -> (SensorMonitor<ScriptedDriver, CountingTransport>, CountingTransport) {
        let transport = CountingTransport::default();
        let driver = ScriptedDriver::from_script(script, GOOD);
        (
            SensorMonitor::new(config, driver, transport.clone()),
            transport,
        )
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test_log::test]
    fn test_no_data_before_first_success() {
        let (monitor, _) = monitor_with_script(MonitorConfig::default(), vec![]);
        let handle = monitor.handle();
        assert!(!handle.has_ever_succeeded());
        assert!(handle.current().is_none());
        assert!(handle.data_payload().is_none());
        assert!(handle.realtime_payload().is_none());
        assert_eq!(handle.health_payload(at(3, 0, 0)).sensor_status, "Error");
    }

    #[test_log::test]
    fn test_successful_tick_updates_snapshot_and_history() {
        let (mut monitor, _) = monitor_with_script(MonitorConfig::default(), vec![]);
        let handle = monitor.handle();
        monitor.tick_at(at(3, 0, 0));

        let current = handle.current().unwrap();
        assert!(current.is_fresh);
        assert_eq!(current.reading.temperature, 22.5);
        assert_eq!(current.measurement_count, 1);
        assert_eq!(handle.recent_history(10).len(), 1);

        let data = handle.data_payload().unwrap();
        assert_eq!(data.temperature, 22.5);
        assert_eq!(data.humidity, 55.0);
        assert_eq!(data.measurement_count, 1);

        let realtime = handle.realtime_payload().unwrap();
        assert_eq!(realtime.sensor_type, "dht11");
        assert_eq!(handle.health_payload(at(3, 0, 1)).sensor_status, "OK");
    }

    #[test_log::test]
    fn test_exhaustion_serves_cached_snapshot_unchanged() {
        let failures = vec![
            Err(DriverError::Timeout),
            Err(DriverError::Timeout),
            Err(DriverError::Timeout),
        ];
        let (mut monitor, _) = monitor_with_script(MonitorConfig::default(), failures);
        let handle = monitor.handle();

        // The script front-loads three failures, so the first tick exhausts.
        monitor.tick_at(at(3, 0, 0));
        assert!(!handle.has_ever_succeeded());

        monitor.tick_at(at(3, 0, 30));
        let before = handle.data_payload().unwrap();
        assert!(handle.current().unwrap().is_fresh);

        // Push three more failures for the third tick.
        monitor.reader = SensorReader::new(ScriptedDriver::from_script(
            vec![
                Err(DriverError::Timeout),
                Err(DriverError::Timeout),
                Err(DriverError::Timeout),
            ],
            GOOD,
        ));
        monitor.tick_at(at(3, 1, 0));

        let current = handle.current().unwrap();
        assert!(!current.is_fresh);
        assert_eq!(handle.data_payload().unwrap(), before);
        assert_eq!(handle.health_payload(at(3, 1, 1)).sensor_status, "Warning");
    }

    #[test_log::test]
    fn test_upload_dedup_within_one_slot() {
        let (mut monitor, transport) = monitor_with_script(cloud_config(), vec![]);
        monitor.tick_at(at(3, 0, 5));
        monitor.tick_at(at(3, 0, 45));
        assert_eq!(transport.count(), 1);
        monitor.tick_at(at(3, 1, 5));
        assert_eq!(transport.count(), 2);
    }

    #[test_log::test]
    fn test_upload_disabled_by_default_config() {
        let (mut monitor, transport) = monitor_with_script(MonitorConfig::default(), vec![]);
        monitor.tick_at(at(3, 0, 5));
        assert_eq!(transport.count(), 0);
    }

    #[test_log::test]
    fn test_failed_tick_is_logged_under_sensor_category() {
        let failures = vec![
            Err(DriverError::Timeout),
            Err(DriverError::Timeout),
            Err(DriverError::Timeout),
        ];
        let (mut monitor, _) = monitor_with_script(MonitorConfig::default(), failures);
        let handle = monitor.handle();
        monitor.tick_at(at(3, 0, 0));

        let logs = handle.logs_payload(
            &LogQuery {
                categories: Some(vec![LogCategory::Sensor]),
                levels: Some(vec![LogLevel::Error]),
                ..Default::default()
            },
            at(3, 0, 1),
        );
        assert_eq!(logs.filtered_count, 1);
        assert!(logs.logs[0].message.contains("acquisition failed"));
    }

    #[test_log::test]
    fn test_system_payload_reports_history_size() {
        let (mut monitor, _) = monitor_with_script(MonitorConfig::default(), vec![]);
        let handle = monitor.handle();
        monitor.tick_at(at(3, 0, 0));
        monitor.tick_at(at(3, 0, 30));
        let system = handle.system_payload(at(3, 0, 31));
        assert_eq!(system.temperature_history_count, 2);
        assert_eq!(system.humidity_history_count, 2);
        assert_eq!(system.platform, "ESP32-S3");
    }

    #[test_log::test]
    fn test_config_payload_hides_key_but_reports_presence() {
        let (monitor, _) = monitor_with_script(cloud_config(), vec![]);
        let handle = monitor.handle();
        let payload = handle.config_payload(at(3, 0, 0));
        assert!(payload.thingspeak_enabled);
        assert!(payload.thingspeak_api_key_configured);
        assert_eq!(payload.thingspeak_channel_id.as_deref(), Some("123456"));
        assert_eq!(payload.thingspeak_interval_sec, Some(60));
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("ABCDEF0123456789"));
    }
}
