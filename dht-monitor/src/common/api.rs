//! Payload shapes consumed by the (external) serving layer. Field names
//! and fixed strings match the legacy browser dashboard bit-for-bit.

use serde::{Deserialize, Serialize};

use super::event_log::{LogCategory, LogEntry, LogLevel};

/// The dashboard predates the DHT22 swap and keys its rendering off this
/// string; it is fixed regardless of the actual sensor model.
pub const LEGACY_SENSOR_TYPE: &str = "dht11";

pub const DEVICE_NAME: &str = "ESP32-S3";
pub const SENSOR_MODEL: &str = "DHT22";

/// One-decimal display convention shared by every payload and upload.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `GET /api/realtime`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimePayload {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub temp_c: f64,
    pub hum_pct: f64,
    pub timestamp: String,
    pub measurement_count: u64,
}

/// `GET /api/data` — legacy field names. Served verbatim from the
/// snapshot cache when a fresh acquisition fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: String,
    pub measurement_count: u64,
}

/// `GET /api/logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsPayload {
    pub logs: Vec<LogEntry>,
    pub total_logs: usize,
    pub filtered_count: usize,
    pub categories: Vec<LogCategory>,
    pub levels: Vec<LogLevel>,
    pub timestamp: String,
}

/// `GET /api/system`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPayload {
    pub platform: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub temperature_history_count: usize,
    pub humidity_history_count: usize,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthPayload {
    pub status: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub sensor_status: String,
    pub measurement_count: u64,
}

/// `GET /config` — presence of credentials, never their values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub device: String,
    pub sensor_type: String,
    pub sensor_pin: u8,
    pub internal_pullup: bool,
    pub max_history_size: usize,
    pub thingspeak_enabled: bool,
    pub thingspeak_channel_id: Option<String>,
    pub thingspeak_api_key_configured: bool,
    pub thingspeak_interval_sec: Option<u64>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_round1() {
        assert_eq!(round1(22.54), 22.5);
        assert_eq!(round1(22.55), 22.6);
        assert_eq!(round1(-0.04), -0.0);
        assert_eq!(round1(55.0), 55.0);
    }

    #[test_log::test]
    fn test_realtime_payload_uses_legacy_type_key() {
        let payload = RealtimePayload {
            sensor_type: LEGACY_SENSOR_TYPE.to_string(),
            temp_c: 22.5,
            hum_pct: 55.0,
            timestamp: "2025-06-01 12:00:00 JST".to_string(),
            measurement_count: 3,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "dht11");
        assert_eq!(json["temp_c"], 22.5);
    }

    #[test_log::test]
    fn test_legacy_data_payload_round_trips() {
        let payload = DataPayload {
            temperature: round1(22.5),
            humidity: round1(55.0),
            timestamp: "2025-06-01 12:00:00 JST".to_string(),
            measurement_count: 1,
        };
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: DataPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.temperature, 22.5);
        assert_eq!(parsed.humidity, 55.0);
    }
}
