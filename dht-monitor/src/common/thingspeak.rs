//! Slot-deduplicated uploader for the ThingSpeak telemetry endpoint.
//!
//! The write API takes a GET against `/update` with the write key and
//! one value per channel field. Slot state advances only after the
//! endpoint accepts an update, so a failed send is retried implicitly on
//! the next tick that lands in the same slot.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::config::ThingSpeakConfig;
use super::sensor::Reading;
use super::slot::SlotState;

/// Channel-field mapping of the legacy dashboard: field1 is temperature,
/// field2 is humidity. Values go out with the one-decimal display
/// convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub api_key: String,
    pub field1: String,
    pub field2: String,
}

impl UpdateRequest {
    fn for_reading(api_key: &str, reading: &Reading) -> Self {
        Self {
            api_key: api_key.to_string(),
            field1: format!("{:.1}", reading.temperature),
            field2: format!("{:.1}", reading.humidity),
        }
    }

    pub fn query_params(&self) -> [(&'static str, &str); 3] {
        [
            ("api_key", self.api_key.as_str()),
            ("field1", self.field1.as_str()),
            ("field2", self.field2.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("network error reaching the telemetry endpoint: {0}")]
    Network(String),
    #[error("telemetry endpoint rejected the update: HTTP {status}")]
    Rejected { status: u16 },
    #[error("could not build the telemetry client: {0}")]
    Client(String),
}

/// Seam over the wire so upload policy is testable without a network.
pub trait TelemetryTransport {
    /// Sends one update; returns the entry id assigned by the endpoint.
    fn send_update(&self, request: &UpdateRequest) -> Result<String, UploadError>;
}

/// Blocking HTTP transport. Uploads run on the tick thread, which is the
/// only place the engine is allowed to block on the network.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl TelemetryTransport for HttpTransport {
    fn send_update(&self, request: &UpdateRequest) -> Result<String, UploadError> {
        let response = self
            .client
            .get(format!("{}/update", self.base_url))
            .query(&request.query_params())
            .send()
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }
        // The body of a successful update is the assigned entry id.
        let body = response
            .text()
            .map_err(|e| UploadError::Network(e.to_string()))?;
        Ok(body.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { entry_id: String },
    SkippedSameSlot,
    Disabled,
}

pub struct ThingSpeakClient<T: TelemetryTransport> {
    transport: T,
    api_key: String,
    channel_id: String,
    enabled: bool,
    slots: SlotState,
}

impl<T: TelemetryTransport> ThingSpeakClient<T> {
    pub fn new(transport: T, config: &ThingSpeakConfig) -> Self {
        Self {
            transport,
            api_key: config.api_key.clone(),
            channel_id: config.channel_id.clone(),
            enabled: config.enabled && config.api_key_configured(),
            slots: SlotState::new(config.upload_interval()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn last_uploaded_slot(&self) -> Option<i64> {
        self.slots.last_uploaded_slot()
    }

    /// Sends `reading` unless the current slot was already uploaded (and
    /// `force` is not set). On error the slot stays unmarked; the caller
    /// logs and swallows, never failing the acquisition tick.
    pub fn send(
        &mut self,
        reading: &Reading,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<SendOutcome, UploadError> {
        if !self.enabled {
            return Ok(SendOutcome::Disabled);
        }
        let slot = self.slots.current_slot(now);
        if !self.slots.should_upload(slot, force) {
            return Ok(SendOutcome::SkippedSameSlot);
        }
        let request = UpdateRequest::for_reading(&self.api_key, reading);
        log::info!(
            "uploading to channel {}: T={} H={}",
            self.channel_id,
            request.field1,
            request.field2
        );
        let entry_id = self.transport.send_update(&request)?;
        self.slots.mark_uploaded(slot);
        Ok(SendOutcome::Sent { entry_id })
    }
}
