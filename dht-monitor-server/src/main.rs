//! Native monitor host: runs the acquisition loop on a dedicated thread
//! and periodically reports the engine's payloads on the console. The
//! hardware driver only exists in the firmware build, so this host feeds
//! the engine from a scripted stand-in driver.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dht_monitor::common::config::MonitorConfig;
use dht_monitor::common::monitor::SensorMonitor;
use dht_monitor::common::sensor::{RawSample, ScriptedDriver};
use dht_monitor::common::thingspeak::HttpTransport;

const REPORT_PERIOD: Duration = Duration::from_secs(30);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading config from {path}");
            MonitorConfig::load(&path)?
        }
        None => MonitorConfig::default(),
    };

    let transport = HttpTransport::new(config.thingspeak.api_url.clone())?;
    let driver = ScriptedDriver::steady(RawSample {
        temperature: 22.5,
        humidity: 55.0,
    });
    let monitor = SensorMonitor::new(config, driver, transport);
    let handle = monitor.handle();

    let shutdown = Arc::new(AtomicBool::new(false));
    let _acquisition = std::thread::Builder::new()
        .name("acquisition".to_string())
        .spawn({
            let shutdown = Arc::clone(&shutdown);
            move || monitor.run(shutdown)
        })?;

    loop {
        std::thread::sleep(REPORT_PERIOD);
        match handle.realtime_payload() {
            Some(payload) => log::info!("realtime: {}", serde_json::to_string(&payload)?),
            None => log::warn!("no successful reading yet"),
        }
        log::info!(
            "health: {}",
            serde_json::to_string(&handle.health_payload(Utc::now()))?
        );
    }
}
