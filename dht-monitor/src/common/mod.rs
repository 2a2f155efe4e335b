//! Engine internals.
//!
//! # Core
//! - [sensor] — retrying sensor reader with validity checks
//! - [history] — bounded history of valid readings
//! - [event_log] — bounded ring of categorized diagnostic entries
//! - [slot] — wall-clock-aligned upload slots
//! - [thingspeak] — deduplicated cloud uploader
//! - [monitor] — tick coordinator and read-only handle
//!
//! # Utils
//! - [api] — payload shapes consumed by the serving layer
//! - [config] — file-backed monitor configuration
//! - [walltime] — civil-timezone conversion and formatting

pub mod api;
pub mod config;
pub mod event_log;
pub mod history;
pub mod monitor;
pub mod sensor;
pub mod slot;
pub mod thingspeak;
pub mod walltime;
