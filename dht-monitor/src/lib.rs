//! Acquisition and cloud-sync engine for a DHT22 environmental monitor.
//!
//! The engine reads a temperature/humidity sensor with bounded retries,
//! keeps a capacity-bounded history of valid readings and a ring of
//! diagnostic log entries, and relays readings to a remote telemetry
//! endpoint at most once per wall-clock-aligned time slot. The HTTP or
//! WebSocket layer that renders this state to browsers is a separate
//! concern; it only consumes the payload shapes in [`common::api`]
//! through a read-only [`common::monitor::MonitorHandle`].

pub mod common;
