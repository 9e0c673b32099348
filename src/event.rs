//! Telemetry events emitted by collectors.
//!
//! An [`Event`] is created once, at sample time, and shared read-only between every
//! subscriber of the [`crate::bus::EventBus`].
//!
//! Events serialize to the JSON shape consumed by logging and publishing sinks:
//!
//! ```rust
//! use plugin_controller::event::{Event, EventKind};
//!
//! let event = Event::at(EventKind::PerfCpu(12.5), 1_700_000_000_000_000_000);
//! assert_eq!(
//!     event.to_json().unwrap(),
//!     r#"{"timestamp":1700000000000000000,"kind":"sys.plugin.perf.cpu","value":12.5}"#
//! );
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// The kind of an event together with its typed payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum EventKind {
    /// CPU utilization of the plugin in percent (100 per fully used core).
    #[serde(rename = "sys.plugin.perf.cpu")]
    PerfCpu(f64),
    /// Working-set memory of the plugin in bytes.
    #[serde(rename = "sys.plugin.perf.mem")]
    PerfMemory(u64),
    /// GPU load in percent.
    #[serde(rename = "sys.plugin.perf.gpu")]
    PerfGpu(f64),
}

impl EventKind {
    /// The name under which this kind is logged and published.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PerfCpu(_) => "sys.plugin.perf.cpu",
            Self::PerfMemory(_) => "sys.plugin.perf.mem",
            Self::PerfGpu(_) => "sys.plugin.perf.gpu",
        }
    }

    /// The payload as a floating point number.
    pub fn value(&self) -> f64 {
        match *self {
            Self::PerfCpu(percent) | Self::PerfGpu(percent) => percent,
            Self::PerfMemory(bytes) => bytes as f64,
        }
    }
}

/// An immutable telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Sample time in nanoseconds since the UNIX epoch.
    timestamp: u64,
    #[serde(flatten)]
    kind: EventKind,
}

impl Event {
    /// Creates an event stamped with the current wall-clock time.
    pub fn now(kind: EventKind) -> Self {
        // Clocks set before 1970 are clamped to the epoch.
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self::at(kind, timestamp)
    }

    /// Creates an event with an explicit timestamp in nanoseconds since the UNIX epoch.
    pub fn at(kind: EventKind, timestamp: u64) -> Self {
        Self { timestamp, kind }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Serializes the event to its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails. Non-finite payloads are written as `null`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_event_json() {
        let event = Event::at(EventKind::PerfMemory(21_458_944), 7);
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "kind": "sys.plugin.perf.mem",
                "timestamp": 7,
                "value": 21458944,
            })
        );
    }

    #[test]
    fn test_gpu_event_name_and_value() {
        let event = Event::at(EventKind::PerfGpu(42.0), 1);
        assert_eq!(event.name(), "sys.plugin.perf.gpu");
        assert_eq!(event.kind().value(), 42.0);
    }

    #[test]
    fn test_now_is_after_epoch() {
        let event = Event::now(EventKind::PerfCpu(0.0));
        assert!(event.timestamp() > 0);
    }
}
