//! # Telemetry sinks
//!
//! Write-only outputs for module health and state. Values published here are
//! never read back by the control path.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use log::trace;
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single published value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TelemetryValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// Sink writing every value to the log at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

/// Sink keeping the latest value of every key.
///
/// Clones share the same store, so a handle can be kept by the host while the
/// module owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingTelemetry {
    values: Rc<RefCell<HashMap<String, TelemetryValue>>>
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Destination for telemetry values.
pub trait TelemetrySink {
    fn publish(&mut self, key: &str, value: TelemetryValue);
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TelemetrySink for LogTelemetry {
    fn publish(&mut self, key: &str, value: TelemetryValue) {
        trace!("TM {} = {:?}", key, value);
    }
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value published under `key`.
    pub fn get(&self, key: &str) -> Option<TelemetryValue> {
        self.values.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    /// Copy of every key and latest value.
    pub fn snapshot(&self) -> HashMap<String, TelemetryValue> {
        self.values.borrow().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn publish(&mut self, key: &str, value: TelemetryValue) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Number(v)
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        TelemetryValue::Flag(v)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        TelemetryValue::Text(v)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_recording_shares_store() {
        let handle = RecordingTelemetry::new();
        let mut sink: Box<dyn TelemetrySink> = Box::new(handle.clone());

        sink.publish("a", 1.5.into());
        sink.publish("b", true.into());
        sink.publish("a", 2.5.into());

        assert_eq!(handle.len(), 2);
        assert_eq!(handle.get("a"), Some(TelemetryValue::Number(2.5)));
        assert_eq!(handle.get("b"), Some(TelemetryValue::Flag(true)));
        assert_eq!(handle.get("c"), None);
    }
}
