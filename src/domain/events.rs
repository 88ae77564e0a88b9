//! Runtime events reported to the parent process.
//!
//! Every line the worker writes to standard output is exactly one
//! [`RuntimeEvent`] serialized as JSON.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single protocol event.
///
/// A successful run emits one `started`, any number of `level` events, and
/// ends with `stopped`. Fatal pre-start failures emit only `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// Capture pipeline is running
    #[serde(rename_all = "camelCase")]
    Started {
        /// Resolved microphone source (`default` for the server default)
        actual_mic: String,

        /// Resolved monitor source (empty when monitor capture is disabled)
        actual_monitor: String,

        /// File being written
        out_path: String,
    },

    /// Latest level measurements, in dBFS
    #[serde(rename_all = "camelCase")]
    Level {
        /// Last known microphone RMS level
        mic_db: Option<f64>,

        /// Last known monitor RMS level
        monitor_db: Option<f64>,

        /// Milliseconds since the Unix epoch
        ts: i64,
    },

    /// Pipeline has shut down and the output file is closed
    #[serde(rename_all = "camelCase")]
    Stopped {
        out_path: String,
        ts: i64,
    },

    /// Fatal or engine-reported error
    Error {
        message: String,
        details: Value,
    },
}

impl RuntimeEvent {
    /// Create a `started` event
    pub fn started(
        actual_mic: impl Into<String>,
        actual_monitor: impl Into<String>,
        out_path: impl Into<String>,
    ) -> Self {
        Self::Started {
            actual_mic: actual_mic.into(),
            actual_monitor: actual_monitor.into(),
            out_path: out_path.into(),
        }
    }

    /// Create a `level` event stamped with the current time
    pub fn level(mic_db: Option<f64>, monitor_db: Option<f64>) -> Self {
        Self::Level {
            mic_db,
            monitor_db,
            ts: now_millis(),
        }
    }

    /// Create a `stopped` event stamped with the current time
    pub fn stopped(out_path: impl Into<String>) -> Self {
        Self::Stopped {
            out_path: out_path.into(),
            ts: now_millis(),
        }
    }

    /// Create an `error` event. Non-object details are wrapped under `info`.
    pub fn error(message: impl Into<String>, details: Value) -> Self {
        let details = match details {
            Value::Object(_) => details,
            Value::Null => Value::Object(Default::default()),
            other => serde_json::json!({ "info": other }),
        };
        Self::Error {
            message: message.into(),
            details,
        }
    }

    /// The `type` tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Level { .. } => "level",
            Self::Stopped { .. } => "stopped",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize as one protocol line (no trailing newline)
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_wire_format() {
        let event = RuntimeEvent::started("alsa_input.usb", "", "/tmp/out.ogg");
        let json: Value = serde_json::from_str(&event.to_line().unwrap()).unwrap();

        assert_eq!(json["type"], "started");
        assert_eq!(json["actualMic"], "alsa_input.usb");
        assert_eq!(json["actualMonitor"], "");
        assert_eq!(json["outPath"], "/tmp/out.ogg");
    }

    #[test]
    fn test_level_keeps_unknown_channel_as_null() {
        let event = RuntimeEvent::level(Some(-20.0), None);
        let json: Value = serde_json::from_str(&event.to_line().unwrap()).unwrap();

        assert_eq!(json["type"], "level");
        assert_eq!(json["micDb"], -20.0);
        assert!(json["monitorDb"].is_null());
        assert!(json.get("monitorDb").is_some());
        assert!(json["ts"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_error_details_always_object() {
        let event = RuntimeEvent::error("boom", Value::Null);
        match event {
            RuntimeEvent::Error { details, .. } => assert!(details.is_object()),
            _ => panic!("Wrong event type"),
        }

        let event = RuntimeEvent::error("boom", Value::String("debug".into()));
        match event {
            RuntimeEvent::Error { details, .. } => assert_eq!(details["info"], "debug"),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_stopped_parses_back() {
        let line = r#"{"type":"stopped","outPath":"/tmp/a.ogg","ts":1700000000000}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        assert_eq!(
            event,
            RuntimeEvent::Stopped {
                out_path: "/tmp/a.ogg".to_string(),
                ts: 1_700_000_000_000
            }
        );
        assert_eq!(event.kind(), "stopped");
    }
}
