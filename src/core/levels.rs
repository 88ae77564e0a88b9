//! Level telemetry extraction from element messages.
//!
//! Element payloads vary in shape between engine versions, so the RMS array
//! is located by a bounded-depth structural search instead of a fixed path.

use serde_json::Value;

use super::graph::{MIC_LEVEL_NAME, MONITOR_LEVEL_NAME};

/// Field holding per-channel RMS values in dB
pub const RMS_FIELD: &str = "rms";

/// How deep into a payload the search descends
pub const MAX_SEARCH_DEPTH: usize = 4;

/// Which metering tap a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterChannel {
    Mic,
    Monitor,
}

impl MeterChannel {
    /// Map a metering element name to its channel
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            MIC_LEVEL_NAME => Some(Self::Mic),
            MONITOR_LEVEL_NAME => Some(Self::Monitor),
            _ => None,
        }
    }
}

/// Outcome of searching a payload for an RMS reading
#[derive(Debug, Clone, PartialEq)]
pub enum LevelLookup {
    Found(f64),
    NotFound,
}

/// Find the first array-valued `rms` field within `MAX_SEARCH_DEPTH` levels
/// and return its first finite number.
pub fn extract_rms_db(payload: &Value) -> LevelLookup {
    match find_rms_array(payload, 0) {
        Some(values) => values
            .iter()
            .filter_map(Value::as_f64)
            .find(|v| v.is_finite())
            .map(LevelLookup::Found)
            .unwrap_or(LevelLookup::NotFound),
        None => LevelLookup::NotFound,
    }
}

fn find_rms_array(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(values)) = map.get(RMS_FIELD) {
                return Some(values);
            }
            map.values()
                .find_map(|child| find_rms_array(child, depth + 1))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_rms_array(child, depth + 1)),
        _ => None,
    }
}

/// Last known level per channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelMemory {
    pub mic_db: Option<f64>,
    pub monitor_db: Option<f64>,
}

impl LevelMemory {
    pub fn update(&mut self, channel: MeterChannel, db: f64) {
        match channel {
            MeterChannel::Mic => self.mic_db = Some(db),
            MeterChannel::Monitor => self.monitor_db = Some(db),
        }
    }

    /// Decode an element message and record it if it is a known level tap.
    /// Returns true when the memory changed.
    pub fn observe(&mut self, source: &str, payload: &Value) -> bool {
        let Some(channel) = MeterChannel::from_element(source) else {
            return false;
        };
        match extract_rms_db(payload) {
            LevelLookup::Found(db) => {
                self.update(channel, db);
                true
            }
            LevelLookup::NotFound => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_payload() {
        let payload = json!({ "rms": [-20.0, -22.0] });
        assert_eq!(extract_rms_db(&payload), LevelLookup::Found(-20.0));
    }

    #[test]
    fn test_nested_payload() {
        let payload = json!({ "name": "level", "fields": { "peak": [-1.0], "rms": [-35.5] } });
        assert_eq!(extract_rms_db(&payload), LevelLookup::Found(-35.5));
    }

    #[test]
    fn test_non_array_rms_is_skipped() {
        let payload = json!({ "rms": -3.0, "inner": { "rms": [-9.0] } });
        assert_eq!(extract_rms_db(&payload), LevelLookup::Found(-9.0));
    }

    #[test]
    fn test_depth_bound() {
        let shallow = json!({ "a": { "b": { "c": { "d": { "rms": [-1.0] } } } } });
        assert_eq!(extract_rms_db(&shallow), LevelLookup::Found(-1.0));

        let deep = json!({ "a": { "b": { "c": { "d": { "e": { "rms": [-1.0] } } } } } });
        assert_eq!(extract_rms_db(&deep), LevelLookup::NotFound);
    }

    #[test]
    fn test_unexpected_shapes() {
        assert_eq!(extract_rms_db(&json!(null)), LevelLookup::NotFound);
        assert_eq!(extract_rms_db(&json!("rms")), LevelLookup::NotFound);
        assert_eq!(extract_rms_db(&json!({ "rms": [] })), LevelLookup::NotFound);
        assert_eq!(extract_rms_db(&json!({ "rms": ["x"] })), LevelLookup::NotFound);
    }

    #[test]
    fn test_memory_retains_other_channel() {
        let mut memory = LevelMemory::default();

        assert!(memory.observe("mic_level", &json!({ "rms": [-20.0] })));
        assert_eq!(memory, LevelMemory { mic_db: Some(-20.0), monitor_db: None });

        assert!(memory.observe("monitor_level", &json!({ "rms": [-35.0] })));
        assert_eq!(
            memory,
            LevelMemory { mic_db: Some(-20.0), monitor_db: Some(-35.0) }
        );
    }

    #[test]
    fn test_unknown_element_ignored() {
        let mut memory = LevelMemory::default();
        assert!(!memory.observe("level0", &json!({ "rms": [-20.0] })));
        assert_eq!(memory, LevelMemory::default());
    }
}
