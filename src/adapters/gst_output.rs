//! Decoding of `gst-launch-1.0 -m -e` console output into bus messages.
//!
//! gst-launch prints its bus on stdout (`-m`) and errors on stderr. Each
//! stream gets its own [`OutputDecoder`]; an `ERROR:` line is held until the
//! optional `Additional debug info:` block following it has been read.

use serde_json::{Map, Number, Value};

use super::BusMessage;

/// One classified line of gst-launch output
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchLine {
    /// Parsing succeeded and the pipeline is being brought up
    Constructed,

    /// Parsing or linking the description failed
    ConstructionFailed(String),

    /// Element message with its decoded structure
    Element { source: String, payload: Value },

    /// First line of an element error
    ErrorStart { source: String, message: String },

    /// Header preceding the debug line of an error
    DebugInfoHeader,

    /// End of stream reached the pipeline
    Eos,

    Other,
}

/// Decoder output forwarded to the pipeline handle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    Constructed,
    ConstructionFailed(String),
    Bus(BusMessage),
}

const ELEMENT_MESSAGE_PREFIX: &str = "Got message #";
const EOS_PREFIX: &str = "Got EOS from element";
const ERROR_PREFIX: &str = "ERROR: from element ";
const ERRONEOUS_PREFIX: &str = "WARNING: erroneous pipeline: ";
const NOT_CONSTRUCTED_PREFIX: &str = "ERROR: pipeline could not be constructed: ";
const DEBUG_INFO_HEADER: &str = "Additional debug info:";

/// Classify a single output line
pub fn parse_line(line: &str) -> LaunchLine {
    let line = line.trim_end();

    if line.starts_with("Setting pipeline to PAUSED") {
        return LaunchLine::Constructed;
    }
    if let Some(rest) = line.strip_prefix(ERRONEOUS_PREFIX) {
        return LaunchLine::ConstructionFailed(rest.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix(NOT_CONSTRUCTED_PREFIX) {
        return LaunchLine::ConstructionFailed(rest.trim().to_string());
    }
    if line.starts_with(EOS_PREFIX) {
        return LaunchLine::Eos;
    }
    if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        return parse_error_line(rest);
    }
    if line.trim() == DEBUG_INFO_HEADER {
        return LaunchLine::DebugInfoHeader;
    }
    if let Some(rest) = line.strip_prefix(ELEMENT_MESSAGE_PREFIX) {
        return parse_message_line(rest);
    }

    LaunchLine::Other
}

/// `/GstPipeline:pipeline0/GstPulseSrc:pulsesrc0: Could not open device.`
fn parse_error_line(rest: &str) -> LaunchLine {
    let (path, message) = match rest.split_once(": ") {
        Some((path, message)) => (path, message),
        None => (rest, ""),
    };
    let source = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit(':').next())
        .unwrap_or(path)
        .trim_end_matches(':')
        .to_string();

    LaunchLine::ErrorStart {
        source,
        message: message.trim().to_string(),
    }
}

/// `47 from element "mic_level" (element): level, rms=(double)< -20 >;`
fn parse_message_line(rest: &str) -> LaunchLine {
    let Some((_, after)) = rest.split_once(" from element \"") else {
        return LaunchLine::Other;
    };
    let Some((source, after)) = after.split_once('"') else {
        return LaunchLine::Other;
    };
    let Some(after) = after.trim_start().strip_prefix("(element): ") else {
        return LaunchLine::Other;
    };

    match parse_structure(after) {
        Some(payload) => LaunchLine::Element {
            source: source.to_string(),
            payload,
        },
        None => LaunchLine::Other,
    }
}

/// Decode a serialized structure into `{"name": ..., "fields": {...}}`.
///
/// Returns `None` for `no message details` or an empty string.
pub fn parse_structure(text: &str) -> Option<Value> {
    let text = text.trim().trim_end_matches(';').trim();
    if text.is_empty() || text == "no message details" {
        return None;
    }

    let parts = split_top_level(text, ',');
    let mut parts = parts.into_iter();
    let name = parts.next()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut fields = Map::new();
    for part in parts {
        if let Some((key, raw)) = part.split_once('=') {
            fields.insert(key.trim().to_string(), parse_value(raw));
        }
    }

    let mut root = Map::new();
    root.insert("name".to_string(), Value::String(name));
    root.insert("fields".to_string(), Value::Object(fields));
    Some(Value::Object(root))
}

/// Decode one serialized value, dropping `(type)` annotations
fn parse_value(raw: &str) -> Value {
    let raw = strip_type_annotation(raw.trim());

    for (open, close) in [('<', '>'), ('{', '}'), ('[', ']')] {
        if raw.starts_with(open) && raw.ends_with(close) && raw.len() >= 2 {
            let inner = &raw[1..raw.len() - 1];
            let items = split_top_level(inner, ',')
                .into_iter()
                .filter(|item| !item.trim().is_empty())
                .map(parse_value)
                .collect();
            return Value::Array(items);
        }
    }

    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Value::String(unescape(&raw[1..raw.len() - 1]));
    }

    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Value::Number(u.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match raw {
        "true" | "TRUE" => Value::Bool(true),
        "false" | "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn strip_type_annotation(raw: &str) -> &str {
    if !raw.starts_with('(') {
        return raw;
    }
    match raw.find(')') {
        Some(end) => raw[end + 1..].trim_start(),
        None => raw,
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split on `sep` outside of brackets and quotes
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' | '{' | '[' | '(' if !in_quotes => depth += 1,
            '>' | '}' | ']' | ')' if !in_quotes => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 && !in_quotes => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[derive(Debug)]
struct PendingError {
    source: String,
    message: String,
    expecting_debug: bool,
}

impl PendingError {
    fn into_bus(self, debug: Option<String>) -> EngineOutput {
        EngineOutput::Bus(BusMessage::Error {
            source: self.source,
            message: self.message,
            debug,
        })
    }
}

/// Stateful per-stream decoder
#[derive(Debug, Default)]
pub struct OutputDecoder {
    pending_error: Option<PendingError>,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line, returning everything it completes
    pub fn feed(&mut self, line: &str) -> Vec<EngineOutput> {
        let mut out = Vec::new();

        if let Some(mut pending) = self.pending_error.take() {
            if pending.expecting_debug {
                out.push(pending.into_bus(Some(line.trim().to_string())));
                return out;
            }
            if parse_line(line) == LaunchLine::DebugInfoHeader {
                pending.expecting_debug = true;
                self.pending_error = Some(pending);
                return out;
            }
            out.push(pending.into_bus(None));
        }

        match parse_line(line) {
            LaunchLine::Constructed => out.push(EngineOutput::Constructed),
            LaunchLine::ConstructionFailed(reason) => {
                out.push(EngineOutput::ConstructionFailed(reason))
            }
            LaunchLine::Element { source, payload } => {
                out.push(EngineOutput::Bus(BusMessage::Element { source, payload }))
            }
            LaunchLine::ErrorStart { source, message } => {
                self.pending_error = Some(PendingError {
                    source,
                    message,
                    expecting_debug: false,
                });
            }
            LaunchLine::Eos => out.push(EngineOutput::Bus(BusMessage::Eos)),
            LaunchLine::DebugInfoHeader | LaunchLine::Other => {}
        }

        out
    }

    /// Flush a held error at end of stream
    pub fn finish(&mut self) -> Option<EngineOutput> {
        self.pending_error.take().map(|pending| pending.into_bus(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL_LINE: &str = "Got message #91 from element \"mic_level\" (element): level, endtime=(guint64)200000000, timestamp=(guint64)100000000, rms=(double)< -29.5, -30.25 >, peak=(double)< -20.5, -21 >;";

    #[test]
    fn test_level_message_decoding() {
        match parse_line(LEVEL_LINE) {
            LaunchLine::Element { source, payload } => {
                assert_eq!(source, "mic_level");
                assert_eq!(payload["name"], "level");
                assert_eq!(payload["fields"]["endtime"], 200000000);
                assert_eq!(payload["fields"]["rms"][0], -29.5);
                assert_eq!(payload["fields"]["rms"][1], -30.25);
            }
            other => panic!("Unexpected line: {:?}", other),
        }
    }

    #[test]
    fn test_value_array_with_typed_items() {
        let payload =
            parse_structure("level, rms=(GValueArray)< (double)-12.5, (double)-14 >;").unwrap();
        assert_eq!(payload["fields"]["rms"], serde_json::json!([-12.5, -14]));
    }

    #[test]
    fn test_quoted_string_with_comma() {
        let payload = parse_structure(r#"info, text=(string)"a, \"b\"", flag=(boolean)true"#).unwrap();
        assert_eq!(payload["fields"]["text"], "a, \"b\"");
        assert_eq!(payload["fields"]["flag"], true);
    }

    #[test]
    fn test_non_element_messages_ignored() {
        let line = "Got message #3 from element \"pipeline0\" (state-changed): GstMessageStateChanged, old-state=(GstState)GST_STATE_NULL;";
        assert_eq!(parse_line(line), LaunchLine::Other);
        assert_eq!(
            parse_line("Got message #9 from element \"pipeline0\" (eos): no message details"),
            LaunchLine::Other
        );
    }

    #[test]
    fn test_construction_lines() {
        assert_eq!(parse_line("Setting pipeline to PAUSED ..."), LaunchLine::Constructed);
        assert_eq!(
            parse_line("WARNING: erroneous pipeline: no element \"webrtcdsp\""),
            LaunchLine::ConstructionFailed("no element \"webrtcdsp\"".to_string())
        );
        assert!(matches!(
            parse_line("ERROR: pipeline could not be constructed: syntax error."),
            LaunchLine::ConstructionFailed(_)
        ));
    }

    #[test]
    fn test_error_with_debug_info() {
        let mut decoder = OutputDecoder::new();
        assert!(decoder
            .feed("ERROR: from element /GstPipeline:pipeline0/GstPulseSrc:pulsesrc0: Could not open audio device for recording.")
            .is_empty());
        assert!(decoder.feed("Additional debug info:").is_empty());
        let out = decoder.feed("../ext/pulse/pulsesrc.c(1000): gst_pulsesrc_open (): connection refused");

        assert_eq!(
            out,
            vec![EngineOutput::Bus(BusMessage::Error {
                source: "pulsesrc0".to_string(),
                message: "Could not open audio device for recording.".to_string(),
                debug: Some(
                    "../ext/pulse/pulsesrc.c(1000): gst_pulsesrc_open (): connection refused"
                        .to_string()
                ),
            })]
        );
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_error_without_debug_flushes_on_next_line() {
        let mut decoder = OutputDecoder::new();
        decoder.feed("ERROR: from element /GstPipeline:pipeline0/GstFileSink:sink: No space left.");
        let out = decoder.feed("Got EOS from element \"pipeline0\".");

        assert_eq!(out.len(), 2);
        assert!(matches!(
            &out[0],
            EngineOutput::Bus(BusMessage::Error { source, debug: None, .. }) if source == "sink"
        ));
        assert_eq!(out[1], EngineOutput::Bus(BusMessage::Eos));
    }

    #[test]
    fn test_error_flushed_at_end_of_stream() {
        let mut decoder = OutputDecoder::new();
        decoder.feed("ERROR: from element /GstPipeline:pipeline0/GstOpusEnc:opusenc0: Encoder failed.");
        assert!(matches!(
            decoder.finish(),
            Some(EngineOutput::Bus(BusMessage::Error { .. }))
        ));
    }
}
