//! Pipeline graph construction.
//!
//! Assembles the textual pipeline description from resolved sources,
//! processing chains, gains and the output path. Pure text assembly.
//!
//! ```text
//! mic ─ convert ─ tee ─┬─ queue ─ level(mic_level) ─ fakesink
//!                      └─ queue ─ chain ─ volume ─┐
//! mon ─ convert ─ tee ─┬─ queue ─ level(monitor_level) ─ fakesink
//!                      └─ queue ─ chain ─ volume ─┴─ audiomixer ─ stereo 48k ─ encode ─ filesink
//! ```
//! Without a monitor the mic branch feeds the encoder directly.

use std::path::Path;

use crate::domain::ProcessingChain;

/// Metering element name for the microphone branch
pub const MIC_LEVEL_NAME: &str = "mic_level";

/// Metering element name for the monitor branch
pub const MONITOR_LEVEL_NAME: &str = "monitor_level";

/// Name of the mixing stage in the dual-source graph
pub const MIXER_NAME: &str = "mix";

pub const MIN_GAIN: f64 = 0.01;
pub const MAX_GAIN: f64 = 2.0;
pub const DEFAULT_GAIN: f64 = 1.0;

/// Smallest accepted metering interval
pub const MIN_METER_INTERVAL_MS: u64 = 10;

const OUTPUT_CAPS: &str = "audio/x-raw,rate=48000,channels=2";

/// Coerce a gain multiplier into `[0.01, 2.0]`.
///
/// Non-finite or too-small values become 1.0; too-large values become 2.0.
pub fn clamp_gain(gain: f64) -> f64 {
    if !gain.is_finite() || gain < MIN_GAIN {
        DEFAULT_GAIN
    } else if gain > MAX_GAIN {
        MAX_GAIN
    } else {
        gain
    }
}

/// Metering interval in nanoseconds, floored at 10ms
pub fn meter_interval_ns(interval_ms: u64) -> u64 {
    interval_ms.max(MIN_METER_INTERVAL_MS).saturating_mul(1_000_000)
}

/// Escape a value for use inside a double-quoted property string
pub fn escape_graph_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Container/codec written to the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    OggOpus,
    Wav,
    Flac,
}

impl OutputFormat {
    /// Pick the encoder from the file extension; unknown extensions get Ogg/Opus
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") => Self::Wav,
            Some("flac") => Self::Flac,
            _ => Self::OggOpus,
        }
    }

    fn encoder(self) -> &'static str {
        match self {
            Self::OggOpus => "opusenc bitrate=64000 ! oggmux",
            Self::Wav => "wavenc",
            Self::Flac => "flacenc ! flacparse",
        }
    }
}

/// Where a capture branch reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// The server's default source (no device property)
    Default,

    /// A named source
    Device(String),
}

impl SourceRef {
    fn element(&self) -> String {
        match self {
            Self::Default => "pulsesrc".to_string(),
            Self::Device(name) => format!("pulsesrc device=\"{}\"", escape_graph_string(name)),
        }
    }
}

/// One capture branch
#[derive(Debug, Clone, PartialEq)]
pub struct BranchSpec {
    pub source: SourceRef,
    pub chain: ProcessingChain,
    pub gain: f64,
}

impl BranchSpec {
    /// Create a branch; the gain is clamped on construction
    pub fn new(source: SourceRef, chain: ProcessingChain, gain: f64) -> Self {
        Self {
            source,
            chain,
            gain: clamp_gain(gain),
        }
    }
}

/// Complete description of one run's pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    pub mic: BranchSpec,
    pub monitor: Option<BranchSpec>,
    pub meter_interval_ns: u64,
    pub out_path: String,
}

impl PipelineSpec {
    pub fn new(
        mic: BranchSpec,
        monitor: Option<BranchSpec>,
        meter_interval_ms: u64,
        out_path: impl Into<String>,
    ) -> Self {
        Self {
            mic,
            monitor,
            meter_interval_ns: meter_interval_ns(meter_interval_ms),
            out_path: out_path.into(),
        }
    }

    pub fn is_dual(&self) -> bool {
        self.monitor.is_some()
    }

    /// Render the textual pipeline description
    pub fn build(&self) -> String {
        let sink = self.sink_fragment();

        match &self.monitor {
            Some(monitor) => {
                let mic = self.branch_fragment("mic", MIC_LEVEL_NAME, &self.mic);
                let mon = self.branch_fragment("monitor", MONITOR_LEVEL_NAME, monitor);
                format!(
                    "audiomixer name={mixer} ! {sink} {mic} ! {mixer}. {mon} ! {mixer}.",
                    mixer = MIXER_NAME,
                    sink = sink,
                    mic = mic,
                    mon = mon,
                )
            }
            None => {
                let mic = self.branch_fragment("mic", MIC_LEVEL_NAME, &self.mic);
                format!("{} ! {}", mic, sink)
            }
        }
    }

    /// Source, metering tap and processing for one branch, ending after the
    /// gain stage so the caller can link it onward
    fn branch_fragment(&self, prefix: &str, level_name: &str, branch: &BranchSpec) -> String {
        let tee = format!("{}_tee", prefix);
        format!(
            "{source} ! audioconvert ! audioresample ! tee name={tee} \
             {tee}. ! queue ! level name={level} interval={interval} post-messages=true ! fakesink sync=false async=false \
             {tee}. ! queue ! {chain} ! volume volume={gain} ! audioconvert ! audioresample",
            source = branch.source.element(),
            tee = tee,
            level = level_name,
            interval = self.meter_interval_ns,
            chain = branch.chain.to_fragment(),
            gain = format_gain(branch.gain),
        )
    }

    fn sink_fragment(&self) -> String {
        format!(
            "audioconvert ! audioresample ! {caps} ! {encoder} ! filesink location=\"{path}\"",
            caps = OUTPUT_CAPS,
            encoder = OutputFormat::from_path(&self.out_path).encoder(),
            path = escape_graph_string(&self.out_path),
        )
    }
}

fn format_gain(gain: f64) -> String {
    let text = format!("{:.3}", gain);
    let text = text.trim_end_matches('0');
    match text.strip_suffix('.') {
        Some(whole) => format!("{}.0", whole),
        None => text.to_string(),
    }
}
