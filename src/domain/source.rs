//! Audio sources reported by the OS audio server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name suffix that marks a loop-back monitor source
pub const MONITOR_SUFFIX: &str = ".monitor";

/// Liveness state of a source as reported by the audio server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceState {
    Running,
    Idle,
    Suspended,
    /// Anything else the server reports, kept verbatim
    Other(String),
}

impl SourceState {
    /// Parse the state column of the audio server listing
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "IDLE" => Self::Idle,
            "SUSPENDED" => Self::Suspended,
            _ => Self::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Idle => write!(f, "IDLE"),
            Self::Suspended => write!(f, "SUSPENDED"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A named input source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSource {
    pub name: String,
    pub state: SourceState,
}

impl AudioSource {
    pub fn new(name: impl Into<String>, state: SourceState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    /// Loop-back sources capture what is being played out
    pub fn is_monitor(&self) -> bool {
        self.name.ends_with(MONITOR_SUFFIX)
    }
}

/// Sources split into microphones and monitors, in server order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceListing {
    pub mic_sources: Vec<AudioSource>,
    pub monitor_sources: Vec<AudioSource>,
}

impl SourceListing {
    /// Classify a flat list by the monitor naming convention
    pub fn classify(sources: Vec<AudioSource>) -> Self {
        let (monitor_sources, mic_sources) = sources.into_iter().partition(|s| s.is_monitor());
        Self {
            mic_sources,
            monitor_sources,
        }
    }

    pub fn mic_names(&self) -> Vec<String> {
        self.mic_sources.iter().map(|s| s.name.clone()).collect()
    }

    pub fn monitor_names(&self) -> Vec<String> {
        self.monitor_sources.iter().map(|s| s.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.mic_sources.is_empty() && self.monitor_sources.is_empty()
    }
}

/// Name the default-monitor alias resolves to on the audio server
pub const DEFAULT_MONITOR_ALIAS: &str = "@DEFAULT_MONITOR@";

/// How the caller asked for a source to be chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    /// Pick from the inventory
    Auto,

    /// The server's default
    Default,

    /// A literal source name
    Named(String),

    /// No capture on this branch (monitor only)
    Disabled,
}

impl SourceSelector {
    /// Parse a microphone selector. Empty means the default source.
    pub fn parse_mic(raw: &str) -> Self {
        match raw.trim() {
            "auto" => Self::Auto,
            "" | "default" => Self::Default,
            name => Self::Named(name.to_string()),
        }
    }

    /// Parse a monitor selector. Empty disables monitor capture.
    pub fn parse_monitor(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::Disabled,
            "auto" => Self::Auto,
            "default" => Self::Default,
            name => Self::Named(name.to_string()),
        }
    }
}
