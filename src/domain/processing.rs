//! Voice-processing modes and the element chains they resolve to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Requested processing for one capture branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Leave the signal untouched
    None,

    /// Gain control and limiting
    Normalize,

    /// Normalize plus noise suppression and high-pass filtering
    Voice,
}

impl Default for ProcessingMode {
    fn default() -> Self {
        Self::None
    }
}

impl ProcessingMode {
    /// Parse leniently: unknown or empty values fall back to `None`
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Normalize => "normalize",
            Self::Voice => "voice",
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "normalize" => Ok(Self::Normalize),
            "voice" => Ok(Self::Voice),
            other => Err(format!("Unknown processing mode: {}", other)),
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered element descriptions inserted into a processing branch.
///
/// The content is opaque to the graph builder; it is joined with `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingChain {
    elements: Vec<String>,
}

impl ProcessingChain {
    /// A single element that forwards buffers unchanged
    pub fn passthrough() -> Self {
        Self {
            elements: vec!["identity".to_string()],
        }
    }

    pub fn from_elements<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let elements: Vec<String> = elements.into_iter().map(Into::into).collect();
        if elements.is_empty() {
            return Self::passthrough();
        }
        Self { elements }
    }

    pub fn is_passthrough(&self) -> bool {
        self.elements.len() == 1 && self.elements[0] == "identity"
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// Render as a graph fragment
    pub fn to_fragment(&self) -> String {
        self.elements.join(" ! ")
    }
}
