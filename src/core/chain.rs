//! Processing-chain resolution.
//!
//! Maps a [`ProcessingMode`] to the elements inserted in a capture branch.
//! Both enhancement modes need the WebRTC audio-processing element; when it
//! is missing they fall back to a passthrough chain instead of failing.

use crate::domain::{ProcessingChain, ProcessingMode};

/// Element factory providing gain control and noise suppression
pub const REQUIRED_ELEMENT: &str = "webrtcdsp";

/// Canonical format the DSP element operates on
const DSP_CAPS: &str = "audio/x-raw,format=S16LE,rate=48000,channels=1";

/// Capability requirement of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Nothing,
    Dsp,
}

struct ChainEntry {
    mode: ProcessingMode,
    requires: Requirement,
    build: fn() -> ProcessingChain,
}

const CHAIN_TABLE: &[ChainEntry] = &[
    ChainEntry {
        mode: ProcessingMode::None,
        requires: Requirement::Nothing,
        build: ProcessingChain::passthrough,
    },
    ChainEntry {
        mode: ProcessingMode::Normalize,
        requires: Requirement::Dsp,
        build: normalize_chain,
    },
    ChainEntry {
        mode: ProcessingMode::Voice,
        requires: Requirement::Dsp,
        build: voice_chain,
    },
];

/// Resolve a mode into a chain. Pure; never fails.
pub fn resolve_chain(mode: ProcessingMode, has_required_capability: bool) -> ProcessingChain {
    let Some(entry) = CHAIN_TABLE.iter().find(|e| e.mode == mode) else {
        return ProcessingChain::passthrough();
    };

    match entry.requires {
        Requirement::Dsp if !has_required_capability => ProcessingChain::passthrough(),
        _ => (entry.build)(),
    }
}

/// Whether resolving `mode` needs the capability probe at all
pub fn needs_capability(mode: ProcessingMode) -> bool {
    CHAIN_TABLE
        .iter()
        .any(|e| e.mode == mode && e.requires == Requirement::Dsp)
}

fn normalize_chain() -> ProcessingChain {
    ProcessingChain::from_elements([
        "audioconvert".to_string(),
        "audioresample".to_string(),
        DSP_CAPS.to_string(),
        dsp_element(false),
        "audioconvert".to_string(),
    ])
}

fn voice_chain() -> ProcessingChain {
    ProcessingChain::from_elements([
        "audioconvert".to_string(),
        "audioresample".to_string(),
        DSP_CAPS.to_string(),
        dsp_element(true),
        "audioconvert".to_string(),
    ])
}

fn dsp_element(voice: bool) -> String {
    let mut element = format!(
        "{} echo-cancel=false gain-control=true limiter=true",
        REQUIRED_ELEMENT
    );
    if voice {
        element.push_str(" noise-suppression=true noise-suppression-level=high high-pass-filter=true");
    } else {
        element.push_str(" noise-suppression=false high-pass-filter=false");
    }
    element
}
