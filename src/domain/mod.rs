//! Domain types for the capture worker.
//!
//! This module contains the core data structures:
//! - Events: The line protocol reported to the parent process
//! - Run: Controller state machine
//! - Source: Audio sources from the OS audio server
//! - Processing: Voice-processing modes and chains

pub mod events;
pub mod processing;
pub mod run;
pub mod source;

// Re-export commonly used types
pub use events::{now_millis, RuntimeEvent};
pub use processing::{ProcessingChain, ProcessingMode};
pub use run::RunState;
pub use source::{
    AudioSource, SourceListing, SourceSelector, SourceState, DEFAULT_MONITOR_ALIAS, MONITOR_SUFFIX,
};
