//! capture-worker - supervised audio capture over a media pipeline engine
//!
//! The worker discovers audio sources, builds a mixing/processing/encoding
//! pipeline description, runs it on the media engine and streams level
//! telemetry to its parent process as newline-delimited JSON.
//!
//! # Architecture
//!
//! - Discovery and graph construction are pure functions over adapter output
//! - One controller task owns the running pipeline and all run state
//! - Stops are two-phase: end-of-stream first, forced teardown after a deadline
//!
//! # Modules
//!
//! - `adapters`: External system integrations (pactl, gst-launch)
//! - `core`: Inventory, chain resolver, graph builder, runtime controller
//! - `domain`: Data structures (RuntimeEvent, RunState, AudioSource)
//! - `protocol`: stdout event sink and stdin control reader
//! - `cli`: Command-line interfaces for the worker and the probe
//!
//! # Usage
//!
//! ```bash
//! # Record the busiest mic and the default monitor to a file
//! capture-worker auto default /tmp/out.ogg voice none 100 1 0.8
//!
//! # Then, on stdin
//! stop
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod protocol;

// Re-export main types at crate root for convenience
pub use crate::config::WorkerConfig;
pub use crate::core::{Worker, WorkerArgs, WorkerError};
pub use crate::domain::{RunState, RuntimeEvent};
