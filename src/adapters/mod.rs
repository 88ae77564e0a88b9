//! Adapter interfaces for external systems.
//!
//! The worker talks to two external collaborators: the OS audio server
//! (source enumeration) and the media pipeline engine (graph execution).
//! Both sit behind traits so the controller can be driven by scripted fakes.

pub mod gst_launch;
pub mod gst_output;
pub mod pactl;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::AudioSource;

// Re-export the production adapters
pub use gst_launch::GstLaunchEngine;
pub use pactl::PactlAudioServer;

/// Errors raised by a pipeline engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine binary not available: {binary}: {reason}")]
    Unavailable { binary: String, reason: String },

    #[error("Pipeline could not be constructed: {0}")]
    Construction(String),

    #[error("Pipeline did not start within {0:?}")]
    LaunchTimeout(Duration),

    #[error("Invalid pipeline description: {0}")]
    InvalidGraph(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A message taken off the pipeline bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Custom element message (e.g. level measurements)
    Element { source: String, payload: Value },

    /// Error posted by an element
    Error {
        source: String,
        message: String,
        debug: Option<String>,
    },

    /// End of stream reached the sink
    Eos,

    /// Engine went away without posting EOS
    Closed,
}

/// Query interface to the OS audio server
#[async_trait]
pub trait AudioServer: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Enumerate input sources. Best-effort: failures yield an empty list.
    async fn list_sources(&self) -> Vec<AudioSource>;
}

/// A media engine capable of running textual pipeline descriptions
#[async_trait]
pub trait PipelineEngine: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Check that the engine can be used at all
    async fn check_available(&self) -> Result<(), EngineError>;

    /// Whether an element factory is installed. Best-effort: false on failure.
    async fn has_element(&self, factory: &str) -> bool;

    /// Instantiate a pipeline from its description
    async fn launch(&self, graph: &str) -> Result<Box<dyn PipelineHandle>, EngineError>;
}

/// A live pipeline instance.
///
/// Only ever driven from the controller's single task; implementations need
/// `Send` but no internal synchronisation.
#[async_trait]
pub trait PipelineHandle: Send {
    /// Begin playback
    async fn play(&mut self) -> Result<(), EngineError>;

    /// Wait at most `timeout` for the next bus message
    async fn poll_bus(&mut self, timeout: Duration) -> Option<BusMessage>;

    /// Inject end-of-stream so the sink can finalise the file
    async fn send_eos(&mut self) -> Result<(), EngineError>;

    /// Tear the pipeline down immediately
    async fn force_stop(&mut self) -> Result<(), EngineError>;

    /// Return the engine to its null state after EOS or error
    async fn release(&mut self) -> Result<(), EngineError>;
}
