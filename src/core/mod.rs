//! Core capture logic.
//!
//! This module contains:
//! - Inventory: Audio source discovery and selection
//! - Chain: Processing-chain resolution with capability fallback
//! - Graph: Pipeline description builder
//! - Levels: RMS extraction from element messages
//! - Controller: Runtime state machine and drain loop
//! - Worker: End-to-end orchestration of one capture

pub mod chain;
pub mod controller;
pub mod errors;
pub mod graph;
pub mod inventory;
pub mod levels;
pub mod worker;

// Re-export commonly used types
pub use chain::{needs_capability, resolve_chain, REQUIRED_ELEMENT};
pub use controller::{Announcement, ControllerTimings, RunReport, RuntimeController, Termination};
pub use errors::WorkerError;
pub use graph::{clamp_gain, BranchSpec, OutputFormat, PipelineSpec, SourceRef};
pub use inventory::{pick_source, DeviceInventory};
pub use levels::{extract_rms_db, LevelLookup, LevelMemory, MeterChannel};
pub use worker::{report_fatal, RunPlan, Worker, WorkerArgs};
