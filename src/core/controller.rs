//! Pipeline runtime controller.
//!
//! Drives one pipeline from instantiation to shutdown:
//!
//! ```text
//! Idle ─launch─▶ Started ─play─▶ Draining ─stop/EOS/error─▶ Stopping ─▶ Stopped
//!   └──────────────┴─ failure ─▶ Failed
//! ```
//!
//! Everything happens on one task. A single `select!` loop interleaves the
//! bounded bus poll, incoming control commands and the hard-stop deadline,
//! so the controller state needs no locking. Porting this to a multi-task
//! design would require moving the state behind a single-owner channel.

use std::future::pending;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{BusMessage, PipelineEngine, PipelineHandle};
use crate::domain::{RunState, RuntimeEvent};
use crate::protocol::{ControlCommand, EventSink};

use super::errors::WorkerError;
use super::levels::LevelMemory;

/// Default bounded wait per bus poll
pub const DEFAULT_BUS_POLL: Duration = Duration::from_millis(100);

/// Default grace period between a stop request and the forced stop
pub const DEFAULT_HARD_STOP: Duration = Duration::from_millis(2000);

/// Timing knobs for the drain loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTimings {
    pub bus_poll: Duration,
    pub hard_stop: Duration,
}

impl Default for ControllerTimings {
    fn default() -> Self {
        Self {
            bus_poll: DEFAULT_BUS_POLL,
            hard_stop: DEFAULT_HARD_STOP,
        }
    }
}

/// Source names reported in the `started` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub actual_mic: String,
    pub actual_monitor: String,
}

/// Why the drain loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// End-of-stream or engine exit
    Natural,

    /// Engine posted an error
    EngineError,

    /// Hard-stop deadline elapsed after a stop request
    Forced,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub final_state: RunState,
    pub termination: Option<Termination>,
    pub stop_requested: bool,
}

impl RunReport {
    /// Process exit status: only pre-start failures are non-zero
    pub fn exit_code(&self) -> i32 {
        match self.final_state {
            RunState::Failed => 1,
            _ => 0,
        }
    }
}

/// Owns all mutable state of one run
pub struct RuntimeController<'a> {
    run_id: Uuid,
    sink: &'a mut dyn EventSink,
    timings: ControllerTimings,
    out_path: String,
    state: RunState,
    levels: LevelMemory,
    stop_requested: bool,
    stopped_emitted: bool,
    deadline: Option<Instant>,
    termination: Option<Termination>,
}

impl<'a> RuntimeController<'a> {
    pub fn new(
        sink: &'a mut dyn EventSink,
        timings: ControllerTimings,
        out_path: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sink,
            timings,
            out_path: out_path.into(),
            state: RunState::Idle,
            levels: LevelMemory::default(),
            stop_requested: false,
            stopped_emitted: false,
            deadline: None,
            termination: None,
        }
    }

    /// Use a caller-supplied run id for log correlation
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Instantiate `graph`, start it, and drain it until shutdown
    #[instrument(skip_all, fields(run_id = %self.run_id, engine = engine.name()))]
    pub async fn run(
        &mut self,
        engine: &dyn PipelineEngine,
        graph: &str,
        announcement: Announcement,
        controls: &mut mpsc::Receiver<ControlCommand>,
    ) -> RunReport {
        let mut pipeline = match engine.launch(graph).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                return self.fail(&WorkerError::Instantiation {
                    reason: e.to_string(),
                    graph: graph.to_string(),
                });
            }
        };
        self.transition(RunState::Started);

        if let Err(e) = pipeline.play().await {
            let _ = pipeline.force_stop().await;
            return self.fail(&WorkerError::Start(e.to_string()));
        }

        info!(
            mic = %announcement.actual_mic,
            monitor = %announcement.actual_monitor,
            out_path = %self.out_path,
            "Capture started"
        );
        let started = RuntimeEvent::started(
            announcement.actual_mic,
            announcement.actual_monitor,
            self.out_path.clone(),
        );
        self.sink.emit(&started);
        self.transition(RunState::Draining);

        self.drain(pipeline.as_mut(), controls).await;
        self.report()
    }

    /// Report a pre-start failure and end the run
    pub fn fail(&mut self, error: &WorkerError) -> RunReport {
        warn!(error = %error, kind = error.kind(), "Run failed");
        self.sink
            .emit(&RuntimeEvent::error(error.to_string(), error.details()));
        self.transition(RunState::Failed);
        self.report()
    }

    async fn drain(
        &mut self,
        pipeline: &mut dyn PipelineHandle,
        controls: &mut mpsc::Receiver<ControlCommand>,
    ) {
        let mut controls_open = true;

        while !self.state.is_terminal() {
            tokio::select! {
                biased;

                _ = wait_for_deadline(self.deadline) => {
                    self.on_deadline(pipeline).await;
                }
                command = controls.recv(), if controls_open => match command {
                    Some(ControlCommand::Stop) => self.request_stop(pipeline).await,
                    None => {
                        debug!("Control channel closed");
                        controls_open = false;
                    }
                },
                message = pipeline.poll_bus(self.timings.bus_poll) => {
                    if let Some(message) = message {
                        self.on_bus_message(pipeline, message).await;
                    }
                }
            }
        }
    }

    /// Graceful stop: inject EOS and arm the hard deadline. Idempotent.
    async fn request_stop(&mut self, pipeline: &mut dyn PipelineHandle) {
        if self.stop_requested || self.state.is_stopping_or_done() {
            debug!(state = ?self.state, "Stop already in progress");
            return;
        }
        self.stop_requested = true;
        info!(hard_stop = ?self.timings.hard_stop, "Stop requested");

        self.transition(RunState::Stopping);
        if let Err(e) = pipeline.send_eos().await {
            warn!(error = %e, "Failed to request end-of-stream");
        }
        self.deadline = Some(Instant::now() + self.timings.hard_stop);
    }

    async fn on_bus_message(&mut self, pipeline: &mut dyn PipelineHandle, message: BusMessage) {
        match message {
            BusMessage::Element { source, payload } => {
                if self.levels.observe(&source, &payload) {
                    self.sink.emit(&RuntimeEvent::level(
                        self.levels.mic_db,
                        self.levels.monitor_db,
                    ));
                }
            }
            BusMessage::Error {
                source,
                message,
                debug,
            } => {
                warn!(%source, %message, "Pipeline reported an error");
                let details = serde_json::json!({
                    "kind": "engine",
                    "source": source,
                    "debug": debug,
                });
                self.sink.emit(&RuntimeEvent::error(message, details));
                self.finish(pipeline, Termination::EngineError).await;
            }
            BusMessage::Eos => {
                debug!("End of stream");
                self.finish(pipeline, Termination::Natural).await;
            }
            BusMessage::Closed => {
                debug!("Engine closed its bus");
                self.finish(pipeline, Termination::Natural).await;
            }
        }
    }

    /// Natural termination: cancel the deadline and release the engine
    async fn finish(&mut self, pipeline: &mut dyn PipelineHandle, termination: Termination) {
        if self.stopped_emitted {
            return;
        }
        self.deadline = None;
        if self.state == RunState::Draining {
            self.transition(RunState::Stopping);
        }
        if let Err(e) = pipeline.release().await {
            warn!(error = %e, "Failed to release pipeline");
        }
        self.complete(termination);
    }

    async fn on_deadline(&mut self, pipeline: &mut dyn PipelineHandle) {
        self.deadline = None;
        if self.stopped_emitted {
            return;
        }
        warn!("Hard stop deadline elapsed, forcing pipeline down");
        if let Err(e) = pipeline.force_stop().await {
            debug!(error = %e, "Forced stop reported an error");
        }
        self.complete(Termination::Forced);
    }

    fn complete(&mut self, termination: Termination) {
        if self.stopped_emitted {
            return;
        }
        self.stopped_emitted = true;
        self.termination = Some(termination);
        self.transition(RunState::Stopped);
        info!(?termination, out_path = %self.out_path, "Capture stopped");
        self.sink.emit(&RuntimeEvent::stopped(self.out_path.clone()));
    }

    fn transition(&mut self, next: RunState) {
        if self.state.can_transition_to(next) {
            debug!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
        } else {
            debug!(from = ?self.state, to = ?next, "Ignoring illegal transition");
        }
    }

    fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            final_state: self.state,
            termination: self.termination,
            stop_requested: self.stop_requested,
        }
    }
}

/// Resolves at `deadline`; never resolves when no deadline is armed
async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
