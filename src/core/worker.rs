//! Worker orchestration.
//!
//! Turns one set of worker arguments into a running capture: check the
//! engine, resolve sources, resolve processing chains, build the graph and
//! hand it to the runtime controller.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::adapters::{AudioServer, PipelineEngine};
use crate::domain::{ProcessingMode, SourceSelector, DEFAULT_MONITOR_ALIAS};
use crate::protocol::{ControlCommand, EventSink};

use super::chain::{needs_capability, resolve_chain, REQUIRED_ELEMENT};
use super::controller::{Announcement, ControllerTimings, RunReport, RuntimeController};
use super::errors::WorkerError;
use super::graph::{BranchSpec, PipelineSpec, SourceRef, DEFAULT_GAIN};
use super::inventory::DeviceInventory;

/// Label reported when the mic falls back to the server default
pub const DEFAULT_MIC_LABEL: &str = "default";

/// Default metering interval
pub const DEFAULT_METER_INTERVAL_MS: u64 = 100;

/// Everything the worker needs to know about one capture
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerArgs {
    pub mic: SourceSelector,
    pub monitor: SourceSelector,
    pub out_path: String,
    pub mic_processing: ProcessingMode,
    pub monitor_processing: ProcessingMode,
    pub meter_interval_ms: u64,
    pub mic_gain: f64,
    pub monitor_gain: f64,
}

impl WorkerArgs {
    /// Auto-selected mic, no monitor, no processing, unity gain
    pub fn new(out_path: impl Into<String>) -> Self {
        Self {
            mic: SourceSelector::Auto,
            monitor: SourceSelector::Disabled,
            out_path: out_path.into(),
            mic_processing: ProcessingMode::None,
            monitor_processing: ProcessingMode::None,
            meter_interval_ms: DEFAULT_METER_INTERVAL_MS,
            mic_gain: DEFAULT_GAIN,
            monitor_gain: DEFAULT_GAIN,
        }
    }
}

/// A resolved capture, ready to launch
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub announcement: Announcement,
    pub spec: PipelineSpec,
    pub graph: String,
    /// Result of the capability probe, if one was needed
    pub has_dsp: Option<bool>,
}

/// Resolves and runs captures against an audio server and a pipeline engine
pub struct Worker<'a> {
    audio: &'a dyn AudioServer,
    engine: &'a dyn PipelineEngine,
    timings: ControllerTimings,
}

impl<'a> Worker<'a> {
    pub fn new(
        audio: &'a dyn AudioServer,
        engine: &'a dyn PipelineEngine,
        timings: ControllerTimings,
    ) -> Self {
        Self {
            audio,
            engine,
            timings,
        }
    }

    /// Resolve sources and chains and render the graph. Never fails.
    #[instrument(skip_all, fields(out_path = %args.out_path))]
    pub async fn plan(&self, args: &WorkerArgs) -> RunPlan {
        let inventory = DeviceInventory::new(self.audio);

        let (mic_ref, actual_mic) = resolve_mic(&inventory, &args.mic).await;
        let monitor = resolve_monitor(&inventory, &args.monitor).await;

        let has_dsp = if needs_capability(args.mic_processing)
            || (monitor.is_some() && needs_capability(args.monitor_processing))
        {
            let available = self.engine.has_element(REQUIRED_ELEMENT).await;
            if !available {
                info!(element = REQUIRED_ELEMENT, "Processing element missing, using passthrough");
            }
            Some(available)
        } else {
            None
        };
        let capable = has_dsp.unwrap_or(false);

        let mic = BranchSpec::new(
            mic_ref,
            resolve_chain(args.mic_processing, capable),
            args.mic_gain,
        );
        let (monitor_branch, actual_monitor) = match monitor {
            Some((source, name)) => (
                Some(BranchSpec::new(
                    source,
                    resolve_chain(args.monitor_processing, capable),
                    args.monitor_gain,
                )),
                name,
            ),
            None => (None, String::new()),
        };

        let spec = PipelineSpec::new(
            mic,
            monitor_branch,
            args.meter_interval_ms,
            args.out_path.clone(),
        );
        let graph = spec.build();
        debug!(dual = spec.is_dual(), %graph, "Pipeline graph built");

        RunPlan {
            announcement: Announcement {
                actual_mic,
                actual_monitor,
            },
            spec,
            graph,
            has_dsp,
        }
    }

    /// Run one capture to completion, reporting through `sink`
    pub async fn run(
        &self,
        args: &WorkerArgs,
        sink: &mut dyn EventSink,
        controls: &mut mpsc::Receiver<ControlCommand>,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let mut controller =
            RuntimeController::new(sink, self.timings, args.out_path.clone()).with_run_id(run_id);

        if args.out_path.trim().is_empty() {
            return controller.fail(&WorkerError::MissingOutputPath);
        }

        if let Err(e) = self.engine.check_available().await {
            return controller.fail(&WorkerError::MissingDependency(e.to_string()));
        }

        let plan = self.plan(args).await;
        info!(%run_id, dual = plan.spec.is_dual(), "Launching capture");
        controller
            .run(self.engine, &plan.graph, plan.announcement, controls)
            .await
    }

    /// Run one capture and return the process exit status. A panic inside
    /// the run becomes a fatal `error` event.
    pub async fn run_to_exit(
        &self,
        args: &WorkerArgs,
        sink: &mut dyn EventSink,
        controls: &mut mpsc::Receiver<ControlCommand>,
    ) -> i32 {
        let outcome = AssertUnwindSafe(self.run(args, &mut *sink, controls))
            .catch_unwind()
            .await;
        match outcome {
            Ok(report) => {
                info!(run_id = %report.run_id, state = ?report.final_state, "Worker finished");
                report.exit_code()
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "Worker panicked");
                report_fatal(sink, &WorkerError::Internal(message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

async fn resolve_mic(inventory: &DeviceInventory<'_>, selector: &SourceSelector) -> (SourceRef, String) {
    let picked = match selector {
        SourceSelector::Auto => inventory.pick_mic().await,
        SourceSelector::Named(name) => name.clone(),
        SourceSelector::Default | SourceSelector::Disabled => String::new(),
    };
    if picked.is_empty() {
        (SourceRef::Default, DEFAULT_MIC_LABEL.to_string())
    } else {
        (SourceRef::Device(picked.clone()), picked)
    }
}

async fn resolve_monitor(
    inventory: &DeviceInventory<'_>,
    selector: &SourceSelector,
) -> Option<(SourceRef, String)> {
    let picked = match selector {
        SourceSelector::Disabled => return None,
        SourceSelector::Auto => inventory.pick_monitor().await,
        SourceSelector::Default => DEFAULT_MONITOR_ALIAS.to_string(),
        SourceSelector::Named(name) => name.clone(),
    };
    if picked.is_empty() {
        debug!("No monitor source available, capturing mic only");
        None
    } else {
        Some((SourceRef::Device(picked.clone()), picked))
    }
}

/// Report an error that happens before a worker exists (argument parsing,
/// configuration). Returns the exit status.
pub fn report_fatal(sink: &mut dyn EventSink, error: &WorkerError) -> i32 {
    let mut controller = RuntimeController::new(sink, ControllerTimings::default(), "");
    controller.fail(error).exit_code()
}
