//! Interactive capture harness.
//!
//! Same inventory, chain resolution, graph builder and controller as the
//! worker; only the presentation differs. Output is meant for a terminal.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use crate::adapters::{GstLaunchEngine, PipelineEngine};
use crate::config::WorkerConfig;
use crate::core::inventory::DeviceInventory;
use crate::core::worker::DEFAULT_METER_INTERVAL_MS;
use crate::core::{clamp_gain, Worker, WorkerArgs};
use crate::domain::{RuntimeEvent, SourceSelector};
use crate::protocol::{spawn_control_reader, spawn_interrupt_listener, ControlCommand, EventSink};

use super::parse_mode;

/// Quietest level drawn on the meter
const METER_FLOOR_DB: f64 = -60.0;

/// Width of the meter bar in characters
const METER_WIDTH: usize = 30;

/// capture-probe - inspect audio sources and try capture pipelines
#[derive(Parser, Debug)]
#[command(name = "capture-probe")]
#[command(author, version, about, long_about = None)]
pub struct ProbeCli {
    #[command(subcommand)]
    pub command: ProbeCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProbeCommand {
    /// List audio sources and the automatic picks
    Devices {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the pipeline description a capture would use
    Graph(CaptureOpts),

    /// Run a capture with a live level display (type `stop` or Ctrl-C to end)
    Run {
        #[command(flatten)]
        capture: CaptureOpts,

        /// Stop automatically after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Show resolved configuration
    Config,
}

/// Capture parameters as named options
#[derive(Args, Debug, Clone)]
pub struct CaptureOpts {
    /// Microphone: auto, default, or a source name
    #[arg(long, default_value = "auto")]
    pub mic: String,

    /// Monitor: auto, default, or a source name (omit to disable)
    #[arg(long)]
    pub monitor: Option<String>,

    /// Output file
    #[arg(short, long, default_value = "capture.ogg")]
    pub out: String,

    /// Microphone processing: none, normalize or voice
    #[arg(long, default_value = "none")]
    pub mic_processing: String,

    /// Monitor processing: none, normalize or voice
    #[arg(long, default_value = "none")]
    pub monitor_processing: String,

    /// Level metering interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_METER_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Microphone gain multiplier
    #[arg(long, default_value_t = 1.0)]
    pub mic_gain: f64,

    /// Monitor gain multiplier
    #[arg(long, default_value_t = 1.0)]
    pub monitor_gain: f64,
}

impl CaptureOpts {
    pub fn to_worker_args(&self) -> WorkerArgs {
        WorkerArgs {
            mic: SourceSelector::parse_mic(&self.mic),
            monitor: SourceSelector::parse_monitor(self.monitor.as_deref().unwrap_or("")),
            out_path: self.out.clone(),
            mic_processing: parse_mode(Some(&self.mic_processing)),
            monitor_processing: parse_mode(Some(&self.monitor_processing)),
            meter_interval_ms: self.interval_ms,
            mic_gain: clamp_gain(self.mic_gain),
            monitor_gain: clamp_gain(self.monitor_gain),
        }
    }
}

impl ProbeCli {
    /// Execute the selected command, returning the process exit status
    pub async fn execute(self) -> Result<i32> {
        let config = WorkerConfig::load().context("Failed to load configuration")?;
        let audio = config.audio_server();
        let engine = GstLaunchEngine::new(config.gst_settings());

        match self.command {
            ProbeCommand::Devices { json } => {
                let listing = DeviceInventory::new(&audio).list_sources().await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&listing)?);
                    return Ok(0);
                }

                if listing.is_empty() {
                    println!("No audio sources found (is the audio server running?)");
                    return Ok(0);
                }
                println!("{:<60} {:<10}", "MICROPHONE", "STATE");
                println!("{}", "-".repeat(71));
                for source in &listing.mic_sources {
                    println!("{:<60} {:<10}", source.name, source.state);
                }
                println!();
                println!("{:<60} {:<10}", "MONITOR", "STATE");
                println!("{}", "-".repeat(71));
                for source in &listing.monitor_sources {
                    println!("{:<60} {:<10}", source.name, source.state);
                }
                println!();
                println!("Auto mic:     {}", or_default(&crate::core::pick_source(&listing.mic_sources)));
                println!(
                    "Auto monitor: {}",
                    or_none(&crate::core::pick_source(&listing.monitor_sources))
                );
                Ok(0)
            }

            ProbeCommand::Graph(capture) => {
                let worker = Worker::new(&audio, &engine, config.timings());
                let plan = worker.plan(&capture.to_worker_args()).await;
                eprintln!("Mic:     {}", plan.announcement.actual_mic);
                eprintln!("Monitor: {}", or_none(&plan.announcement.actual_monitor));
                if let Some(has_dsp) = plan.has_dsp {
                    eprintln!("DSP:     {}", if has_dsp { "available" } else { "missing (passthrough)" });
                }
                println!("{}", plan.graph);
                Ok(0)
            }

            ProbeCommand::Run { capture, seconds } => {
                engine
                    .check_available()
                    .await
                    .context("Pipeline engine is not usable")?;

                let (tx, mut rx) = mpsc::channel(8);
                let reader = spawn_control_reader(tokio::io::stdin(), tx.clone(), false);
                let interrupt = spawn_interrupt_listener(tx.clone());
                let timer = seconds.map(|secs| {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                        let _ = tx.send(ControlCommand::Stop).await;
                    })
                });

                let mut sink = ConsoleSink::new(io::stderr());
                let code = Worker::new(&audio, &engine, config.timings())
                    .run_to_exit(&capture.to_worker_args(), &mut sink, &mut rx)
                    .await;

                reader.abort();
                interrupt.abort();
                if let Some(timer) = timer {
                    timer.abort();
                }
                Ok(code)
            }

            ProbeCommand::Config => {
                println!("Configuration:");
                println!(
                    "  Config file:     {}",
                    config
                        .config_file
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(none)".to_string())
                );
                println!("  pactl:           {}", config.pactl_bin);
                println!("  gst-launch:      {}", config.gst_launch_bin);
                println!("  gst-inspect:     {}", config.gst_inspect_bin);
                println!("  Query timeout:   {}ms", config.query_timeout_ms);
                println!("  Launch timeout:  {}ms", config.launch_timeout_ms);
                println!("  Bus poll:        {}ms", config.bus_poll_ms);
                println!("  Hard stop:       {}ms", config.hard_stop_ms);
                println!("  Release timeout: {}ms", config.release_timeout_ms);
                println!("  Stop on EOF:     {}", config.stop_on_stdin_eof);
                Ok(0)
            }
        }
    }
}

fn or_default(name: &str) -> &str {
    if name.is_empty() {
        "(system default)"
    } else {
        name
    }
}

fn or_none(name: &str) -> &str {
    if name.is_empty() {
        "(none)"
    } else {
        name
    }
}

/// Renders runtime events for a human at a terminal
pub struct ConsoleSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn emit(&mut self, event: &RuntimeEvent) {
        let line = match event {
            RuntimeEvent::Started {
                actual_mic,
                actual_monitor,
                out_path,
            } => format!(
                "Recording {} + {} -> {}",
                actual_mic,
                or_none(actual_monitor),
                out_path
            ),
            RuntimeEvent::Level {
                mic_db, monitor_db, ..
            } => format!("mic {}  mon {}", meter(*mic_db), meter(*monitor_db)),
            RuntimeEvent::Stopped { out_path, .. } => format!("Stopped, wrote {}", out_path),
            RuntimeEvent::Error { message, details } => format!("Error: {} {}", message, details),
        };
        let _ = writeln!(self.writer, "{}", line);
    }
}

/// Fixed-width bar for a dB reading
pub fn meter(db: Option<f64>) -> String {
    let Some(db) = db else {
        return format!("[{}]    --  dB", " ".repeat(METER_WIDTH));
    };
    let fraction = ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0);
    let filled = (fraction * METER_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>6.1} dB",
        "#".repeat(filled),
        " ".repeat(METER_WIDTH - filled),
        db
    )
}
