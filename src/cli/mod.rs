//! Command-line entry points.
//!
//! `capture-worker` takes eight positional arguments and speaks the JSON
//! line protocol; `capture-probe` (see [`probe`]) is the interactive harness
//! built on the same components.

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::GstLaunchEngine;
use crate::config::WorkerConfig;
use crate::core::graph::MIN_METER_INTERVAL_MS;
use crate::core::worker::DEFAULT_METER_INTERVAL_MS;
use crate::core::{clamp_gain, report_fatal, Worker, WorkerArgs, WorkerError};
use crate::domain::{ProcessingMode, SourceSelector};
use crate::protocol::{spawn_control_reader, spawn_interrupt_listener, EventSink, JsonLineSink};

pub mod probe;

/// Initialise tracing on stderr; stdout is reserved for protocol output
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// capture-worker - supervised audio capture with JSON line telemetry
#[derive(Parser, Debug, Default)]
#[command(name = "capture-worker")]
#[command(version, about, long_about = None)]
pub struct WorkerCli {
    /// Microphone: auto, default, or a source name
    pub mic: Option<String>,

    /// Monitor: auto, default, a source name, or empty to disable
    pub monitor: Option<String>,

    /// Output file; the extension picks the encoder (.ogg, .wav, .flac)
    pub out_path: Option<String>,

    /// Microphone processing: none, normalize or voice
    pub mic_processing: Option<String>,

    /// Monitor processing: none, normalize or voice
    pub monitor_processing: Option<String>,

    /// Level metering interval in milliseconds (minimum 10)
    #[arg(allow_negative_numbers = true)]
    pub meter_interval_ms: Option<String>,

    /// Microphone gain multiplier (0.01 to 2)
    #[arg(allow_negative_numbers = true)]
    pub mic_gain: Option<String>,

    /// Monitor gain multiplier (0.01 to 2)
    #[arg(allow_negative_numbers = true)]
    pub monitor_gain: Option<String>,
}

impl WorkerCli {
    /// Validate and normalise the positional arguments
    pub fn into_args(self) -> Result<WorkerArgs, WorkerError> {
        let out_path = self
            .out_path
            .filter(|p| !p.trim().is_empty())
            .ok_or(WorkerError::MissingOutputPath)?;

        Ok(WorkerArgs {
            mic: SourceSelector::parse_mic(self.mic.as_deref().unwrap_or("auto")),
            monitor: SourceSelector::parse_monitor(self.monitor.as_deref().unwrap_or("")),
            out_path,
            mic_processing: parse_mode(self.mic_processing.as_deref()),
            monitor_processing: parse_mode(self.monitor_processing.as_deref()),
            meter_interval_ms: parse_interval(self.meter_interval_ms.as_deref()),
            mic_gain: parse_gain(self.mic_gain.as_deref()),
            monitor_gain: parse_gain(self.monitor_gain.as_deref()),
        })
    }

    /// Run the worker, reporting to `sink`. Returns the process exit status.
    pub async fn execute(self, sink: &mut dyn EventSink) -> i32 {
        let args = match self.into_args() {
            Ok(args) => args,
            Err(e) => return report_fatal(sink, &e),
        };
        let config = match WorkerConfig::load() {
            Ok(config) => config,
            Err(e) => return report_fatal(sink, &WorkerError::Config(format!("{:#}", e))),
        };
        if let Some(path) = &config.config_file {
            debug!(path = %path.display(), "Loaded config file");
        }

        let (tx, mut rx) = mpsc::channel(8);
        let reader = spawn_control_reader(tokio::io::stdin(), tx.clone(), config.stop_on_stdin_eof);
        let interrupt = spawn_interrupt_listener(tx);

        let audio = config.audio_server();
        let engine = GstLaunchEngine::new(config.gst_settings());
        let code = Worker::new(&audio, &engine, config.timings())
            .run_to_exit(&args, sink, &mut rx)
            .await;

        reader.abort();
        interrupt.abort();
        code
    }
}

/// Entry point of the `capture-worker` binary
pub async fn worker_main<I, T>(argv: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut sink = JsonLineSink::stdout();
    match WorkerCli::try_parse_from(argv) {
        Ok(cli) => cli.execute(&mut sink).await,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            0
        }
        Err(e) => report_fatal(
            &mut sink,
            &WorkerError::InvalidArguments(e.to_string().trim().to_string()),
        ),
    }
}

/// Unknown modes fall back to `none`
pub fn parse_mode(raw: Option<&str>) -> ProcessingMode {
    raw.map(ProcessingMode::parse_lossy).unwrap_or(ProcessingMode::None)
}

/// Milliseconds, floored at 10; unparseable input gets the default
pub fn parse_interval(raw: Option<&str>) -> u64 {
    let Some(value) = raw.and_then(|r| r.trim().parse::<f64>().ok()) else {
        return DEFAULT_METER_INTERVAL_MS;
    };
    if !value.is_finite() {
        return DEFAULT_METER_INTERVAL_MS;
    }
    if value < MIN_METER_INTERVAL_MS as f64 {
        MIN_METER_INTERVAL_MS
    } else {
        value.round() as u64
    }
}

/// Gain multiplier after clamping; unparseable input is unity
pub fn parse_gain(raw: Option<&str>) -> f64 {
    match raw {
        Some(raw) => clamp_gain(raw.trim().parse().unwrap_or(f64::NAN)),
        None => clamp_gain(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> WorkerCli {
        WorkerCli::try_parse_from(std::iter::once("capture-worker").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_full_positional_arguments() {
        let args = parse(&["auto", "", "/tmp/out.ogg", "voice", "none", "50", "0.5", "3"])
            .into_args()
            .unwrap();

        assert_eq!(args.mic, SourceSelector::Auto);
        assert_eq!(args.monitor, SourceSelector::Disabled);
        assert_eq!(args.out_path, "/tmp/out.ogg");
        assert_eq!(args.mic_processing, ProcessingMode::Voice);
        assert_eq!(args.monitor_processing, ProcessingMode::None);
        assert_eq!(args.meter_interval_ms, 50);
        assert_eq!(args.mic_gain, 0.5);
        assert_eq!(args.monitor_gain, 2.0);
    }

    #[test]
    fn test_trailing_arguments_default() {
        let args = parse(&["default", "auto", "/tmp/out.wav"]).into_args().unwrap();

        assert_eq!(args.mic, SourceSelector::Default);
        assert_eq!(args.monitor, SourceSelector::Auto);
        assert_eq!(args.mic_processing, ProcessingMode::None);
        assert_eq!(args.meter_interval_ms, DEFAULT_METER_INTERVAL_MS);
        assert_eq!(args.mic_gain, 1.0);
    }

    #[test]
    fn test_missing_output_path() {
        let err = parse(&["auto", ""]).into_args().unwrap_err();
        assert!(matches!(err, WorkerError::MissingOutputPath));

        let err = parse(&["auto", "", "  "]).into_args().unwrap_err();
        assert!(matches!(err, WorkerError::MissingOutputPath));
    }

    #[test]
    fn test_negative_gain_is_accepted_then_clamped() {
        let args = parse(&["auto", "", "/tmp/o.ogg", "none", "none", "100", "-1", "1"])
            .into_args()
            .unwrap();
        assert_eq!(args.mic_gain, 1.0);
    }

    #[test]
    fn test_too_many_arguments_rejected() {
        let argv = ["capture-worker", "a", "b", "c", "d", "e", "f", "g", "h", "i"];
        assert!(WorkerCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!(parse_interval(Some("100")), 100);
        assert_eq!(parse_interval(Some("5")), 10);
        assert_eq!(parse_interval(Some("-20")), 10);
        assert_eq!(parse_interval(Some("33.4")), 33);
        assert_eq!(parse_interval(Some("fast")), DEFAULT_METER_INTERVAL_MS);
        assert_eq!(parse_interval(Some("NaN")), DEFAULT_METER_INTERVAL_MS);
        assert_eq!(parse_interval(None), DEFAULT_METER_INTERVAL_MS);
    }

    #[test]
    fn test_gain_parsing() {
        assert_eq!(parse_gain(Some("1.5")), 1.5);
        assert_eq!(parse_gain(Some("loud")), 1.0);
        assert_eq!(parse_gain(Some("0")), 1.0);
        assert_eq!(parse_gain(Some("inf")), 1.0);
        assert_eq!(parse_gain(None), 1.0);
    }

    #[test]
    fn test_unknown_mode_is_none() {
        assert_eq!(parse_mode(Some("studio")), ProcessingMode::None);
        assert_eq!(parse_mode(Some("normalize")), ProcessingMode::Normalize);
    }

    #[tokio::test]
    async fn test_missing_output_reports_error_event() {
        let mut sink = crate::protocol::MemorySink::new();
        let code = parse(&["auto"]).execute(&mut sink).await;

        assert_eq!(code, 1);
        assert_eq!(sink.kinds(), vec!["error"]);
    }
}
