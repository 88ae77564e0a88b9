//! Worker configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (`CAPTURE_WORKER_*`)
//! 2. Config file (`$CAPTURE_WORKER_CONFIG`, else
//!    `<config_dir>/capture-worker/config.yaml`)
//! 3. Defaults
//!
//! A config file that exists but cannot be parsed is an error; a missing
//! default-location file is not.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::gst_launch::GstLaunchSettings;
use crate::adapters::PactlAudioServer;
use crate::core::ControllerTimings;

/// Prefix of all configuration environment variables
pub const ENV_PREFIX: &str = "CAPTURE_WORKER_";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "CAPTURE_WORKER_CONFIG";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub pactl_bin: Option<String>,
    pub gst_launch_bin: Option<String>,
    pub gst_inspect_bin: Option<String>,
    pub query_timeout_ms: Option<u64>,
    pub launch_timeout_ms: Option<u64>,
    pub bus_poll_ms: Option<u64>,
    pub hard_stop_ms: Option<u64>,
    pub release_timeout_ms: Option<u64>,
    pub stop_on_stdin_eof: Option<bool>,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub pactl_bin: String,
    pub gst_launch_bin: String,
    pub gst_inspect_bin: String,
    pub query_timeout_ms: u64,
    pub launch_timeout_ms: u64,
    pub bus_poll_ms: u64,
    pub hard_stop_ms: u64,
    pub release_timeout_ms: u64,
    pub stop_on_stdin_eof: bool,
    /// Path to config file (if one was read)
    pub config_file: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pactl_bin: "pactl".to_string(),
            gst_launch_bin: "gst-launch-1.0".to_string(),
            gst_inspect_bin: "gst-inspect-1.0".to_string(),
            query_timeout_ms: 4000,
            launch_timeout_ms: 5000,
            bus_poll_ms: 100,
            hard_stop_ms: 2000,
            release_timeout_ms: 1500,
            stop_on_stdin_eof: true,
            config_file: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the process environment and config file
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok(), default_config_path())
    }

    /// Load with an injectable environment lookup and default file location
    pub fn load_with<F>(lookup: F, default_path: Option<PathBuf>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let explicit = lookup(CONFIG_PATH_ENV).map(PathBuf::from);
        let config_path = match explicit {
            Some(path) => Some(path),
            None => default_path.filter(|p| p.exists()),
        };
        if let Some(path) = config_path {
            let file = load_config_file(&path)?;
            config.apply_file(file);
            config.config_file = Some(path);
        }

        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.pactl_bin {
            self.pactl_bin = v;
        }
        if let Some(v) = file.gst_launch_bin {
            self.gst_launch_bin = v;
        }
        if let Some(v) = file.gst_inspect_bin {
            self.gst_inspect_bin = v;
        }
        self.query_timeout_ms = file.query_timeout_ms.unwrap_or(self.query_timeout_ms);
        self.launch_timeout_ms = file.launch_timeout_ms.unwrap_or(self.launch_timeout_ms);
        self.bus_poll_ms = file.bus_poll_ms.unwrap_or(self.bus_poll_ms);
        self.hard_stop_ms = file.hard_stop_ms.unwrap_or(self.hard_stop_ms);
        self.release_timeout_ms = file.release_timeout_ms.unwrap_or(self.release_timeout_ms);
        self.stop_on_stdin_eof = file.stop_on_stdin_eof.unwrap_or(self.stop_on_stdin_eof);
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("PACTL_BIN") {
            self.pactl_bin = v;
        }
        if let Some(v) = var("GST_LAUNCH_BIN") {
            self.gst_launch_bin = v;
        }
        if let Some(v) = var("GST_INSPECT_BIN") {
            self.gst_inspect_bin = v;
        }
        for (name, slot) in [
            ("QUERY_TIMEOUT_MS", &mut self.query_timeout_ms),
            ("LAUNCH_TIMEOUT_MS", &mut self.launch_timeout_ms),
            ("BUS_POLL_MS", &mut self.bus_poll_ms),
            ("HARD_STOP_MS", &mut self.hard_stop_ms),
            ("RELEASE_TIMEOUT_MS", &mut self.release_timeout_ms),
        ] {
            if let Some(raw) = var(name) {
                *slot = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {}{}: {:?}", ENV_PREFIX, name, raw))?;
            }
        }
        if let Some(raw) = var("STOP_ON_STDIN_EOF") {
            self.stop_on_stdin_eof = parse_bool(&raw)
                .with_context(|| format!("Invalid {}STOP_ON_STDIN_EOF: {:?}", ENV_PREFIX, raw))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.bus_poll_ms == 0 {
            anyhow::bail!("bus_poll_ms must be greater than zero");
        }
        if self.hard_stop_ms == 0 {
            anyhow::bail!("hard_stop_ms must be greater than zero");
        }
        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn gst_settings(&self) -> GstLaunchSettings {
        GstLaunchSettings {
            launch_bin: self.gst_launch_bin.clone(),
            inspect_bin: self.gst_inspect_bin.clone(),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            launch_timeout: Duration::from_millis(self.launch_timeout_ms),
            release_timeout: Duration::from_millis(self.release_timeout_ms),
        }
    }

    /// Drain-loop timings derived from this configuration
    pub fn timings(&self) -> ControllerTimings {
        ControllerTimings {
            bus_poll: Duration::from_millis(self.bus_poll_ms),
            hard_stop: Duration::from_millis(self.hard_stop_ms),
        }
    }

    /// Audio server adapter derived from this configuration
    pub fn audio_server(&self) -> PactlAudioServer {
        PactlAudioServer::with_binary_path(
            self.pactl_bin.clone(),
            Duration::from_millis(self.query_timeout_ms),
        )
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("capture-worker").join("config.yaml"))
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}
