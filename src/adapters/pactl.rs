//! PulseAudio / PipeWire source enumeration via `pactl`.
//!
//! Runs `pactl list short sources` as a subprocess with a bounded timeout.
//! Every failure mode collapses to an empty listing.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::AudioServer;
use crate::domain::{AudioSource, SourceState};

/// Default bound on a single server query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(4);

/// Audio server adapter backed by the `pactl` CLI
pub struct PactlAudioServer {
    /// Path to the pactl binary (default: "pactl")
    binary_path: String,

    /// Upper bound for one query
    query_timeout: Duration,
}

impl Default for PactlAudioServer {
    fn default() -> Self {
        Self::new()
    }
}

impl PactlAudioServer {
    pub fn new() -> Self {
        Self::with_binary_path("pactl", DEFAULT_QUERY_TIMEOUT)
    }

    /// Create an adapter with a custom binary path and timeout
    pub fn with_binary_path(binary_path: impl Into<String>, query_timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            query_timeout,
        }
    }

    async fn query(&self) -> Result<String> {
        let child = Command::new(&self.binary_path)
            .args(["list", "short", "sources"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary_path))?;

        let output = timeout(self.query_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "{} timed out after {:?}",
                    self.binary_path, self.query_timeout
                )
            })?
            .with_context(|| format!("Failed to wait for {}", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} failed with exit code {}: {}",
                self.binary_path,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl AudioServer for PactlAudioServer {
    fn name(&self) -> &str {
        "pactl"
    }

    async fn list_sources(&self) -> Vec<AudioSource> {
        match self.query().await {
            Ok(stdout) => {
                let sources = parse_short_sources(&stdout);
                debug!(count = sources.len(), "Enumerated audio sources");
                sources
            }
            Err(e) => {
                warn!(error = %e, "Audio source query failed, treating as empty");
                Vec::new()
            }
        }
    }
}

/// Parse `pactl list short sources` output.
///
/// Each line is tab separated: `index name driver sample-spec state`.
/// Lines without a name column are skipped; a missing state column is
/// reported as an empty `Other` state.
pub fn parse_short_sources(stdout: &str) -> Vec<AudioSource> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut columns = line.split('\t');
            let _index = columns.next()?;
            let name = columns.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let state = columns
                .nth(2)
                .map(SourceState::parse)
                .unwrap_or_else(|| SourceState::Other(String::new()));
            Some(AudioSource::new(name, state))
        })
        .collect()
}
