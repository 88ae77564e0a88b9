//! GStreamer engine driven through the `gst-launch-1.0` CLI.
//!
//! The pipeline runs as a child process started with `-m -e`: `-m` prints
//! every bus message, `-e` turns SIGINT into an end-of-stream so the muxer
//! can finalise the file. Output lines are decoded by [`super::gst_output`]
//! on reader tasks and forwarded over a channel.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::gst_output::{EngineOutput, OutputDecoder};
use super::{BusMessage, EngineError, PipelineEngine, PipelineHandle};

/// Binaries and timeouts used by the engine
#[derive(Debug, Clone)]
pub struct GstLaunchSettings {
    pub launch_bin: String,
    pub inspect_bin: String,

    /// Bound for `--version` / `--exists` probes
    pub query_timeout: Duration,

    /// How long to wait for the description to be parsed
    pub launch_timeout: Duration,

    /// How long to wait for the process to exit after EOS
    pub release_timeout: Duration,
}

impl Default for GstLaunchSettings {
    fn default() -> Self {
        Self {
            launch_bin: "gst-launch-1.0".to_string(),
            inspect_bin: "gst-inspect-1.0".to_string(),
            query_timeout: Duration::from_secs(4),
            launch_timeout: Duration::from_secs(5),
            release_timeout: Duration::from_millis(1500),
        }
    }
}

/// Pipeline engine using gst-launch subprocesses
pub struct GstLaunchEngine {
    settings: GstLaunchSettings,
}

impl Default for GstLaunchEngine {
    fn default() -> Self {
        Self::new(GstLaunchSettings::default())
    }
}

impl GstLaunchEngine {
    pub fn new(settings: GstLaunchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GstLaunchSettings {
        &self.settings
    }

    /// Run a short probe command, returning whether it exited successfully
    async fn probe(&self, binary: &str, args: &[&str]) -> Result<bool, String> {
        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| e.to_string())?;

        match timeout(self.settings.query_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output.status.success()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.settings.query_timeout)),
        }
    }
}

#[async_trait]
impl PipelineEngine for GstLaunchEngine {
    fn name(&self) -> &str {
        "gst-launch"
    }

    async fn check_available(&self) -> Result<(), EngineError> {
        let binary = &self.settings.launch_bin;
        match self.probe(binary, &["--version"]).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::Unavailable {
                binary: binary.clone(),
                reason: "--version exited with failure".to_string(),
            }),
            Err(reason) => Err(EngineError::Unavailable {
                binary: binary.clone(),
                reason,
            }),
        }
    }

    async fn has_element(&self, factory: &str) -> bool {
        match self
            .probe(&self.settings.inspect_bin, &["--exists", factory])
            .await
        {
            Ok(found) => {
                debug!(factory, found, "Element capability probe");
                found
            }
            Err(reason) => {
                warn!(factory, %reason, "Element capability probe failed");
                false
            }
        }
    }

    async fn launch(&self, graph: &str) -> Result<Box<dyn PipelineHandle>, EngineError> {
        let tokens = graph_argv(graph)?;
        debug!(
            command = %shell_words::join(
                [self.settings.launch_bin.as_str(), "-m", "-e"]
                    .into_iter()
                    .chain(tokens.iter().map(String::as_str))
            ),
            "Spawning pipeline"
        );

        let mut child = Command::new(&self.settings.launch_bin)
            .args(["-m", "-e"])
            .args(&tokens)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Unavailable {
                binary: self.settings.launch_bin.clone(),
                reason: e.to_string(),
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx);
        }

        // Wait for the description to be accepted. Bus traffic seen before
        // that point is kept for the handle.
        let deadline = Instant::now() + self.settings.launch_timeout;
        let mut early = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(EngineOutput::Constructed)) => break,
                Ok(Some(EngineOutput::ConstructionFailed(reason))) => {
                    let _ = child.start_kill();
                    return Err(EngineError::Construction(reason));
                }
                Ok(Some(EngineOutput::Bus(BusMessage::Error { message, debug, .. }))) => {
                    let _ = child.start_kill();
                    let reason = match debug {
                        Some(debug) => format!("{} ({})", message, debug),
                        None => message,
                    };
                    return Err(EngineError::Construction(reason));
                }
                Ok(Some(EngineOutput::Bus(msg))) => early.push(msg),
                Ok(None) => {
                    let status = child.wait().await?;
                    return Err(EngineError::Construction(format!(
                        "gst-launch exited before the pipeline was built ({})",
                        status
                    )));
                }
                Err(_) => {
                    let _ = child.start_kill();
                    return Err(EngineError::LaunchTimeout(self.settings.launch_timeout));
                }
            }
        }

        info!(pid = ?child.id(), "Pipeline constructed");
        Ok(Box::new(GstLaunchPipeline {
            child,
            rx,
            early,
            release_timeout: self.settings.release_timeout,
        }))
    }
}

fn spawn_reader<R>(stream: R, tx: mpsc::UnboundedSender<EngineOutput>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut decoder = OutputDecoder::new();
        while let Ok(Some(line)) = lines.next_line().await {
            for output in decoder.feed(&line) {
                if tx.send(output).is_err() {
                    return;
                }
            }
        }
        if let Some(output) = decoder.finish() {
            let _ = tx.send(output);
        }
    });
}

/// A running gst-launch child process
struct GstLaunchPipeline {
    child: Child,
    rx: mpsc::UnboundedReceiver<EngineOutput>,
    early: Vec<BusMessage>,
    release_timeout: Duration,
}

impl GstLaunchPipeline {
    async fn wait_or_kill(&mut self, limit: Duration) -> Result<(), EngineError> {
        match timeout(limit, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(%status, "gst-launch exited");
                Ok(())
            }
            Err(_) => {
                warn!(?limit, "gst-launch did not exit, killing");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl PipelineHandle for GstLaunchPipeline {
    async fn play(&mut self) -> Result<(), EngineError> {
        // gst-launch brings the pipeline to PLAYING by itself
        Ok(())
    }

    async fn poll_bus(&mut self, limit: Duration) -> Option<BusMessage> {
        if !self.early.is_empty() {
            return Some(self.early.remove(0));
        }

        let rx = &mut self.rx;
        let next = async {
            loop {
                match rx.recv().await {
                    Some(EngineOutput::Bus(msg)) => return msg,
                    Some(_) => continue,
                    None => return BusMessage::Closed,
                }
            }
        };
        timeout(limit, next).await.ok()
    }

    async fn send_eos(&mut self) -> Result<(), EngineError> {
        match self.child.id() {
            Some(pid) => interrupt(pid),
            None => Ok(()),
        }
    }

    async fn force_stop(&mut self) -> Result<(), EngineError> {
        self.child.start_kill()?;
        let _ = self.child.wait().await;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), EngineError> {
        let limit = self.release_timeout;
        self.wait_or_kill(limit).await
    }
}

#[cfg(unix)]
fn interrupt(pid: u32) -> Result<(), EngineError> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| EngineError::Io(std::io::Error::other("pid out of range")))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(EngineError::Io(std::io::Error::last_os_error()))
    }
}

#[cfg(not(unix))]
fn interrupt(_pid: u32) -> Result<(), EngineError> {
    Err(EngineError::Io(std::io::Error::other(
        "graceful interrupt is only supported on unix",
    )))
}

/// Split a pipeline description into gst-launch arguments.
///
/// Splits on whitespace outside double quotes and keeps quotes and
/// backslash escapes in the tokens. gst-launch joins its arguments with
/// spaces and only escapes spaces outside quotes, so the engine parses the
/// same text that was passed in.
pub fn graph_argv(graph: &str) -> Result<Vec<String>, EngineError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = graph.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                match chars.next() {
                    Some(next) => current.push(next),
                    None => {
                        return Err(EngineError::InvalidGraph("trailing backslash".to_string()))
                    }
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(EngineError::InvalidGraph("unbalanced quotes".to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(EngineError::InvalidGraph("empty description".to_string()));
    }
    Ok(tokens)
}
