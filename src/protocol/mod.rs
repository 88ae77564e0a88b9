//! Line protocol between the worker and its parent process.
//!
//! Events go out on stdout as newline-delimited JSON, one [`RuntimeEvent`]
//! per line. Control comes in on stdin; the only command is the bare line
//! `stop`, everything else is ignored.

use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::RuntimeEvent;

/// Literal control token that requests a graceful stop
pub const STOP_TOKEN: &str = "stop";

/// Commands delivered to the runtime controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
}

/// Destination for runtime events
pub trait EventSink: Send {
    fn emit(&mut self, event: &RuntimeEvent);
}

/// Writes each event as one JSON line and flushes immediately
pub struct JsonLineSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLineSink<io::Stdout> {
    /// Sink on the process's standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> EventSink for JsonLineSink<W> {
    fn emit(&mut self, event: &RuntimeEvent) {
        let line = match event.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, kind = event.kind(), "Failed to serialize event");
                return;
            }
        };
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            // Parent closed the pipe; nothing left to report to.
            warn!(error = %e, kind = event.kind(), "Failed to write event");
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<RuntimeEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event `type` tags in emission order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(RuntimeEvent::kind).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &RuntimeEvent) {
        self.events.push(event.clone());
    }
}

/// Interpret one line of control input
pub fn parse_control_line(line: &str) -> Option<ControlCommand> {
    if line.trim() == STOP_TOKEN {
        Some(ControlCommand::Stop)
    } else {
        None
    }
}

/// Read control lines from `reader` and forward recognised commands.
///
/// Partial lines are buffered until their newline arrives. Bytes that are
/// not UTF-8 are decoded lossily and ignored like any other noise. When
/// `stop_on_eof` is set, end of input is forwarded as a stop request.
pub fn spawn_control_reader<R>(
    reader: R,
    tx: mpsc::Sender<ControlCommand>,
    stop_on_eof: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    match parse_control_line(&line) {
                        Some(command) => {
                            info!(?command, "Control command received");
                            if tx.send(command).await.is_err() {
                                return;
                            }
                        }
                        None => debug!(line = %line.trim_end(), "Ignoring control input"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Control input unreadable");
                    break;
                }
            }
        }

        if stop_on_eof {
            info!("Control input closed, requesting stop");
            let _ = tx.send(ControlCommand::Stop).await;
        }
    })
}

/// Forward Ctrl-C as a stop request
pub fn spawn_interrupt_listener(tx: mpsc::Sender<ControlCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, requesting stop");
            if tx.send(ControlCommand::Stop).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_parse_control_line() {
        assert_eq!(parse_control_line("stop"), Some(ControlCommand::Stop));
        assert_eq!(parse_control_line("stop\r"), Some(ControlCommand::Stop));
        assert_eq!(parse_control_line("STOP"), None);
        assert_eq!(parse_control_line("stopped"), None);
        assert_eq!(parse_control_line(""), None);
        assert_eq!(parse_control_line("{\"cmd\":\"stop\"}"), None);
    }

    #[test]
    fn test_json_line_sink_writes_one_line_per_event() {
        let mut sink = JsonLineSink::new(Vec::new());
        sink.emit(&RuntimeEvent::started("mic", "", "/tmp/a.ogg"));
        sink.emit(&RuntimeEvent::stopped("/tmp/a.ogg"));

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("{\"type\":\"started\""));
        assert!(lines[1].starts_with("{\"type\":\"stopped\""));
        assert!(output.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_reader_forwards_stop_and_ignores_noise() {
        let (tx, mut rx) = mpsc::channel(4);
        let input: &'static [u8] = b"hello\npause\nstop\n";
        spawn_control_reader(input, tx, false).await.unwrap();

        assert_eq!(rx.recv().await, Some(ControlCommand::Stop));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_reader_handles_unterminated_last_line() {
        let (tx, mut rx) = mpsc::channel(4);
        let input: &'static [u8] = b"noise\nstop";
        spawn_control_reader(input, tx, false).await.unwrap();

        assert_eq!(rx.recv().await, Some(ControlCommand::Stop));
    }

    #[tokio::test]
    async fn test_reader_survives_invalid_utf8() {
        let (tx, mut rx) = mpsc::channel(4);
        let input: &'static [u8] = b"\xff\xfe garbage\nstop\n";
        spawn_control_reader(input, tx, false).await.unwrap();

        assert_eq!(rx.recv().await, Some(ControlCommand::Stop));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_count_as_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_control_reader(reader, tx, true);

        writer.write_all(b"\xff\n").await.unwrap();
        tokio::task::yield_now().await;
        let pending = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(pending.is_err(), "noise must not request a stop");

        drop(writer);
        handle.await.unwrap();
        assert_eq!(rx.recv().await, Some(ControlCommand::Stop));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stop_split_across_reads() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_control_reader(reader, tx, false);

        writer.write_all(b"st").await.unwrap();
        writer.flush().await.unwrap();
        tokio::task::yield_now().await;
        let pending = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(pending.is_err(), "partial line must be buffered");

        writer.write_all(b"op\n").await.unwrap();
        assert_eq!(rx.recv().await, Some(ControlCommand::Stop));

        drop(writer);
        handle.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_eof_requests_stop_when_enabled() {
        let (tx, mut rx) = mpsc::channel(4);
        let input: &'static [u8] = b"";
        spawn_control_reader(input, tx, true).await.unwrap();

        assert_eq!(rx.recv().await, Some(ControlCommand::Stop));
        assert_eq!(rx.recv().await, None);
    }
}
