//! Transcode stage: one external process per run, source bytes in on stdin,
//! station-format audio out on stdout.

use bytes::Bytes;
use futures::StreamExt;
use oa_av::ToolCommand;
use oa_core::StationError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Lines of stderr kept for the failure message.
const STDERR_TAIL_LINES: usize = 5;

/// Spawns the per-run transcode process.
pub trait Transcoder: Send + Sync {
    /// Start a process with piped stdin, stdout and stderr. Dropping the
    /// returned child must kill it.
    fn spawn(&self) -> Result<Child, StationError>;
}

/// A [`Transcoder`] backed by a fixed command line.
#[derive(Debug, Clone)]
pub struct ToolTranscoder {
    command: ToolCommand,
}

impl ToolTranscoder {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    /// The station's ffmpeg transcode for `stream`.
    pub fn ffmpeg(
        tools: &oa_av::ToolRegistry,
        stream: &oa_core::config::StreamConfig,
    ) -> oa_core::Result<Self> {
        oa_av::transcode_command(tools, stream).map(Self::new)
    }
}

impl Transcoder for ToolTranscoder {
    fn spawn(&self) -> Result<Child, StationError> {
        self.command
            .spawn_piped()
            .map_err(|e| StationError::Transcode(e.to_string()))
    }
}

/// Forward transcoder output into the relay buffer until EOF.
pub(crate) async fn pump<R>(stdout: R, relay: &mpsc::Sender<Bytes>) -> Result<u64, StationError>
where
    R: AsyncRead + Unpin,
{
    let mut chunks = ReaderStream::new(stdout);
    let mut produced = 0u64;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| StationError::Transcode(format!("reading output: {e}")))?;
        produced += chunk.len() as u64;
        relay
            .send(chunk)
            .await
            .map_err(|_| StationError::Relay("relay buffer closed".into()))?;
    }

    Ok(produced)
}

/// Read stderr to the end, logging each line and keeping the last few.
pub(crate) async fn drain_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };

    let mut lines = BufReader::new(stderr).lines();
    let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!(target: "onair::transcoder", "{line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line);
    }
    tail.join(" | ")
}
