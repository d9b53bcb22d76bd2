//! The stream-lifetime encoder that publishes the broadcast feed.

use async_trait::async_trait;
use oa_av::{ToolCommand, ToolRegistry};
use oa_core::config::Config;
use oa_core::StationError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio_util::sync::CancellationToken;

use crate::station::sink::SinkFeed;

/// Consumes the broadcast feed for as long as the station is live.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish until `cancel` fires or the feed ends, both of which are `Ok`.
    /// Any other exit is [`StationError::PersistentEncoder`].
    async fn publish(&self, feed: SinkFeed, cancel: CancellationToken) -> Result<(), StationError>;
}

/// [`Publisher`] that pipes the feed into one long-running process.
#[derive(Debug, Clone)]
pub struct FfmpegPublisher {
    command: ToolCommand,
}

impl FfmpegPublisher {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    /// ffmpeg publishing to the configured stream's URL.
    pub fn for_stream(tools: &ToolRegistry, config: &Config) -> oa_core::Result<Self> {
        oa_av::publish_command(tools, &config.publish_url()).map(Self::new)
    }
}

#[async_trait]
impl Publisher for FfmpegPublisher {
    async fn publish(
        &self,
        mut feed: SinkFeed,
        cancel: CancellationToken,
    ) -> Result<(), StationError> {
        let mut child = self
            .command
            .spawn_piped()
            .map_err(|e| StationError::PersistentEncoder(e.to_string()))?;
        let Some(mut stdin) = child.stdin.take() else {
            return Err(StationError::PersistentEncoder("stdin is not piped".into()));
        };
        let output = tokio::spawn(drain_output(child.stdout.take(), child.stderr.take()));

        tracing::info!(program = %self.command.program_name(), "publisher started");

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                status = child.wait() => {
                    let reason = match status {
                        Ok(status) => format!("exited with {status}"),
                        Err(e) => format!("waiting for exit: {e}"),
                    };
                    break Err(StationError::PersistentEncoder(reason));
                }
                chunk = feed.next_chunk() => {
                    let Some(chunk) = chunk else {
                        break Ok(());
                    };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Ok(()),
                        written = stdin.write_all(&chunk) => {
                            if let Err(e) = written {
                                break Err(StationError::PersistentEncoder(format!(
                                    "stdin closed: {e}"
                                )));
                            }
                        }
                    }
                }
            }
        };

        drop(stdin);
        output.abort();
        match &result {
            Ok(()) => tracing::info!("publisher stopped"),
            Err(e) => tracing::error!("publisher failed: {e}"),
        }
        result
    }
}

async fn drain_output(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
    let discard = async {
        if let Some(mut stdout) = stdout {
            let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
        }
    };
    let log = async {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "onair::publisher", "{line}");
            }
        }
    };
    tokio::join!(discard, log);
}
