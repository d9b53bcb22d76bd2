//! One execution of fetch → transcode → relay for a single clip.
//!
//! Each stage runs as its own task and reports through a oneshot channel.
//! The run joins those reports through a [`CompletionTracker`] and resolves
//! exactly once: with a [`RunReport`] when all three stages finished in a
//! legal order, or with the first [`StationError`] otherwise. Whatever the
//! outcome, the stage tasks are aborted and awaited before `execute`
//! returns, which drops the source stream, the relay buffer and the
//! transcoder process (killed on drop).
//!
//! Completion is causal in a healthy run. The source reports before it
//! closes the transcoder's stdin; the transcoder reports after a clean exit
//! and before it closes the relay's input; the relay reports when its input
//! closes. A relay report that arrives first therefore means a stage died
//! without reporting.

mod relay;
mod source;
mod tracker;
mod transcode;

pub use source::{ByteStream, HttpSource, SourceFetch};
pub use tracker::{CompletionTracker, Stage};
pub use transcode::{ToolTranscoder, Transcoder};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use oa_core::{ResolvedSong, RunId, StationError};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::station::sink::BroadcastSink;

type StageResult = Result<u64, StationError>;

/// The pluggable parts of a run.
#[derive(Clone)]
pub struct PipelineStages {
    pub source: Arc<dyn SourceFetch>,
    pub transcoder: Arc<dyn Transcoder>,
    /// Chunks buffered between transcoder output and the sink.
    pub relay_capacity: usize,
    pub stall_timeout: Duration,
}

/// What a successful run moved.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub bytes_fetched: u64,
    pub bytes_transcoded: u64,
    pub bytes_relayed: u64,
    pub elapsed: Duration,
}

/// A single clip's trip through the pipeline.
pub struct PipelineRun {
    id: RunId,
    song: ResolvedSong,
    stages: PipelineStages,
    sink: BroadcastSink,
    cancel: CancellationToken,
    on_relay_start: Option<oneshot::Sender<()>>,
}

impl PipelineRun {
    pub fn new(
        song: ResolvedSong,
        stages: PipelineStages,
        sink: BroadcastSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: RunId::new(),
            song,
            stages,
            sink,
            cancel,
            on_relay_start: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    /// Fire `tx` once the sink has accepted the run's first chunk.
    pub fn on_relay_start(mut self, tx: oneshot::Sender<()>) -> Self {
        self.on_relay_start = Some(tx);
        self
    }

    /// Drive the run to resolution.
    pub async fn execute(self) -> Result<RunReport, StationError> {
        let started = Instant::now();
        let run_id = self.id;
        let cancel = self.cancel.clone();

        tracing::info!(
            %run_id,
            title = %self.song.title,
            length = self.song.length,
            "starting run"
        );

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StationError::Teardown),
            opened = self.stages.source.open(&self.song) => opened?,
        };

        let mut child = self.stages.transcoder.spawn()?;
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(StationError::Transcode("transcoder stdio is not piped".into()));
        };
        let stderr = child.stderr.take();

        let (relay_tx, relay_rx) = mpsc::channel::<Bytes>(self.stages.relay_capacity.max(1));
        let (source_tx, mut source_rx) = oneshot::channel::<StageResult>();
        let (transcode_tx, mut transcode_rx) = oneshot::channel::<StageResult>();
        let (relay_done_tx, mut relay_rx_done) = oneshot::channel::<StageResult>();

        let mut tasks = StageTasks::default();

        let stall = self.stages.stall_timeout;
        tasks.spawn(async move {
            let result = source::pump(stream, &mut stdin, stall).await;
            let _ = source_tx.send(result);
            drop(stdin);
        });

        tasks.spawn(async move {
            let (pumped, stderr_tail) = tokio::join!(
                transcode::pump(stdout, &relay_tx),
                transcode::drain_stderr(stderr),
            );
            let result = match pumped {
                Ok(produced) => match child.wait().await {
                    Ok(status) if status.success() => Ok(produced),
                    Ok(status) => Err(StationError::Transcode(format!(
                        "exited with {status}: {stderr_tail}"
                    ))),
                    Err(e) => Err(StationError::Transcode(format!("waiting for exit: {e}"))),
                },
                Err(e) => Err(e),
            };
            let _ = transcode_tx.send(result);
            drop(relay_tx);
        });

        let sink = self.sink.clone();
        let on_relay_start = self.on_relay_start;
        tasks.spawn(async move {
            let result = relay::pump(relay_rx, &sink, on_relay_start).await;
            let _ = relay_done_tx.send(result);
        });

        let mut tracker = CompletionTracker::new();
        let mut report = RunReport {
            run_id,
            bytes_fetched: 0,
            bytes_transcoded: 0,
            bytes_relayed: 0,
            elapsed: Duration::ZERO,
        };

        let outcome: Result<(), StationError> = async {
            while !tracker.is_complete() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StationError::Teardown),
                    r = &mut source_rx, if !tracker.is_done(Stage::Source) => {
                        report.bytes_fetched = settle(Stage::Source, r)?;
                        tracker.record(Stage::Source)?;
                    }
                    r = &mut transcode_rx, if !tracker.is_done(Stage::Transcode) => {
                        report.bytes_transcoded = settle(Stage::Transcode, r)?;
                        tracker.record(Stage::Transcode)?;
                    }
                    r = &mut relay_rx_done, if !tracker.is_done(Stage::Relay) => {
                        report.bytes_relayed = settle(Stage::Relay, r)?;
                        tracker.record(Stage::Relay)?;
                    }
                }
            }
            Ok(())
        }
        .await;

        tasks.shutdown().await;
        report.elapsed = started.elapsed();

        match outcome {
            Ok(()) => {
                tracing::info!(
                    %run_id,
                    title = %self.song.title,
                    bytes = report.bytes_relayed,
                    "run completed in {:.1} minutes",
                    report.elapsed.as_secs_f64() / 60.0
                );
                Ok(report)
            }
            Err(e) => {
                tracing::debug!(%run_id, kind = e.kind(), "run rejected: {e}");
                Err(e)
            }
        }
    }
}

/// Unwrap one stage's report. A stage whose task ended without reporting
/// fails with that stage's own error kind.
fn settle(stage: Stage, received: Result<StageResult, oneshot::error::RecvError>) -> StageResult {
    received.unwrap_or_else(|_| {
        let msg = "stage ended without reporting".to_string();
        Err(match stage {
            Stage::Source => StationError::RemoteFetch(msg),
            Stage::Transcode => StationError::Transcode(msg),
            Stage::Relay => StationError::Relay(msg),
        })
    })
}

/// Stage task handles; aborted when dropped.
#[derive(Default)]
struct StageTasks(Vec<JoinHandle<()>>);

impl StageTasks {
    fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.0.push(tokio::spawn(fut));
    }

    /// Abort every stage and wait until each has released its resources.
    async fn shutdown(mut self) {
        for handle in &self.0 {
            handle.abort();
        }
        for handle in self.0.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Drop for StageTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}
