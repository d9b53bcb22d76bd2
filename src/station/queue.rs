//! The loop that keeps the station fed, one clip at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use oa_core::events::{EventCategory, EventPayload};
use oa_core::{FailureScope, PostId, ResolvedSong, StationError, StreamState};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::pipeline::PipelineRun;
use super::sink::BroadcastSink;
use super::Station;

/// What one pass of the loop ended with.
enum Cycle {
    /// Go straight to the next candidate.
    Next,
    /// The archive had nothing to offer.
    Idle,
    /// A recoverable failure.
    Backoff,
    /// The station is tearing down.
    Stop,
}

/// The on-air watcher that most recently saw its clip relay.
#[derive(Default)]
struct Announcer {
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Announcer {
    /// Make `generation` the current watcher, cancelling the one it
    /// replaces. Returns `false` if a newer clip already relayed.
    fn claim(&mut self, generation: u64, cancel: &CancellationToken) -> bool {
        if generation < self.generation {
            return false;
        }
        if let Some(previous) = self.cancel.replace(cancel.clone()) {
            previous.cancel();
        }
        self.generation = generation;
        true
    }

    fn cancel(&mut self) {
        if let Some(current) = self.cancel.take() {
            current.cancel();
        }
    }
}

/// Selects, resolves and plays candidates until the station leaves
/// [`StreamState::Live`]. Runs never overlap.
pub struct QueueLoop {
    station: Station,
    sink: BroadcastSink,
    cancel: CancellationToken,
    announcer: Arc<Mutex<Announcer>>,
    watches: u64,
}

impl QueueLoop {
    pub(crate) fn new(station: Station, sink: BroadcastSink, cancel: CancellationToken) -> Self {
        Self {
            station,
            sink,
            cancel,
            announcer: Arc::default(),
            watches: 0,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(stream = %self.station.name(), "queue loop started");
        let queue = self.station.config().queue.clone();

        while self.station.state() == StreamState::Live && !self.cancel.is_cancelled() {
            let keep_going = match self.cycle().await {
                Cycle::Next => {
                    tokio::task::yield_now().await;
                    true
                }
                Cycle::Idle => {
                    tracing::debug!("archive has no candidates");
                    self.pause(queue.idle_backoff()).await
                }
                Cycle::Backoff => self.pause(queue.error_backoff()).await,
                Cycle::Stop => false,
            };
            if !keep_going {
                break;
            }
        }

        self.announcer.lock().cancel();
        self.station.clear_now_playing();
        tracing::info!(stream = %self.station.name(), "queue loop stopped");
    }

    async fn cycle(&mut self) -> Cycle {
        let inner = self.station.inner.clone();

        let selected = match self.unless_cancelled(inner.archive.select_random_unplayed()).await {
            Some(selected) => selected,
            None => return Cycle::Stop,
        };
        let candidate = match selected {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return Cycle::Idle,
            Err(e) => return self.rejected(None, StationError::Archive(e.to_string())),
        };

        let resolved = match self.unless_cancelled(inner.resolver.resolve(&candidate)).await {
            Some(resolved) => resolved,
            None => return Cycle::Stop,
        };
        let song = match resolved {
            Ok(Some(song)) => song,
            Ok(None) => {
                let reason = StationError::Validation("unresolvable link".into());
                return self.rejected(Some(candidate.id), reason);
            }
            Err(e) => return self.rejected(Some(candidate.id), e),
        };

        let cap = inner.config.stream.max_clip_bytes;
        if song.exceeds(cap) {
            let reason = StationError::Oversize {
                length: song.length,
                cap,
            };
            return self.rejected(Some(candidate.id), reason);
        }

        let (on_air_tx, on_air_rx) = oneshot::channel();
        self.watch_for_air(song.clone(), on_air_rx);

        let run = PipelineRun::new(
            song.clone(),
            inner.stages.clone(),
            self.sink.clone(),
            self.cancel.child_token(),
        )
        .on_relay_start(on_air_tx);
        let run_id = run.id();

        inner.events.broadcast(
            EventCategory::Admin,
            EventPayload::ClipQueued {
                run_id,
                post_id: song.post_id,
                title: song.title.clone(),
            },
        );

        match run.execute().await {
            Ok(report) => {
                inner.events.broadcast(
                    EventCategory::Admin,
                    EventPayload::ClipCompleted {
                        run_id,
                        post_id: song.post_id,
                        elapsed_secs: report.elapsed.as_secs_f64(),
                    },
                );
                if !candidate.has_been_played {
                    let archive = inner.archive.clone();
                    let id = candidate.id;
                    tokio::spawn(async move {
                        if let Err(e) = archive.mark_played(id).await {
                            tracing::warn!(post_id = %id, "failed to mark post as played: {e}");
                        }
                    });
                }
                Cycle::Next
            }
            Err(e) => self.rejected(Some(song.post_id), e),
        }
    }

    /// Await `fut` unless teardown comes first.
    async fn unless_cancelled<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Announce `song` once its first relayed bytes have reached listeners.
    ///
    /// Watchers are numbered in run order. A watcher takes over when its
    /// run relays, cancelling whichever older watcher was still waiting.
    fn watch_for_air(&mut self, song: ResolvedSong, on_air: oneshot::Receiver<()>) {
        self.watches += 1;
        let generation = self.watches;
        let station = self.station.clone();
        let watcher = self.station.inner.sync.clone();
        let announcer = self.announcer.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            // Dropped unsent: the run ended before relaying anything.
            if on_air.await.is_err() {
                return;
            }
            if !announcer.lock().claim(generation, &cancel) {
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                outcome = watcher.wait_on_air() => {
                    tracing::debug!(title = %song.title, ?outcome, "clip reached listeners");
                    station.confirm_on_air(song);
                }
            }
        });
    }

    /// Route a failure by its scope: skip, back off or stop.
    fn rejected(&self, post_id: Option<PostId>, err: StationError) -> Cycle {
        if err.scope() == FailureScope::Cancelled {
            return Cycle::Stop;
        }
        match post_id {
            Some(post_id) if err.is_skip() => self.skipped(post_id, err),
            _ => self.failed(post_id, err),
        }
    }

    fn skipped(&self, post_id: PostId, reason: StationError) -> Cycle {
        tracing::info!(%post_id, kind = reason.kind(), "skipping candidate: {reason}");
        self.station.inner.events.broadcast(
            EventCategory::Admin,
            EventPayload::ClipSkipped {
                post_id,
                reason: reason.to_string(),
            },
        );
        Cycle::Next
    }

    fn failed(&self, post_id: Option<PostId>, err: StationError) -> Cycle {
        if err.needs_attention() {
            tracing::error!(
                post_id = ?post_id,
                kind = err.kind(),
                operator_attention = true,
                "{err}"
            );
        } else {
            tracing::warn!(post_id = ?post_id, kind = err.kind(), "{err}");
        }
        self.station.inner.events.broadcast(
            EventCategory::Admin,
            EventPayload::ClipFailed {
                post_id,
                kind: err.kind().to_string(),
                error: err.to_string(),
            },
        );
        Cycle::Backoff
    }

    /// Sleep unless torn down first. Returns whether to keep going.
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_watcher_cancels_older() {
        let mut announcer = Announcer::default();
        let first = CancellationToken::new();
        let third = CancellationToken::new();

        assert!(announcer.claim(1, &first));
        assert!(announcer.claim(3, &third));
        assert!(first.is_cancelled());
        assert!(!third.is_cancelled());
    }

    #[test]
    fn late_claim_from_older_run_is_refused() {
        let mut announcer = Announcer::default();
        let newer = CancellationToken::new();
        let older = CancellationToken::new();

        assert!(announcer.claim(2, &newer));
        assert!(!announcer.claim(1, &older));
        assert!(!newer.is_cancelled(), "an older run must not cancel a newer one");
    }

    #[test]
    fn cancel_stops_current_watcher() {
        let mut announcer = Announcer::default();
        let token = CancellationToken::new();
        announcer.claim(1, &token);
        announcer.cancel();
        assert!(token.is_cancelled());
    }
}
