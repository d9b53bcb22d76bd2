//! The broadcast engine.
//!
//! A [`Station`] owns one stream's lifecycle: `Idle → Live → TearingDown →
//! Idle`. While live it holds the broadcast sink, the persistent publisher
//! reading from it and the queue loop feeding it one clip at a time. The
//! state and the currently playing clip are mutated only through its
//! methods.

pub mod archive;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod resolver;
pub mod sink;

pub use archive::{ArchiveStore, SqliteArchive};
pub use pipeline::{PipelineRun, PipelineStages, RunReport};
pub use publisher::{FfmpegPublisher, Publisher};
pub use queue::QueueLoop;
pub use resolver::{MediaLookup, SongResolver, YtDlpLookup};
pub use sink::{BroadcastSink, SinkControl, SinkFeed, SinkStats};

use std::sync::Arc;

use oa_core::config::Config;
use oa_core::events::{EventBus, EventCategory, EventPayload};
use oa_core::{ResolvedSong, StreamState};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sync::SyncWatcher;
use pipeline::{SourceFetch, Transcoder};

/// External collaborators a station is built from.
pub struct StationDeps {
    pub archive: Arc<dyn ArchiveStore>,
    pub lookup: Arc<dyn MediaLookup>,
    pub source: Arc<dyn SourceFetch>,
    pub transcoder: Arc<dyn Transcoder>,
    pub publisher: Arc<dyn Publisher>,
}

/// Cheaply cloneable handle to one stream.
#[derive(Clone)]
pub struct Station {
    inner: Arc<StationInner>,
}

struct StationInner {
    config: Arc<Config>,
    events: Arc<EventBus>,
    archive: Arc<dyn ArchiveStore>,
    resolver: SongResolver,
    stages: PipelineStages,
    publisher: Arc<dyn Publisher>,
    sync: SyncWatcher,
    control: Mutex<Control>,
    state: watch::Sender<StreamState>,
    now_playing: watch::Sender<Option<ResolvedSong>>,
}

#[derive(Default)]
struct Control {
    generation: u64,
    session: Option<Session>,
}

/// Everything that exists only while live.
struct Session {
    cancel: CancellationToken,
    sink: SinkControl,
    queue: JoinHandle<()>,
    publisher: JoinHandle<()>,
}

impl Station {
    pub fn new(config: Arc<Config>, events: Arc<EventBus>, deps: StationDeps) -> Self {
        let stages = PipelineStages {
            source: deps.source,
            transcoder: deps.transcoder,
            relay_capacity: config.stream.relay_capacity,
            stall_timeout: config.source.stall_timeout(),
        };
        let sync = SyncWatcher::for_stream(&config);
        let (state, _) = watch::channel(StreamState::Idle);
        let (now_playing, _) = watch::channel(None);

        Self {
            inner: Arc::new(StationInner {
                config,
                events,
                archive: deps.archive,
                resolver: SongResolver::new(deps.lookup),
                stages,
                publisher: deps.publisher,
                sync,
                control: Mutex::new(Control::default()),
                state,
                now_playing,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.stream.name
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.inner.state.subscribe()
    }

    /// The clip most recently confirmed on air.
    pub fn currently_playing(&self) -> Option<ResolvedSong> {
        self.inner.now_playing.borrow().clone()
    }

    pub fn subscribe_now_playing(&self) -> watch::Receiver<Option<ResolvedSong>> {
        self.inner.now_playing.subscribe()
    }

    /// Counters for the current sink; all zero while idle.
    pub fn sink_stats(&self) -> SinkStats {
        self.inner
            .control
            .lock()
            .session
            .as_ref()
            .map(|s| s.sink.stats())
            .unwrap_or_default()
    }

    /// Go live. Returns `false`, changing nothing, unless the station is idle.
    pub fn start(&self) -> bool {
        let mut control = self.inner.control.lock();
        let state = self.state();
        if state != StreamState::Idle {
            tracing::warn!(stream = %self.name(), %state, "start ignored, station is not idle");
            return false;
        }

        control.generation += 1;
        let generation = control.generation;
        let cancel = CancellationToken::new();
        let (sink_control, sink, feed) =
            BroadcastSink::open(self.inner.config.stream.sink_capacity);
        self.inner.state.send_replace(StreamState::Live);

        let publisher = tokio::spawn(self.clone().run_publisher(feed, cancel.clone(), generation));
        let queue = tokio::spawn(QueueLoop::new(self.clone(), sink, cancel.clone()).run());

        control.session = Some(Session {
            cancel,
            sink: sink_control,
            queue,
            publisher,
        });
        drop(control);

        tracing::info!(stream = %self.name(), generation, "station live");
        self.emit(
            EventCategory::Admin,
            EventPayload::StreamStarted {
                stream: self.name().to_string(),
            },
        );
        true
    }

    /// Stop the stream and wait until it is idle again.
    ///
    /// Cancels the in-flight run, destroys the sink, stops the publisher and
    /// waits for the queue loop. A no-op while idle; while another teardown
    /// is in progress this waits for it to finish.
    pub async fn teardown(&self) {
        self.teardown_session(None).await;
    }

    async fn teardown_session(&self, only_generation: Option<u64>) {
        let session = {
            let mut control = self.inner.control.lock();
            match self.state() {
                StreamState::Idle => return,
                StreamState::TearingDown => None,
                StreamState::Live => {
                    if only_generation.is_some_and(|g| g != control.generation) {
                        return;
                    }
                    self.inner.state.send_replace(StreamState::TearingDown);
                    Some(control.session.take())
                }
            }
        };

        let Some(session) = session else {
            let mut state = self.subscribe_state();
            let _ = state.wait_for(|s| *s == StreamState::Idle).await;
            return;
        };

        tracing::info!(stream = %self.name(), "tearing down");
        if let Some(session) = session {
            session.cancel.cancel();
            session.sink.destroy();
            for (task, handle) in [("queue", session.queue), ("publisher", session.publisher)] {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        tracing::error!(task, "task panicked during teardown");
                    }
                }
            }
        }

        if self.currently_playing().is_some() {
            self.clear_now_playing();
        }

        {
            let _control = self.inner.control.lock();
            self.inner.state.send_replace(StreamState::Idle);
        }
        tracing::info!(stream = %self.name(), "station idle");
        self.emit(
            EventCategory::Admin,
            EventPayload::StreamStopped {
                stream: self.name().to_string(),
            },
        );
    }

    async fn run_publisher(self, feed: SinkFeed, cancel: CancellationToken, generation: u64) {
        let Err(e) = self.inner.publisher.publish(feed, cancel.clone()).await else {
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        tracing::error!(
            stream = %self.name(),
            operator_attention = true,
            kind = e.kind(),
            "publisher failed, tearing down: {e}"
        );
        self.emit(
            EventCategory::Admin,
            EventPayload::ClipFailed {
                post_id: None,
                kind: e.kind().to_string(),
                error: e.to_string(),
            },
        );

        // Teardown awaits this task, so it has to run elsewhere.
        let station = self.clone();
        tokio::spawn(async move { station.teardown_session(Some(generation)).await });
    }

    /// Publish `song` as now playing. Ignored unless live.
    pub(crate) fn confirm_on_air(&self, song: ResolvedSong) {
        {
            let _control = self.inner.control.lock();
            if self.state() != StreamState::Live {
                return;
            }
            self.inner.now_playing.send_replace(Some(song.clone()));
        }

        tracing::info!(
            stream = %self.name(),
            title = %song.title,
            member = %song.member_posted,
            "now playing"
        );
        self.emit(
            EventCategory::User,
            EventPayload::NowPlaying {
                stream: self.name().to_string(),
                song: Some(song),
            },
        );
    }

    pub(crate) fn clear_now_playing(&self) {
        self.inner.now_playing.send_replace(None);
        self.emit(
            EventCategory::User,
            EventPayload::NowPlaying {
                stream: self.name().to_string(),
                song: None,
            },
        );
    }

    fn emit(&self, category: EventCategory, payload: EventPayload) {
        self.inner.events.broadcast(category, payload);
    }
}
