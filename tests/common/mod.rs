//! Shared test harness for integration tests.
//!
//! Provides in-process fakes for every station collaborator and
//! [`TestStation`], which wires them into a [`Station`] whose manifest lives
//! in a temporary directory. Transcoding uses real processes (`cat`, `sh`).
#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use oa_av::ToolCommand;
use oa_core::config::Config;
use oa_core::events::{Event, EventBus};
use oa_core::{Encoding, PostId, RemoteMedia, ResolvedSong, SongCandidate, StationError};
use onair::server::{build_router, AppContext};
use onair::station::pipeline::{ByteStream, SourceFetch, ToolTranscoder, Transcoder};
use onair::station::{ArchiveStore, MediaLookup, Publisher, SinkFeed, Station, StationDeps};

pub const LINK: &str = "https://www.youtube.com/watch?v=onair";

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Hands out queued candidates once each, then nothing.
#[derive(Default)]
pub struct FakeArchive {
    queue: Mutex<VecDeque<SongCandidate>>,
    pub marked: Mutex<Vec<PostId>>,
}

impl FakeArchive {
    pub fn with(candidates: Vec<SongCandidate>) -> Self {
        Self {
            queue: Mutex::new(candidates.into()),
            marked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArchiveStore for FakeArchive {
    async fn select_random_unplayed(&self) -> oa_core::Result<Option<SongCandidate>> {
        Ok(self.queue.lock().pop_front())
    }

    async fn mark_played(&self, id: PostId) -> oa_core::Result<()> {
        self.marked.lock().push(id);
        Ok(())
    }
}

pub fn candidate(link: &str) -> SongCandidate {
    SongCandidate {
        id: PostId::new(),
        link: Some(link.to_string()),
        link_source: "youtube".into(),
        user_name: "night_owl".into(),
        text: Some("play this loud".into()),
        date_posted: Utc::now(),
        has_been_played: false,
    }
}

// ---------------------------------------------------------------------------
// Remote lookup
// ---------------------------------------------------------------------------

/// Answers every lookup with one audio-only encoding of `length` bytes,
/// optionally after a delay.
pub struct FakeLookup {
    pub length: u64,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeLookup {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaLookup for FakeLookup {
    async fn lookup(&self, link: &reqwest::Url) -> oa_core::Result<RemoteMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(RemoteMedia {
            title: "Xtal".into(),
            page_url: link.to_string(),
            duration_secs: Some(294.0),
            channel: Some("Aphex Twin".into()),
            encodings: vec![
                Encoding {
                    id: "18".into(),
                    url: "https://cdn.example/video".into(),
                    acodec: Some("mp4a".into()),
                    vcodec: Some("avc1".into()),
                    abr: Some(96.0),
                    content_length: Some(self.length * 4),
                },
                Encoding {
                    id: "251".into(),
                    url: "https://cdn.example/audio".into(),
                    acodec: Some("opus".into()),
                    vcodec: None,
                    abr: Some(160.0),
                    content_length: Some(self.length),
                },
            ],
        })
    }
}

pub fn resolved_song() -> ResolvedSong {
    let candidate = candidate(LINK);
    let media = RemoteMedia {
        title: "Xtal".into(),
        page_url: LINK.into(),
        duration_secs: Some(294.0),
        channel: None,
        encodings: vec![],
    };
    let encoding = Encoding {
        id: "251".into(),
        url: "https://cdn.example/audio".into(),
        acodec: Some("opus".into()),
        vcodec: None,
        abr: Some(160.0),
        content_length: Some(11),
    };
    ResolvedSong::from_parts(&candidate, &media, &encoding)
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Serves fixed chunks, then optionally hangs instead of ending.
pub struct StaticSource {
    chunks: Vec<&'static str>,
    hang: bool,
}

impl StaticSource {
    pub fn new(chunks: Vec<&'static str>) -> Self {
        Self { chunks, hang: false }
    }

    /// Serve the chunks and then never finish.
    pub fn hanging(chunks: Vec<&'static str>) -> Self {
        Self { chunks, hang: true }
    }
}

#[async_trait]
impl SourceFetch for StaticSource {
    async fn open(&self, _song: &ResolvedSong) -> Result<ByteStream, StationError> {
        let chunks: Vec<Result<Bytes, StationError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        let stream = futures::stream::iter(chunks);
        if self.hang {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

/// What one [`ScriptedSource::open`] call does.
pub enum Opening {
    /// Serve the chunks and end.
    Chunks(Vec<&'static str>),
    /// Serve the chunks and never end.
    Hanging(Vec<&'static str>),
    /// Fail before any byte arrives.
    Refused,
}

/// Plays one [`Opening`] per call, in order; refuses once exhausted.
pub struct ScriptedSource {
    openings: Mutex<VecDeque<Opening>>,
}

impl ScriptedSource {
    pub fn new(openings: Vec<Opening>) -> Self {
        Self {
            openings: Mutex::new(openings.into()),
        }
    }
}

#[async_trait]
impl SourceFetch for ScriptedSource {
    async fn open(&self, song: &ResolvedSong) -> Result<ByteStream, StationError> {
        let opening = self.openings.lock().pop_front().unwrap_or(Opening::Refused);
        match opening {
            Opening::Chunks(chunks) => StaticSource::new(chunks).open(song).await,
            Opening::Hanging(chunks) => StaticSource::hanging(chunks).open(song).await,
            Opening::Refused => Err(StationError::RemoteFetch("403 Forbidden".into())),
        }
    }
}

/// Fails partway through the stream.
pub struct BrokenSource;

#[async_trait]
impl SourceFetch for BrokenSource {
    async fn open(&self, _song: &ResolvedSong) -> Result<ByteStream, StationError> {
        Ok(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StationError::RemoteFetch("connection reset".into())),
        ])
        .boxed())
    }
}

// ---------------------------------------------------------------------------
// Transcoder
// ---------------------------------------------------------------------------

/// Wraps a shell command and counts spawns.
pub struct CountingTranscoder {
    inner: ToolTranscoder,
    pub spawns: AtomicUsize,
}

impl CountingTranscoder {
    pub fn shell(script: &str) -> Self {
        let mut cmd = ToolCommand::new(PathBuf::from("sh"));
        cmd.args(["-c", script]);
        Self {
            inner: ToolTranscoder::new(cmd),
            spawns: AtomicUsize::new(0),
        }
    }

    /// Passes audio through unchanged.
    pub fn passthrough() -> Self {
        Self::shell("exec cat")
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

impl Transcoder for CountingTranscoder {
    fn spawn(&self) -> Result<Child, StationError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.inner.spawn()
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Drains the feed into memory, or fails after a delay.
#[derive(Default)]
pub struct FakePublisher {
    pub received: Mutex<Vec<u8>>,
    pub sessions: AtomicUsize,
    fail_after: Option<Duration>,
}

impl FakePublisher {
    pub fn failing_after(delay: Duration) -> Self {
        Self {
            fail_after: Some(delay),
            ..Self::default()
        }
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        mut feed: SinkFeed,
        cancel: CancellationToken,
    ) -> Result<(), StationError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.fail_after {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {
                    return Err(StationError::PersistentEncoder("rtmp connection refused".into()));
                }
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = feed.next_chunk() => match chunk {
                    Some(chunk) => self.received.lock().extend_from_slice(&chunk),
                    None => return Ok(()),
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Station harness
// ---------------------------------------------------------------------------

/// Config pointing at `hls_root` with short waits.
pub fn test_config(hls_root: &Path) -> Config {
    let mut config = Config::default();
    config.stream.hls_root = hls_root.to_path_buf();
    config.queue.idle_backoff_secs = 1;
    config.queue.error_backoff_ms = 10;
    config.sync.poll_interval_ms = 20;
    config.sync.max_wait_secs = 5;
    config.source.stall_timeout_secs = 5;
    config
}

/// A [`Station`] wired to fakes.
pub struct TestStation {
    pub station: Station,
    pub events: Arc<EventBus>,
    pub archive: Arc<FakeArchive>,
    pub lookup: Arc<FakeLookup>,
    pub transcoder: Arc<CountingTranscoder>,
    pub publisher: Arc<FakePublisher>,
    pub config: Arc<Config>,
    _dir: tempfile::TempDir,
}

pub struct TestStationBuilder {
    candidates: Vec<SongCandidate>,
    length: u64,
    lookup_delay: Duration,
    source: Arc<dyn SourceFetch>,
    transcoder: CountingTranscoder,
    publisher: FakePublisher,
}

impl TestStation {
    pub fn builder() -> TestStationBuilder {
        TestStationBuilder {
            candidates: Vec::new(),
            length: 11,
            lookup_delay: Duration::ZERO,
            source: Arc::new(StaticSource::new(vec!["hello ", "world"])),
            transcoder: CountingTranscoder::passthrough(),
            publisher: FakePublisher::default(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.manifest_path()
    }

    pub fn context(&self) -> AppContext {
        AppContext {
            station: self.station.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }

    /// Start Axum on a random port.
    pub async fn serve(&self) -> SocketAddr {
        let app = build_router(self.context());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        addr
    }

    /// Recent events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        let mut events = self.events.recent_events(100);
        events.reverse();
        events
    }

    /// Recent events whose serialized `type` is `kind`.
    pub fn events_of(&self, kind: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter_map(|e| serde_json::to_value(&e.payload).ok())
            .filter(|v| v["type"] == kind)
            .collect()
    }
}

impl TestStationBuilder {
    pub fn candidates(mut self, candidates: Vec<SongCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Declared byte length of the resolved encoding.
    pub fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    /// How long each remote lookup takes.
    pub fn lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn source(mut self, source: impl SourceFetch + 'static) -> Self {
        self.source = Arc::new(source);
        self
    }

    pub fn transcoder(mut self, transcoder: CountingTranscoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn publisher(mut self, publisher: FakePublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn build(self) -> TestStation {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let config = Arc::new(test_config(dir.path()));
        let events = Arc::new(EventBus::default());
        let archive = Arc::new(FakeArchive::with(self.candidates));
        let lookup = Arc::new(FakeLookup {
            delay: self.lookup_delay,
            ..FakeLookup::new(self.length)
        });
        let transcoder = Arc::new(self.transcoder);
        let publisher = Arc::new(self.publisher);

        let station = Station::new(
            config.clone(),
            events.clone(),
            StationDeps {
                archive: archive.clone(),
                lookup: lookup.clone(),
                source: self.source,
                transcoder: transcoder.clone(),
                publisher: publisher.clone(),
            },
        );

        TestStation {
            station,
            events,
            archive,
            lookup,
            transcoder,
            publisher,
            config,
            _dir: dir,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Poll `check` until it holds, panicking after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await `fut`, panicking after `timeout`.
pub async fn within<T>(timeout: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| panic!("future did not finish within {timeout:?}"))
}

/// Write `body` to `path` atomically.
pub fn write_manifest(path: &Path, body: &str) {
    let dir = path.parent().expect("manifest has a parent");
    std::fs::create_dir_all(dir).unwrap();
    let tmp = dir.join(".index.m3u8.tmp");
    std::fs::write(&tmp, body).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

/// A live window of `uris`, optionally with a media sequence.
pub fn manifest(sequence: Option<u64>, uris: &[&str]) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n");
    if let Some(seq) = sequence {
        text.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{seq}\n"));
    }
    for uri in uris {
        text.push_str(&format!("#EXTINF:2.000,\n{uri}\n"));
    }
    text
}

/// Drain whatever is already buffered in `feed`.
pub async fn drain_feed(feed: &mut SinkFeed) -> Vec<u8> {
    let mut out = Vec::new();
    while let Ok(Some(chunk)) =
        tokio::time::timeout(Duration::from_millis(100), feed.next_chunk()).await
    {
        out.extend_from_slice(&chunk);
    }
    out
}
