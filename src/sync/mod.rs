//! Now-playing synchronization against the live HLS window.
//!
//! Listeners hear audio one window behind the encoder. When a clip's first
//! bytes reach the broadcast sink, the newest segment in the manifest still
//! holds the previous clip. Once that segment has rolled out of the window,
//! the new clip is what players are fetching, and only then is it announced.

pub mod manifest;

pub use manifest::{has_rolled_off, Baseline, ManifestSnapshot, ManifestSummary};

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use oa_core::config::{Config, SyncConfig};
use tokio::sync::mpsc;

/// Why [`SyncWatcher::wait_on_air`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No manifest (or an empty one) when the relay started.
    ManifestAbsent,
    /// The baseline segment left the window.
    RolledOff,
    /// The manifest disappeared while waiting.
    ManifestRemoved,
    /// Gave up after the configured maximum wait.
    TimedOut,
}

/// Waits for one clip to become audible.
#[derive(Debug, Clone)]
pub struct SyncWatcher {
    manifest_path: PathBuf,
    target_duration_ceiling: u32,
    poll_interval: Duration,
    max_wait: Duration,
}

impl SyncWatcher {
    pub fn new(config: &SyncConfig, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            target_duration_ceiling: config.target_duration_ceiling_secs,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
        }
    }

    /// Watcher for the configured stream's manifest.
    pub fn for_stream(config: &Config) -> Self {
        Self::new(&config.sync, config.manifest_path())
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Resolve once the clip whose relay just started is on air.
    ///
    /// Call this at relay start: the baseline is taken immediately.
    pub async fn wait_on_air(&self) -> SyncOutcome {
        let mut ceiling_warned = false;
        let baseline = match self.read().await {
            Ok(Some(snapshot)) => {
                self.check_target_duration(&snapshot, &mut ceiling_warned);
                match snapshot.baseline() {
                    Some(baseline) => baseline,
                    None => return SyncOutcome::ManifestAbsent,
                }
            }
            Ok(None) => return SyncOutcome::ManifestAbsent,
            Err(e) => {
                tracing::warn!(
                    path = %self.manifest_path.display(),
                    "unreadable manifest, announcing now: {e}"
                );
                return SyncOutcome::ManifestAbsent;
            }
        };
        tracing::debug!(
            uri = %baseline.uri,
            sequence = ?baseline.sequence,
            "waiting for segment to roll off"
        );

        let (tx, mut changes) = mpsc::channel::<()>(16);
        let _watcher = self.arm(tx);

        let deadline = tokio::time::sleep(self.max_wait);
        tokio::pin!(deadline);
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // The first tick completes at once, re-checking right after arming.
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(
                        uri = %baseline.uri,
                        "segment did not roll off within {}s, announcing anyway",
                        self.max_wait.as_secs()
                    );
                    return SyncOutcome::TimedOut;
                }
                _ = tick.tick() => {}
                Some(()) = changes.recv() => {}
            }

            match self.read().await {
                Ok(None) => return SyncOutcome::ManifestRemoved,
                Ok(Some(current)) => {
                    self.check_target_duration(&current, &mut ceiling_warned);
                    if has_rolled_off(&baseline, Some(&current)) {
                        return SyncOutcome::RolledOff;
                    }
                }
                // Usually a half-written file; the next change or tick re-reads it.
                Err(e) => tracing::trace!("manifest re-read failed: {e}"),
            }
        }
    }

    async fn read(&self) -> oa_media::Result<Option<ManifestSnapshot>> {
        ManifestSnapshot::load(&self.manifest_path).await
    }

    /// Warn once per wait about a target duration above the ceiling.
    fn check_target_duration(&self, snapshot: &ManifestSnapshot, warned: &mut bool) {
        if !*warned && snapshot.target_duration() > self.target_duration_ceiling {
            *warned = true;
            tracing::warn!(
                target_duration = snapshot.target_duration(),
                ceiling = self.target_duration_ceiling,
                "manifest target duration above ceiling, now-playing will lag"
            );
        }
    }

    /// Watch the manifest's directory. Polling still works without it.
    fn arm(&self, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
        let dir = self.manifest_path.parent()?;

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if res.is_ok() {
                    let _ = tx.try_send(());
                }
            },
            NotifyConfig::default(),
        );

        match watcher {
            Ok(mut watcher) => match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => Some(watcher),
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), "cannot watch manifest directory: {e}");
                    None
                }
            },
            Err(e) => {
                tracing::debug!("file watcher unavailable: {e}");
                None
            }
        }
    }
}
