//! Point-in-time reads of the live HLS manifest.

use std::path::Path;

use oa_media::MediaPlaylist;
use serde::Serialize;

/// The manifest as read at one moment.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSnapshot {
    playlist: MediaPlaylist,
}

/// The newest segment at the moment a clip's relay started. The clip is on
/// air once this segment has left the live window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    /// Absolute media sequence number, when the manifest declares one.
    pub sequence: Option<u64>,
    pub uri: String,
}

/// Printable overview of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    pub target_duration: u32,
    pub media_sequence: Option<u64>,
    pub segments: usize,
    pub window_secs: f64,
    pub first_uri: Option<String>,
    pub last_uri: Option<String>,
    pub ended: bool,
}

impl ManifestSnapshot {
    pub fn new(playlist: MediaPlaylist) -> Self {
        Self { playlist }
    }

    pub fn parse(text: &str) -> oa_media::Result<Self> {
        MediaPlaylist::parse(text).map(Self::new)
    }

    /// Read `path`; a missing file is `Ok(None)`.
    pub async fn load(path: &Path) -> oa_media::Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn playlist(&self) -> &MediaPlaylist {
        &self.playlist
    }

    pub fn target_duration(&self) -> u32 {
        self.playlist.target_duration
    }

    /// The newest segment, or `None` for an empty window.
    pub fn baseline(&self) -> Option<Baseline> {
        let last = self.playlist.segments.len().checked_sub(1)?;
        Some(Baseline {
            sequence: self.playlist.sequence_of(last),
            uri: self.playlist.segments[last].uri.clone(),
        })
    }

    pub fn summary(&self) -> ManifestSummary {
        let segments = &self.playlist.segments;
        ManifestSummary {
            target_duration: self.playlist.target_duration,
            media_sequence: self.playlist.media_sequence,
            segments: segments.len(),
            window_secs: segments.iter().map(|s| s.duration).sum(),
            first_uri: segments.first().map(|s| s.uri.clone()),
            last_uri: segments.last().map(|s| s.uri.clone()),
            ended: self.playlist.ended,
        }
    }
}

/// Whether `baseline` is gone from `current`.
///
/// A missing manifest counts as rolled off. When both reads carry sequence
/// numbers the comparison is numeric, otherwise by URI membership.
pub fn has_rolled_off(baseline: &Baseline, current: Option<&ManifestSnapshot>) -> bool {
    let Some(current) = current else {
        return true;
    };

    match (baseline.sequence, current.playlist.media_sequence) {
        (Some(seq), Some(first)) => first > seq,
        _ => !current.playlist.contains_uri(&baseline.uri),
    }
}
