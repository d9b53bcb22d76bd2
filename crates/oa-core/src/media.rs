//! Media-domain types shared between the archive, the resolver and the
//! broadcast engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PostId;

/// Lifecycle state of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Live,
    TearingDown,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Live => "live",
            StreamState::TearingDown => "tearing_down",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Archive side
// ---------------------------------------------------------------------------

/// A post from the archive that may point at a playable song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongCandidate {
    pub id: PostId,
    /// Raw link as posted; may be missing or garbage.
    pub link: Option<String>,
    /// Where the link points (e.g. "youtube").
    pub link_source: String,
    /// Member who posted it.
    pub user_name: String,
    pub text: Option<String>,
    pub date_posted: DateTime<Utc>,
    pub has_been_played: bool,
}

// ---------------------------------------------------------------------------
// Remote side
// ---------------------------------------------------------------------------

/// One downloadable rendition reported by the remote media service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub id: String,
    /// Direct URL to the bytes.
    pub url: String,
    /// Audio codec, `None` when the rendition has no audio.
    pub acodec: Option<String>,
    /// Video codec, `None` when the rendition has no video.
    pub vcodec: Option<String>,
    /// Average audio bitrate in kbit/s.
    pub abr: Option<f64>,
    /// Declared size in bytes.
    pub content_length: Option<u64>,
}

impl Encoding {
    /// True when the rendition carries audio and nothing else.
    pub fn is_audio_only(&self) -> bool {
        self.acodec.is_some() && self.vcodec.is_none()
    }
}

/// Metadata for a remote media page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub title: String,
    /// Canonical page URL.
    pub page_url: String,
    pub duration_secs: Option<f64>,
    pub channel: Option<String>,
    pub encodings: Vec<Encoding>,
}

impl RemoteMedia {
    /// Pick the audio-only encoding with the highest bitrate, breaking ties
    /// on declared size.
    pub fn best_audio_encoding(&self) -> Option<&Encoding> {
        self.encodings
            .iter()
            .filter(|e| e.is_audio_only())
            .max_by(|a, b| {
                let abr_a = a.abr.unwrap_or(0.0);
                let abr_b = b.abr.unwrap_or(0.0);
                abr_a
                    .total_cmp(&abr_b)
                    .then(a.content_length.unwrap_or(0).cmp(&b.content_length.unwrap_or(0)))
            })
    }
}

// ---------------------------------------------------------------------------
// ResolvedSong
// ---------------------------------------------------------------------------

/// Fully resolved, playable metadata for one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSong {
    pub post_id: PostId,
    pub title: String,
    /// The page the member linked to.
    pub source_url: String,
    /// Direct URL of the chosen encoding.
    pub stream_url: String,
    pub encoding_id: String,
    /// Byte length of the chosen encoding; 0 when the service did not say.
    pub length: u64,
    pub duration_secs: Option<f64>,
    pub channel: Option<String>,
    pub member_posted: String,
    pub post_text: Option<String>,
    pub date_posted: DateTime<Utc>,
    pub has_been_played: bool,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedSong {
    /// Combine remote metadata with the archive post it came from.
    pub fn from_parts(candidate: &SongCandidate, media: &RemoteMedia, encoding: &Encoding) -> Self {
        Self {
            post_id: candidate.id,
            title: media.title.clone(),
            source_url: media.page_url.clone(),
            stream_url: encoding.url.clone(),
            encoding_id: encoding.id.clone(),
            length: encoding.content_length.unwrap_or(0),
            duration_secs: media.duration_secs,
            channel: media.channel.clone(),
            member_posted: candidate.user_name.clone(),
            post_text: candidate.text.clone(),
            date_posted: candidate.date_posted,
            has_been_played: candidate.has_been_played,
            resolved_at: Utc::now(),
        }
    }

    /// Whether the clip exceeds `cap` bytes.
    pub fn exceeds(&self, cap: u64) -> bool {
        self.length > cap
    }
}
