//! HLS media playlist structures.

use std::fmt;

use crate::error::{Error, Result};

/// Media playlist for a single rendition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MediaPlaylist {
    /// `EXT-X-VERSION`, when declared.
    pub version: Option<u32>,
    /// Target duration in seconds.
    pub target_duration: u32,
    /// Sequence number of the first segment, when declared.
    pub media_sequence: Option<u64>,
    /// Playlist type (VOD, EVENT, or a sliding live window).
    pub playlist_type: PlaylistType,
    /// Init segment URI.
    pub init_uri: Option<String>,
    /// Segment entries, oldest first.
    pub segments: Vec<SegmentEntry>,
    /// Whether `EXT-X-ENDLIST` was present.
    pub ended: bool,
}

impl MediaPlaylist {
    /// Parse playlist text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

        match lines.find(|(_, l)| !l.is_empty()) {
            Some((_, "#EXTM3U")) => {}
            Some((_, other)) => return Err(Error::NotAPlaylist(other.chars().take(40).collect())),
            None => return Err(Error::NotAPlaylist("empty input".into())),
        }

        let mut playlist = Self {
            version: None,
            target_duration: 0,
            media_sequence: None,
            playlist_type: PlaylistType::Live,
            init_uri: None,
            segments: Vec::new(),
            ended: false,
        };
        let mut pending = PendingSegment::default();

        for (n, line) in lines {
            if line.is_empty() {
                continue;
            }

            if let Some(value) = line.strip_prefix("#EXTINF:") {
                let (duration, title) = value.split_once(',').unwrap_or((value, ""));
                pending.duration = duration
                    .trim()
                    .parse()
                    .map_err(|_| Error::invalid_tag("EXTINF", n, duration))?;
                pending.title = (!title.trim().is_empty()).then(|| title.trim().to_string());
            } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = parse_target_duration(value)
                    .ok_or_else(|| Error::invalid_tag("EXT-X-TARGETDURATION", n, value))?;
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                let seq = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::invalid_tag("EXT-X-MEDIA-SEQUENCE", n, value))?;
                playlist.media_sequence = Some(seq);
            } else if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
                playlist.version = value.trim().parse().ok();
            } else if let Some(value) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
                playlist.playlist_type = match value.trim() {
                    "VOD" => PlaylistType::Vod,
                    "EVENT" => PlaylistType::Event,
                    other => return Err(Error::invalid_tag("EXT-X-PLAYLIST-TYPE", n, other)),
                };
            } else if let Some(value) = line.strip_prefix("#EXT-X-MAP:") {
                playlist.init_uri = quoted_attribute(value, "URI");
            } else if let Some(value) = line.strip_prefix("#EXT-X-BYTERANGE:") {
                pending.byte_range = Some(
                    parse_byte_range(value)
                        .ok_or_else(|| Error::invalid_tag("EXT-X-BYTERANGE", n, value))?,
                );
            } else if line == "#EXT-X-DISCONTINUITY" {
                pending.discontinuity = true;
            } else if line == "#EXT-X-ENDLIST" {
                playlist.ended = true;
            } else if line.starts_with('#') {
                // Unknown tag or comment.
            } else {
                playlist.segments.push(pending.finish(line));
                pending = PendingSegment::default();
            }
        }

        Ok(playlist)
    }

    /// Absolute sequence number of the segment at `index`, if the playlist
    /// declares `EXT-X-MEDIA-SEQUENCE` and the number fits in a `u64`.
    pub fn sequence_of(&self, index: usize) -> Option<u64> {
        let offset = u64::try_from(index).ok()?;
        self.media_sequence?.checked_add(offset)
    }

    /// Whether any segment in the window has this URI.
    pub fn contains_uri(&self, uri: &str) -> bool {
        self.segments.iter().any(|s| s.uri == uri)
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        if let Some(version) = self.version {
            writeln!(f, "#EXT-X-VERSION:{version}")?;
        }
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        if let Some(seq) = self.media_sequence {
            writeln!(f, "#EXT-X-MEDIA-SEQUENCE:{seq}")?;
        }

        match self.playlist_type {
            PlaylistType::Vod => writeln!(f, "#EXT-X-PLAYLIST-TYPE:VOD")?,
            PlaylistType::Event => writeln!(f, "#EXT-X-PLAYLIST-TYPE:EVENT")?,
            PlaylistType::Live => {}
        }

        if let Some(ref init_uri) = self.init_uri {
            writeln!(f, "#EXT-X-MAP:URI=\"{init_uri}\"")?;
        }

        for segment in &self.segments {
            if segment.discontinuity {
                writeln!(f, "#EXT-X-DISCONTINUITY")?;
            }
            if let Some((offset, length)) = segment.byte_range {
                writeln!(f, "#EXT-X-BYTERANGE:{length}@{offset}")?;
            }
            writeln!(
                f,
                "#EXTINF:{:.3},{}",
                segment.duration,
                segment.title.as_deref().unwrap_or("")
            )?;
            writeln!(f, "{}", segment.uri)?;
        }

        if self.ended {
            writeln!(f, "#EXT-X-ENDLIST")?;
        }

        Ok(())
    }
}

/// Playlist type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum PlaylistType {
    Vod,
    Event,
    /// No `EXT-X-PLAYLIST-TYPE`: a sliding window.
    Live,
}

/// A segment entry in the playlist.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SegmentEntry {
    /// Duration in seconds.
    pub duration: f64,
    /// Segment URI as written in the playlist.
    pub uri: String,
    pub title: Option<String>,
    /// Discontinuity before this segment.
    pub discontinuity: bool,
    /// Byte range (offset, length).
    pub byte_range: Option<(u64, u64)>,
}

#[derive(Default)]
struct PendingSegment {
    duration: f64,
    title: Option<String>,
    discontinuity: bool,
    byte_range: Option<(u64, u64)>,
}

impl PendingSegment {
    fn finish(self, uri: &str) -> SegmentEntry {
        SegmentEntry {
            duration: self.duration,
            uri: uri.to_string(),
            title: self.title,
            discontinuity: self.discontinuity,
            byte_range: self.byte_range,
        }
    }
}

/// Target durations must be integers, but some packagers write decimals.
fn parse_target_duration(value: &str) -> Option<u32> {
    let value = value.trim();
    value
        .parse::<u32>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|d| *d >= 0.0).map(|d| d.ceil() as u32))
}

/// `<length>[@<offset>]`; a missing offset is treated as 0.
fn parse_byte_range(value: &str) -> Option<(u64, u64)> {
    let (length, offset) = match value.trim().split_once('@') {
        Some((l, o)) => (l, Some(o)),
        None => (value.trim(), None),
    };
    let length = length.parse().ok()?;
    let offset = match offset {
        Some(o) => o.parse().ok()?,
        None => 0,
    };
    Some((offset, length))
}

fn quoted_attribute(list: &str, name: &str) -> Option<String> {
    let key = format!("{name}=\"");
    let start = list.find(&key)? + key.len();
    let end = list[start..].find('"')? + start;
    Some(list[start..end].to_string())
}
