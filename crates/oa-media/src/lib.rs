//! oa-media: HLS playlist handling for the live stream.
//!
//! The media server that receives the published stream writes a sliding
//! window media playlist (`index.m3u8`). This crate parses that playlist into
//! a [`MediaPlaylist`] so the station can tell when a segment has rolled out
//! of the live window, and can render playlists back out for tests and
//! tooling.

pub mod error;
pub mod hls;

pub use error::{Error, Result};
pub use hls::{MediaPlaylist, PlaylistType, SegmentEntry};
