//! HLS media playlists.
//!
//! Only media playlists are modelled; the live stream never publishes a
//! master playlist.

mod playlist;

pub use playlist::{MediaPlaylist, PlaylistType, SegmentEntry};
