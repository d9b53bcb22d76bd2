//! Error types for oa-media.

use std::io;
use thiserror::Error;

/// Result type for oa-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for oa-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The text is not an HLS playlist.
    #[error("not an HLS playlist: {0}")]
    NotAPlaylist(String),

    /// A tag carried a value that could not be parsed.
    #[error("invalid {tag} on line {line}: {value}")]
    InvalidTag {
        tag: &'static str,
        line: usize,
        value: String,
    },
}

impl Error {
    pub(crate) fn invalid_tag(tag: &'static str, line: usize, value: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag,
            line,
            value: value.into(),
        }
    }
}
