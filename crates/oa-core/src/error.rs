//! Error types for the onair workspace.
//!
//! Two families live here. [`Error`] covers infrastructure failures (database,
//! I/O, external tools, remote services) and maps onto HTTP status codes via
//! [`Error::http_status`]. [`StationError`] is the tagged union the broadcast
//! engine uses to tell per-candidate skips, per-run failures, stream-fatal
//! failures and cancellation apart, see [`StationError::scope`].

use std::fmt;

/// Unified infrastructure error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "post").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request or input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation conflicts with the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, yt-dlp) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A remote service answered with something unusable.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Remote(_) => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// StationError
// ---------------------------------------------------------------------------

/// How far a [`StationError`] reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Only the current candidate is affected; the queue moves on.
    Candidate,
    /// The current pipeline run is rejected; the queue moves on.
    Run,
    /// The whole stream must be torn down.
    Stream,
    /// Not a fault: the station is tearing down.
    Cancelled,
}

/// Failures raised by the broadcast engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StationError {
    /// The candidate cannot be played (bad link, no audio-only encoding).
    #[error("unplayable candidate: {0}")]
    Validation(String),

    /// The resolved clip is larger than the configured cap.
    #[error("clip is {length} bytes, cap is {cap}")]
    Oversize {
        /// Declared byte length of the chosen encoding.
        length: u64,
        /// Configured maximum.
        cap: u64,
    },

    /// Remote metadata lookup failed.
    #[error("resolve failed: {0}")]
    Resolve(String),

    /// The archive could not produce a candidate.
    #[error("archive error: {0}")]
    Archive(String),

    /// Downloading the source bytes failed or stalled.
    #[error("source fetch failed: {0}")]
    RemoteFetch(String),

    /// The per-clip transcode process failed.
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// The relay could not deliver into the broadcast sink.
    #[error("relay failed: {0}")]
    Relay(String),

    /// The relay finished before both upstream stages had.
    #[error("relay finished early (source done: {source_done}, transcode done: {transcode_done})")]
    OrderingViolation {
        /// Whether the source stage had reported completion.
        source_done: bool,
        /// Whether the transcode stage had reported completion.
        transcode_done: bool,
    },

    /// The station is tearing down.
    #[error("stream torn down")]
    Teardown,

    /// The stream-lifetime encoder failed.
    #[error("persistent encoder failed: {0}")]
    PersistentEncoder(String),
}

impl StationError {
    /// Which part of the station this failure affects.
    pub fn scope(&self) -> FailureScope {
        match self {
            StationError::Validation(_)
            | StationError::Oversize { .. }
            | StationError::Resolve(_)
            | StationError::Archive(_) => FailureScope::Candidate,
            StationError::RemoteFetch(_)
            | StationError::Transcode(_)
            | StationError::Relay(_)
            | StationError::OrderingViolation { .. } => FailureScope::Run,
            StationError::PersistentEncoder(_) => FailureScope::Stream,
            StationError::Teardown => FailureScope::Cancelled,
        }
    }

    /// Stable snake_case name, used in events and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StationError::Validation(_) => "validation",
            StationError::Oversize { .. } => "oversize",
            StationError::Resolve(_) => "resolve",
            StationError::Archive(_) => "archive",
            StationError::RemoteFetch(_) => "remote_fetch",
            StationError::Transcode(_) => "transcode",
            StationError::Relay(_) => "relay",
            StationError::OrderingViolation { .. } => "ordering_violation",
            StationError::Teardown => "teardown",
            StationError::PersistentEncoder(_) => "persistent_encoder",
        }
    }

    /// Whether the queue skips straight to the next candidate without backing off.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            StationError::Validation(_) | StationError::Oversize { .. }
        )
    }

    /// Failures an operator should look at even though the station recovers.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            StationError::OrderingViolation { .. } | StationError::PersistentEncoder(_)
        )
    }
}
