//! # oa-av
//!
//! External audio tooling for the onair station.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and yt-dlp.
//! - **Command execution** ([`ToolCommand`]) -- async builder that either runs
//!   a process to completion with a timeout or spawns it with piped stdio for
//!   streaming use.
//! - **Action builders** ([`actions`]) -- the per-clip transcode command, the
//!   persistent publish command, and remote media lookup via yt-dlp.

pub mod actions;
pub mod command;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};

pub use actions::{lookup_media, parse_ytdlp_json, publish_command, transcode_command};
