//! Station actions built on external tools: per-clip transcode, the
//! persistent publish encoder, and remote media lookup.

mod publish;
mod resolve;
mod transcode;

pub use publish::publish_command;
pub use resolve::{lookup_media, parse_ytdlp_json};
pub use transcode::transcode_command;
