//! Per-clip transcode: whatever the source encoding is in, re-encode it to
//! the station's fixed bitrate and container on stdout.

use oa_core::config::StreamConfig;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Build the ffmpeg invocation that reads a clip on stdin and writes the
/// re-encoded audio to stdout.
pub fn transcode_command(
    tools: &ToolRegistry,
    stream: &StreamConfig,
) -> oa_core::Result<ToolCommand> {
    let ffmpeg = tools.require("ffmpeg")?;

    let codec = match stream.format.as_str() {
        "adts" => "aac",
        "ogg" => "libvorbis",
        _ => "libmp3lame",
    };

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(["-hide_banner", "-loglevel", "error"]);
    cmd.args(["-i", "pipe:0"]);
    cmd.arg("-vn");
    cmd.args(["-c:a", codec]);
    cmd.arg("-b:a").arg(format!("{}k", stream.bitrate_kbps));
    cmd.arg("-f").arg(stream.format.as_str());
    cmd.arg("pipe:1");

    Ok(cmd)
}
