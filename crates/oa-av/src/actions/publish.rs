//! The stream-lifetime encoder: reads the broadcast feed on stdin, paced at
//! native rate, and publishes AAC in FLV to the media server.

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Build the ffmpeg invocation that publishes stdin to `target` (an
/// `rtmp://` URL).
pub fn publish_command(tools: &ToolRegistry, target: &str) -> oa_core::Result<ToolCommand> {
    let ffmpeg = tools.require("ffmpeg")?;

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(["-hide_banner", "-loglevel", "warning"]);
    // -re paces reads at native rate, which backpressures every run upstream.
    cmd.args(["-re", "-i", "pipe:0"]);
    cmd.args(["-c:a", "aac", "-ar", "44100"]);
    cmd.args(["-f", "flv"]);
    cmd.arg(target);

    Ok(cmd)
}
