//! Remote media lookup through `yt-dlp -J`.

use oa_core::{Encoding, RemoteMedia};
use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Subset of the yt-dlp info JSON the station reads.
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    channel: Option<String>,
    uploader: Option<String>,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    url: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

/// yt-dlp writes the string "none" for an absent codec.
fn codec(value: Option<String>) -> Option<String> {
    value.filter(|c| !c.is_empty() && c != "none")
}

/// Parse `yt-dlp -J` output into [`RemoteMedia`].
///
/// Formats without a direct URL are dropped.
pub fn parse_ytdlp_json(json: &str) -> oa_core::Result<RemoteMedia> {
    let info: InfoJson = serde_json::from_str(json)
        .map_err(|e| oa_core::Error::Remote(format!("unreadable yt-dlp output: {e}")))?;

    let encodings = info
        .formats
        .into_iter()
        .filter_map(|f| {
            Some(Encoding {
                id: f.format_id,
                url: f.url?,
                acodec: codec(f.acodec),
                vcodec: codec(f.vcodec),
                abr: f.abr,
                content_length: f.filesize.or(f.filesize_approx),
            })
        })
        .collect();

    Ok(RemoteMedia {
        title: info.title.unwrap_or_else(|| "Untitled".into()),
        page_url: info.webpage_url.unwrap_or_default(),
        duration_secs: info.duration,
        channel: info.channel.or(info.uploader),
        encodings,
    })
}

/// Look up metadata and encodings for `link`.
pub async fn lookup_media(tools: &ToolRegistry, link: &str) -> oa_core::Result<RemoteMedia> {
    let ytdlp = tools.require("yt-dlp")?;

    let mut cmd = ToolCommand::new(ytdlp.path.clone());
    cmd.args(["-J", "--no-playlist", "--no-warnings"]);
    cmd.arg(link);

    tracing::debug!("yt-dlp lookup for {link}");
    let output = cmd.execute().await?;

    let mut media = parse_ytdlp_json(&output.stdout)?;
    if media.page_url.is_empty() {
        media.page_url = link.to_string();
    }
    Ok(media)
}
