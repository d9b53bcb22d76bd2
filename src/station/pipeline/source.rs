//! Source stage: stream the clip's encoded bytes into the transcoder.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use oa_core::{ResolvedSong, StationError};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;

/// Raw encoded audio as it arrives from the remote.
pub type ByteStream = BoxStream<'static, Result<Bytes, StationError>>;

/// Opens the byte stream for a resolved clip.
#[async_trait]
pub trait SourceFetch: Send + Sync {
    async fn open(&self, song: &ResolvedSong) -> Result<ByteStream, StationError>;
}

/// Downloads the chosen encoding over HTTP.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(user_agent: &str) -> oa_core::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| oa_core::Error::Internal(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetch for HttpSource {
    async fn open(&self, song: &ResolvedSong) -> Result<ByteStream, StationError> {
        let response = self
            .client
            .get(&song.stream_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StationError::RemoteFetch(e.to_string()))?;

        Ok(response
            .bytes_stream()
            .map_err(|e| StationError::RemoteFetch(e.to_string()))
            .boxed())
    }
}

/// Copy `stream` into the transcoder's stdin until the stream ends.
///
/// Returns the number of bytes fetched. A gap longer than `stall` between
/// chunks is a fetch failure; a write failure means the transcoder went away.
pub(crate) async fn pump(
    mut stream: ByteStream,
    stdin: &mut ChildStdin,
    stall: Duration,
) -> Result<u64, StationError> {
    let mut fetched = 0u64;

    loop {
        let next = tokio::time::timeout(stall, stream.next())
            .await
            .map_err(|_| StationError::RemoteFetch(format!("no data for {}s", stall.as_secs())))?;

        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        fetched += chunk.len() as u64;

        stdin
            .write_all(&chunk)
            .await
            .map_err(|e| StationError::Transcode(format!("transcoder stdin closed: {e}")))?;
    }

    stdin
        .flush()
        .await
        .map_err(|e| StationError::Transcode(format!("transcoder stdin closed: {e}")))?;

    Ok(fetched)
}
