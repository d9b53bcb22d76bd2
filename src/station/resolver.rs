//! Turns an archive post into playable clip metadata.

use std::sync::Arc;

use async_trait::async_trait;
use oa_av::ToolRegistry;
use oa_core::{RemoteMedia, ResolvedSong, SongCandidate, StationError};
use reqwest::Url;

/// Remote media metadata service.
#[async_trait]
pub trait MediaLookup: Send + Sync {
    /// Fetch title, page URL and available encodings for `link`.
    async fn lookup(&self, link: &Url) -> oa_core::Result<RemoteMedia>;
}

/// [`MediaLookup`] backed by `yt-dlp -J`.
pub struct YtDlpLookup {
    tools: Arc<ToolRegistry>,
}

impl YtDlpLookup {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl MediaLookup for YtDlpLookup {
    async fn lookup(&self, link: &Url) -> oa_core::Result<RemoteMedia> {
        oa_av::lookup_media(&self.tools, link.as_str()).await
    }
}

/// Resolves [`SongCandidate`]s. Has no side effects.
#[derive(Clone)]
pub struct SongResolver {
    lookup: Arc<dyn MediaLookup>,
}

impl SongResolver {
    pub fn new(lookup: Arc<dyn MediaLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve `candidate` to its best audio-only encoding.
    ///
    /// `Ok(None)` means the candidate is unplayable: the link is missing or
    /// malformed, or the remote offers no audio-only encoding. Lookup
    /// failures are [`StationError::Resolve`].
    pub async fn resolve(
        &self,
        candidate: &SongCandidate,
    ) -> Result<Option<ResolvedSong>, StationError> {
        let Some(link) = validate_link(candidate.link.as_deref()) else {
            tracing::debug!(post_id = %candidate.id, "post has no usable link");
            return Ok(None);
        };

        let media = self
            .lookup
            .lookup(&link)
            .await
            .map_err(|e| StationError::Resolve(e.to_string()))?;

        let Some(encoding) = media.best_audio_encoding() else {
            tracing::debug!(post_id = %candidate.id, %link, "no audio-only encoding");
            return Ok(None);
        };

        Ok(Some(ResolvedSong::from_parts(candidate, &media, encoding)))
    }
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_link(link: Option<&str>) -> Option<Url> {
    let url = Url::parse(link?.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oa_core::{Encoding, PostId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLookup {
        media: RemoteMedia,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaLookup for FixedLookup {
        async fn lookup(&self, _link: &Url) -> oa_core::Result<RemoteMedia> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.media.clone())
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl MediaLookup for FailingLookup {
        async fn lookup(&self, _link: &Url) -> oa_core::Result<RemoteMedia> {
            Err(oa_core::Error::tool("yt-dlp", "video unavailable"))
        }
    }

    fn candidate(link: Option<&str>) -> SongCandidate {
        SongCandidate {
            id: PostId::new(),
            link: link.map(String::from),
            link_source: "youtube".into(),
            user_name: "dj_kim".into(),
            text: Some("banger".into()),
            date_posted: Utc::now(),
            has_been_played: false,
        }
    }

    fn encoding(id: &str, vcodec: Option<&str>, abr: f64) -> Encoding {
        Encoding {
            id: id.into(),
            url: format!("https://cdn.example/{id}"),
            acodec: Some("opus".into()),
            vcodec: vcodec.map(String::from),
            abr: Some(abr),
            content_length: Some(4_000_000),
        }
    }

    fn lookup_with(encodings: Vec<Encoding>) -> Arc<FixedLookup> {
        Arc::new(FixedLookup {
            media: RemoteMedia {
                title: "Roygbiv".into(),
                page_url: "https://www.youtube.com/watch?v=abc".into(),
                duration_secs: Some(150.0),
                channel: Some("Boards of Canada".into()),
                encodings,
            },
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn validate_link_rules() {
        assert!(validate_link(Some("https://www.youtube.com/watch?v=abc")).is_some());
        assert!(validate_link(Some("  http://youtu.be/abc ")).is_some());
        assert!(validate_link(None).is_none());
        assert!(validate_link(Some("")).is_none());
        assert!(validate_link(Some("not a url")).is_none());
        assert!(validate_link(Some("ftp://example.com/song.mp3")).is_none());
        assert!(validate_link(Some("file:///etc/passwd")).is_none());
    }

    #[tokio::test]
    async fn bad_link_skips_lookup() {
        let lookup = lookup_with(vec![encoding("251", None, 160.0)]);
        let resolver = SongResolver::new(lookup.clone());

        let resolved = resolver.resolve(&candidate(Some("garbage"))).await.unwrap();
        assert!(resolved.is_none());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn picks_best_audio_only_encoding() {
        let lookup = lookup_with(vec![
            encoding("18", Some("avc1"), 320.0),
            encoding("140", None, 128.0),
            encoding("251", None, 160.0),
        ]);
        let resolver = SongResolver::new(lookup);
        let post = candidate(Some("https://www.youtube.com/watch?v=abc"));

        let song = resolver.resolve(&post).await.unwrap().unwrap();
        assert_eq!(song.encoding_id, "251");
        assert_eq!(song.post_id, post.id);
        assert_eq!(song.member_posted, "dj_kim");
        assert_eq!(song.title, "Roygbiv");
        assert_eq!(song.length, 4_000_000);
    }

    #[tokio::test]
    async fn video_only_renditions_are_unresolvable() {
        let lookup = lookup_with(vec![encoding("18", Some("avc1"), 128.0)]);
        let resolver = SongResolver::new(lookup);

        let resolved = resolver
            .resolve(&candidate(Some("https://www.youtube.com/watch?v=abc")))
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn lookup_failure_is_resolve_error() {
        let resolver = SongResolver::new(Arc::new(FailingLookup));
        let err = resolver
            .resolve(&candidate(Some("https://www.youtube.com/watch?v=gone")))
            .await
            .unwrap_err();
        assert!(matches!(err, StationError::Resolve(_)));
    }
}
