//! The station's view of the song archive.

use async_trait::async_trait;
use oa_core::{PostId, SongCandidate};
use oa_db::pool::DbPool;

/// Where candidates come from.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// A random post that has not aired yet, if any.
    async fn select_random_unplayed(&self) -> oa_core::Result<Option<SongCandidate>>;

    /// Record that `id` went on air.
    async fn mark_played(&self, id: PostId) -> oa_core::Result<()>;
}

/// [`ArchiveStore`] over the SQLite archive.
#[derive(Clone)]
pub struct SqliteArchive {
    pool: DbPool,
    link_source: String,
}

impl SqliteArchive {
    pub fn new(pool: DbPool, link_source: impl Into<String>) -> Self {
        Self {
            pool,
            link_source: link_source.into(),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> oa_core::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&oa_db::pool::PooledConnection, &str) -> oa_core::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let link_source = self.link_source.clone();
        tokio::task::spawn_blocking(move || {
            let conn = oa_db::pool::get_conn(&pool)?;
            f(&conn, &link_source)
        })
        .await
        .map_err(|e| oa_core::Error::Internal(format!("spawn_blocking join error: {e}")))?
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchive {
    async fn select_random_unplayed(&self) -> oa_core::Result<Option<SongCandidate>> {
        let post = self
            .blocking(|conn, source| oa_db::queries::posts::select_for_rotation(conn, source))
            .await?;
        Ok(post.map(SongCandidate::from))
    }

    async fn mark_played(&self, id: PostId) -> oa_core::Result<()> {
        let updated = self
            .blocking(move |conn, _| oa_db::queries::posts::mark_played(conn, id))
            .await?;
        if !updated {
            return Err(oa_core::Error::not_found("post", id));
        }
        Ok(())
    }
}
