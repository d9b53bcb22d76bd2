//! Rust structs mapping to database tables.

use chrono::{DateTime, Utc};
use oa_core::{PostId, SongCandidate};
use serde::Deserialize;
use uuid::Uuid;

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_id(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<PostId> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s)
        .map(PostId::from)
        .map_err(|e| conversion_error(idx, e))
}

fn parse_time(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_time(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(_) => parse_time(row, idx).map(Some),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// An archived post.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub link: Option<String>,
    pub link_source: String,
    pub user_name: String,
    pub text: Option<String>,
    pub date_posted: DateTime<Utc>,
    pub has_been_played: bool,
    pub date_aired: Option<DateTime<Utc>>,
}

impl Post {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            link: row.get(1)?,
            link_source: row.get(2)?,
            user_name: row.get(3)?,
            text: row.get(4)?,
            date_posted: parse_time(row, 5)?,
            has_been_played: row.get(6)?,
            date_aired: parse_opt_time(row, 7)?,
        })
    }
}

impl From<Post> for SongCandidate {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            link: post.link,
            link_source: post.link_source,
            user_name: post.user_name,
            text: post.text,
            date_posted: post.date_posted,
            has_been_played: post.has_been_played,
        }
    }
}

/// A post as supplied by an archive export, before it is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub id: Option<PostId>,
    pub link: Option<String>,
    #[serde(default = "default_link_source")]
    pub link_source: String,
    pub user_name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date_posted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_been_played: bool,
}

fn default_link_source() -> String {
    "youtube".into()
}
