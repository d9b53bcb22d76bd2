//! Archived post queries.

use chrono::Utc;
use oa_core::{Error, PostId, Result};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};

use crate::models::{NewPost, Post};

const COLS: &str =
    "id, link, link_source, user_name, text, date_posted, has_been_played, date_aired";

/// Store a post. A post without an id gets a fresh one; a post without a
/// date is dated now.
pub fn insert_post(conn: &Connection, new: &NewPost) -> Result<Post> {
    let post = Post {
        id: new.id.unwrap_or_default(),
        link: new.link.clone(),
        link_source: new.link_source.clone(),
        user_name: new.user_name.clone(),
        text: new.text.clone(),
        date_posted: new.date_posted.unwrap_or_else(Utc::now),
        has_been_played: new.has_been_played,
        date_aired: None,
    };

    conn.execute(
        &format!("INSERT INTO posts ({COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        rusqlite::params![
            post.id.to_string(),
            post.link,
            post.link_source,
            post.user_name,
            post.text,
            post.date_posted.to_rfc3339(),
            post.has_been_played,
            Option::<String>::None,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(post)
}

/// Get a post by ID.
pub fn get_post(conn: &Connection, id: PostId) -> Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM posts WHERE id = ?1"),
        [id.to_string()],
        Post::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Count posts from `link_source`, optionally only those not yet aired.
pub fn count_posts(conn: &Connection, link_source: &str, unplayed_only: bool) -> Result<u64> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM posts
             WHERE link_source = ?1 AND (?2 = 0 OR has_been_played = 0)",
            rusqlite::params![link_source, unplayed_only],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n as u64)
}

/// Pick one post from `link_source` uniformly at random.
pub fn random_post(
    conn: &Connection,
    link_source: &str,
    unplayed_only: bool,
) -> Result<Option<Post>> {
    let total = count_posts(conn, link_source, unplayed_only)?;
    if total == 0 {
        return Ok(None);
    }
    let offset = rand::thread_rng().gen_range(0..total);

    conn.query_row(
        &format!(
            "SELECT {COLS} FROM posts
             WHERE link_source = ?1 AND (?2 = 0 OR has_been_played = 0)
             ORDER BY id LIMIT 1 OFFSET ?3"
        ),
        rusqlite::params![link_source, unplayed_only, offset as i64],
        Post::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// The next post for rotation: a random unaired post, or any post once
/// everything has aired.
pub fn select_for_rotation(conn: &Connection, link_source: &str) -> Result<Option<Post>> {
    match random_post(conn, link_source, true)? {
        Some(post) => Ok(Some(post)),
        None => random_post(conn, link_source, false),
    }
}

/// Record that a post went on air.
pub fn mark_played(conn: &Connection, id: PostId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE posts SET has_been_played = 1, date_aired = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Insert many posts in one transaction, skipping ids that already exist.
/// Returns the number inserted.
pub fn import_posts(conn: &Connection, posts: &[NewPost]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut inserted = 0;
    for new in posts {
        if let Some(id) = new.id {
            if get_post(&tx, id)?.is_some() {
                continue;
            }
        }
        insert_post(&tx, new)?;
        inserted += 1;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(inserted)
}
