//! Embedded SQL migrations and runner.
//!
//! Migrations are `&str` constants executed in order; the
//! `schema_migrations` table records which versions have been applied.

use oa_core::{Error, Result};
use rusqlite::Connection;

/// V1: archived posts.
const V1_POSTS: &str = r#"
CREATE TABLE posts (
    id              TEXT PRIMARY KEY,
    link            TEXT,
    link_source     TEXT NOT NULL,
    user_name       TEXT NOT NULL,
    text            TEXT,
    date_posted     TEXT NOT NULL,
    has_been_played INTEGER NOT NULL DEFAULT 0,
    date_aired      TEXT
);

CREATE INDEX idx_posts_rotation ON posts(link_source, has_been_played);
"#;

/// All migrations in order. Each entry is `(version, sql)`.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_POSTS)];

/// Apply every migration that has not been recorded yet.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
            .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
