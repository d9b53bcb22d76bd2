//! oa-db: the song archive.
//!
//! SQLite-backed storage for archived posts with connection pooling,
//! embedded migrations, a typed model, and the queries the station's queue
//! needs: random selection, marking posts as aired, and bulk import.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
