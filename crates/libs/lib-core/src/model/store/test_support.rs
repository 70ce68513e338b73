//! Database helpers for tests.
//!
//! [`setup_test_db`] is a single-connection in-memory store for plain unit
//! tests. [`setup_shared_test_db`] is a file-backed store with a real
//! multi-connection pool, for tests about contention between writers.

use super::{create_pool, run_migrations, DbPool};
use crate::model::participant::ParticipantRef;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use tempfile::TempDir;

/// Workspace `migrations/` directory.
pub const MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../../migrations");

/// Fresh in-memory database with the real schema applied.
///
/// Every connection to `sqlite::memory:` opens a separate database, so the pool
/// is pinned to a single long-lived connection.
pub async fn setup_test_db() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    run_migrations(&pool, Path::new(MIGRATIONS_DIR))
        .await
        .expect("Failed to apply migrations");

    pool
}

/// File-backed database opened through [`create_pool`], so it gets the same
/// multi-connection pool and SQLite settings as a running server.
///
/// The database lives in the returned directory; keep it alive while the pool
/// is in use.
pub async fn setup_shared_test_db() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("chat.db").display());

    let pool = create_pool(&url).await.expect("Failed to create test database");
    assert!(pool.options().get_max_connections() > 1);

    run_migrations(&pool, Path::new(MIGRATIONS_DIR))
        .await
        .expect("Failed to apply migrations");

    (dir, pool)
}

/// Insert a directory entry for `participant`.
pub async fn seed_participant(pool: &DbPool, participant: ParticipantRef, display_name: &str) {
    sqlx::query("INSERT INTO participants (kind, id, display_name, avatar_url) VALUES (?, ?, ?, ?)")
        .bind(participant.kind().as_str())
        .bind(participant.id())
        .bind(display_name)
        .bind(format!("https://cdn.example.com/avatars/{}.png", participant))
        .execute(pool)
        .await
        .expect("Failed to seed participant");
}

/// Insert a catalog entry for a listing.
pub async fn seed_listing(pool: &DbPool, listing_id: i64, title: &str) {
    sqlx::query("INSERT INTO listings (id, title, city, price, image_url) VALUES (?, ?, ?, ?, ?)")
        .bind(listing_id)
        .bind(title)
        .bind("Lisbon")
        .bind(350_000_i64)
        .bind(Option::<String>::None)
        .execute(pool)
        .await
        .expect("Failed to seed listing");
}
