//! # Database Store
//!
//! Database connection pool and repository implementations.

// region: --- Modules
pub mod models;
pub mod conversation_repository;
pub mod message_repository;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
// endregion: --- Modules

// region: --- Re-exports
pub use conversation_repository::ConversationRepository;
pub use message_repository::MessageRepository;
pub use models::{Conversation, LastMessage, Message, MessageForCreate};
// endregion: --- Re-exports

// region: --- Types and Functions
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use std::path::Path;

/// Type alias for SQLite connection pool.
pub type DbPool = SqlitePool;

/// Create a new SQLite connection pool.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    Ok(pool)
}

/// Apply the SQL migrations found in `migrations_path`.
pub async fn run_migrations(pool: &DbPool, migrations_path: &Path) -> anyhow::Result<()> {
    let migrator = sqlx::migrate::Migrator::new(migrations_path).await?;
    migrator.run(pool).await?;
    Ok(())
}
// endregion: --- Types and Functions
