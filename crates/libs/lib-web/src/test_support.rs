//! Shared fixtures for lib-web tests.

use crate::server::AppState;
use lib_auth::encode_jwt;
use lib_core::model::collab::SqlListingCatalog;
use lib_core::model::store::test_support::{
    seed_listing, seed_participant, setup_shared_test_db, setup_test_db,
};
use lib_core::{Config, DbPool, ParticipantRef};
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-secret-key-must-be-at-least-32-characters-long!";

pub const TENANT: ParticipantRef = ParticipantRef::User(1);
pub const AGENT: ParticipantRef = ParticipantRef::Agent(7);
pub const OUTSIDER: ParticipantRef = ParticipantRef::Company(3);
pub const LISTING_ID: i64 = 77;

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        max_message_length: 500,
        listing_catalog_url: None,
    }
}

/// In-memory store with the tenant, agent, outsider and one listing seeded.
pub async fn seeded_db() -> DbPool {
    let pool = setup_test_db().await;
    seed(&pool).await;
    pool
}

/// Same fixtures on a file-backed, multi-connection pool.
pub async fn seeded_shared_db() -> (TempDir, DbPool) {
    let (dir, pool) = setup_shared_test_db().await;
    seed(&pool).await;
    (dir, pool)
}

async fn seed(pool: &DbPool) {
    seed_participant(pool, TENANT, "Tomás Tenant").await;
    seed_participant(pool, AGENT, "Dana Realty").await;
    seed_participant(pool, OUTSIDER, "Acme Lettings").await;
    seed_listing(pool, LISTING_ID, "Two-bedroom flat in Alfama").await;
}

/// App state over `pool` with the SQL-backed listing catalog.
pub fn test_state(pool: DbPool) -> AppState {
    let catalog = Arc::new(SqlListingCatalog::new(pool.clone()));
    AppState::new(pool, test_config(), catalog)
}

pub fn token_for(participant: ParticipantRef, name: &str) -> String {
    encode_jwt(participant.id(), participant.kind().as_str(), name, TEST_SECRET, 1)
        .expect("Failed to mint test token")
}
