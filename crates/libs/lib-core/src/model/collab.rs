//! # Marketplace Collaborators
//!
//! The messaging core embeds listing and participant summaries in its
//! responses but does not own that data. These traits are the seam; the SQL
//! implementations read the marketplace's own tables, and lib-web adds an
//! HTTP-backed listing catalog.

use async_trait::async_trait;
use sqlx::FromRow;

use crate::dto::{ListingSummary, ParticipantSummary};
use crate::error::Result;
use crate::model::participant::ParticipantRef;
use crate::model::store::DbPool;

/// Supplies listing summaries.
#[async_trait]
pub trait ListingCatalog: Send + Sync {
    /// `Ok(None)` when the listing does not exist.
    async fn listing_summary(&self, listing_id: i64) -> Result<Option<ListingSummary>>;
}

/// Supplies display names and avatars.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// `Ok(None)` when the participant is unknown.
    async fn participant_summary(&self, participant: ParticipantRef) -> Result<Option<ParticipantSummary>>;
}

/// Listing catalog backed by the local `listings` table.
#[derive(Clone)]
pub struct SqlListingCatalog {
    pool: DbPool,
}

impl SqlListingCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingCatalog for SqlListingCatalog {
    async fn listing_summary(&self, listing_id: i64) -> Result<Option<ListingSummary>> {
        #[derive(FromRow)]
        struct ListingRow {
            id: i64,
            title: String,
            city: Option<String>,
            price: Option<i64>,
            image_url: Option<String>,
        }

        let row = sqlx::query_as::<_, ListingRow>(
            "SELECT id, title, city, price, image_url FROM listings WHERE id = ?",
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ListingSummary {
            id: row.id,
            title: row.title,
            city: row.city,
            price: row.price,
            image_url: row.image_url,
        }))
    }
}

/// Participant directory backed by the local `participants` table.
#[derive(Clone)]
pub struct SqlParticipantDirectory {
    pool: DbPool,
}

impl SqlParticipantDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantDirectory for SqlParticipantDirectory {
    async fn participant_summary(&self, participant: ParticipantRef) -> Result<Option<ParticipantSummary>> {
        #[derive(FromRow)]
        struct DirectoryRow {
            display_name: String,
            avatar_url: Option<String>,
        }

        let row = sqlx::query_as::<_, DirectoryRow>(
            "SELECT display_name, avatar_url FROM participants WHERE kind = ? AND id = ?",
        )
        .bind(participant.kind().as_str())
        .bind(participant.id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ParticipantSummary {
            participant,
            display_name: Some(row.display_name),
            avatar_url: row.avatar_url,
        }))
    }
}
