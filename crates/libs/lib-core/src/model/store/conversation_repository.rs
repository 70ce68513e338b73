//! # Conversation Repository
//!
//! Database access for two-party conversations and their per-participant
//! unread counters.
//!
//! Counter changes are single `UPDATE` statements keyed by participant, so two
//! concurrent increments can never lose an update. Callers that need several
//! writes to land together (the send path, mark-read, delete) pass a
//! transaction's connection as the executor.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection};

use super::models::{canonical_pair, Conversation, ConversationRow};
use crate::error::{AppError, Result};
use crate::model::participant::ParticipantRef;

const CONVERSATION_COLUMNS: &str = r#"
    id, a_kind, a_id, b_kind, b_id, listing_id,
    last_message, last_message_at, a_unread, b_unread,
    created_at, updated_at
"#;

/// Conversation repository for database operations.
pub struct ConversationRepository;

impl ConversationRepository {
    /// Find a conversation by id.
    pub async fn find_by_id<'e, E>(executor: E, conversation_id: i64) -> Result<Option<Conversation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");
        sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(conversation_id)
            .fetch_optional(executor)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    /// Return the conversation for this unordered pair and listing, creating it
    /// with zeroed counters when none exists.
    ///
    /// The boolean is `true` when the row was created by this call.
    pub async fn find_or_create(
        conn: &mut SqliteConnection,
        first: ParticipantRef,
        second: ParticipantRef,
        listing_id: i64,
    ) -> Result<(Conversation, bool)> {
        let (a, b) = canonical_pair(first, second)?;
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (a_kind, a_id, b_kind, b_id, listing_id, a_unread, b_unread, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)
            ON CONFLICT (a_kind, a_id, b_kind, b_id, listing_id) DO NOTHING
            "#,
        )
        .bind(a.kind().as_str())
        .bind(a.id())
        .bind(b.kind().as_str())
        .bind(b.id())
        .bind(listing_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE a_kind = ? AND a_id = ? AND b_kind = ? AND b_id = ? AND listing_id = ?"
        );
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(a.kind().as_str())
            .bind(a.id())
            .bind(b.kind().as_str())
            .bind(b.id())
            .bind(listing_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok((Conversation::try_from(row)?, inserted == 1))
    }

    /// Update the last-message snapshot. Counters are left alone.
    pub async fn append_message_summary<'e, E>(
        executor: E,
        conversation_id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let updated = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message = ?, last_message_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(content)
        .bind(at)
        .bind(at)
        .bind(conversation_id)
        .execute(executor)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound(format!("Conversation {} not found", conversation_id)));
        }
        Ok(())
    }

    /// Atomically add one to `participant`'s unread counter.
    pub async fn increment_unread<'e, E>(
        executor: E,
        conversation_id: i64,
        participant: ParticipantRef,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::apply_counter(
            executor,
            conversation_id,
            participant,
            r#"
            UPDATE conversations
            SET a_unread = CASE WHEN a_kind = ? AND a_id = ? THEN a_unread + 1 ELSE a_unread END,
                b_unread = CASE WHEN b_kind = ? AND b_id = ? THEN b_unread + 1 ELSE b_unread END
            WHERE id = ?
              AND ((a_kind = ? AND a_id = ?) OR (b_kind = ? AND b_id = ?))
            "#,
        )
        .await
    }

    /// Set `participant`'s unread counter back to zero.
    pub async fn reset_unread<'e, E>(
        executor: E,
        conversation_id: i64,
        participant: ParticipantRef,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::apply_counter(
            executor,
            conversation_id,
            participant,
            r#"
            UPDATE conversations
            SET a_unread = CASE WHEN a_kind = ? AND a_id = ? THEN 0 ELSE a_unread END,
                b_unread = CASE WHEN b_kind = ? AND b_id = ? THEN 0 ELSE b_unread END
            WHERE id = ?
              AND ((a_kind = ? AND a_id = ?) OR (b_kind = ? AND b_id = ?))
            "#,
        )
        .await
    }

    // Shared binder for the two counter statements above.
    async fn apply_counter<'e, E>(
        executor: E,
        conversation_id: i64,
        participant: ParticipantRef,
        sql: &'static str,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let kind = participant.kind().as_str();
        let id = participant.id();

        let updated = sqlx::query(sql)
            .bind(kind)
            .bind(id)
            .bind(kind)
            .bind(id)
            .bind(conversation_id)
            .bind(kind)
            .bind(id)
            .bind(kind)
            .bind(id)
            .execute(executor)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound(format!(
                "Conversation {} has no participant {}",
                conversation_id, participant
            )));
        }
        Ok(())
    }

    /// All conversations of `participant`, most recent activity first.
    pub async fn list_for_participant<'e, E>(
        executor: E,
        participant: ParticipantRef,
    ) -> Result<Vec<Conversation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE (a_kind = ? AND a_id = ?) OR (b_kind = ? AND b_id = ?) \
             ORDER BY last_message_at IS NULL, last_message_at DESC, updated_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(participant.kind().as_str())
            .bind(participant.id())
            .bind(participant.kind().as_str())
            .bind(participant.id())
            .fetch_all(executor)
            .await?;

        rows.into_iter().map(Conversation::try_from).collect()
    }

    /// Sum of `participant`'s unread counters across all conversations.
    pub async fn total_unread<'e, E>(executor: E, participant: ParticipantRef) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let kind = participant.kind().as_str();
        let id = participant.id();

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(CASE WHEN a_kind = ? AND a_id = ? THEN a_unread ELSE b_unread END), 0)
            FROM conversations
            WHERE (a_kind = ? AND a_id = ?) OR (b_kind = ? AND b_id = ?)
            "#,
        )
        .bind(kind)
        .bind(id)
        .bind(kind)
        .bind(id)
        .bind(kind)
        .bind(id)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }

    /// Delete a conversation and every message it owns.
    ///
    /// Returns the number of messages removed. Run inside a transaction.
    pub async fn delete(conn: &mut SqliteConnection, conversation_id: i64) -> Result<u64> {
        let messages = sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound(format!("Conversation {} not found", conversation_id)));
        }
        Ok(messages)
    }
}
