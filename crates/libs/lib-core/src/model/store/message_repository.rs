//! # Message Repository
//!
//! Append-mostly message log. A message is inserted once, may flip from unread
//! to read once, and is only ever removed together with its conversation.

use sqlx::{Executor, Sqlite};

use super::models::{Message, MessageForCreate, MessageRow};
use crate::error::{AppError, Result};
use crate::model::participant::ParticipantRef;

const MESSAGE_COLUMNS: &str = r#"
    id, conversation_id, sender_kind, sender_id, receiver_kind, receiver_id,
    content, attachment, is_read, created_at
"#;

/// Message repository for database operations.
pub struct MessageRepository;

impl MessageRepository {
    /// Insert an unread message and return the stored row.
    ///
    /// A conversation that no longer exists is reported as `NotFound`.
    pub async fn insert<'e, E>(executor: E, message: MessageForCreate) -> Result<Message>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "INSERT INTO messages \
             (conversation_id, sender_kind, sender_id, receiver_kind, receiver_id, content, attachment, is_read, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message.conversation_id)
            .bind(message.sender.kind().as_str())
            .bind(message.sender.id())
            .bind(message.receiver.kind().as_str())
            .bind(message.receiver.id())
            .bind(&message.content)
            .bind(&message.attachment)
            .bind(message.created_at)
            .fetch_one(executor)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    AppError::NotFound(format!("Conversation {} not found", message.conversation_id))
                }
                _ => AppError::from(e),
            })?;

        Message::try_from(row)
    }

    /// Full history of a conversation in persistence order.
    pub async fn list_for_conversation<'e, E>(executor: E, conversation_id: i64) -> Result<Vec<Message>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ? ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(conversation_id)
            .fetch_all(executor)
            .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    /// Flip every unread message addressed to `reader` to read.
    ///
    /// Returns how many messages changed; zero on a repeated call.
    pub async fn mark_read_for<'e, E>(
        executor: E,
        conversation_id: i64,
        reader: ParticipantRef,
    ) -> Result<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let updated = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = 1
            WHERE conversation_id = ? AND receiver_kind = ? AND receiver_id = ? AND is_read = 0
            "#,
        )
        .bind(conversation_id)
        .bind(reader.kind().as_str())
        .bind(reader.id())
        .execute(executor)
        .await?
        .rows_affected();

        Ok(updated)
    }

    /// Number of messages in a conversation.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn count_for_conversation<'e, E>(executor: E, conversation_id: i64) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }
}
