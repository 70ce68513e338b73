//! # Delivery Dispatcher
//!
//! Every conversation write goes through here, whether it arrived on the live
//! channel or over REST.
//!
//! ## Send Path
//!
//! 1. Validate the body (content or attachment, bounded length)
//! 2. Load the conversation and check the sender belongs to it
//! 3. Insert the message (unread)
//! 4. Update the conversation's last-message snapshot
//! 5. Increment the receiver's unread counter
//! 6. Push `new_message` to the receiver if they are online
//!
//! Steps 3-5 share one transaction. A failure in any of them rolls all three
//! back and the sender gets the error; nothing is pushed. A conversation
//! deleted between steps 2 and 3 surfaces as `NotFound`.
//!
//! Write transactions open with `BEGIN IMMEDIATE`: a deferred SQLite
//! transaction that reads before writing gets `SQLITE_BUSY` without waiting
//! when another writer holds the lock.

use super::protocol::ServerEvent;
use super::registry::ConnectionRegistry;
use chrono::Utc;
use lib_core::dto::{MessageView, ParticipantSummary};
use lib_core::model::collab::ParticipantDirectory;
use lib_core::model::store::{
    Conversation, ConversationRepository, Message, MessageForCreate, MessageRepository,
};
use lib_core::{AppError, DbPool, ParticipantRef, Result};
use lib_utils::{validate_max_length, validate_not_empty};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Body of a message about to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    content: String,
    attachment: Option<String>,
}

impl OutgoingMessage {
    /// Blank attachments are treated as absent.
    pub fn new(content: impl Into<String>, attachment: Option<String>) -> Self {
        Self {
            content: content.into(),
            attachment: attachment
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        }
    }

    fn validate(&self, max_length: usize) -> Result<()> {
        if self.attachment.is_none() {
            validate_not_empty(&self.content, "content").map_err(AppError::Validation)?;
        }
        validate_max_length(&self.content, max_length, "content").map_err(AppError::Validation)?;
        Ok(())
    }

    /// Text stored as the conversation's last message.
    fn summary(&self) -> &str {
        if self.content.trim().is_empty() {
            "[attachment]"
        } else {
            &self.content
        }
    }
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: MessageView,
    /// Whether `new_message` was queued on the receiver's live session
    pub pushed: bool,
}

pub struct DeliveryDispatcher {
    db: DbPool,
    registry: Arc<ConnectionRegistry>,
    directory: Arc<dyn ParticipantDirectory>,
    max_message_length: usize,
}

impl DeliveryDispatcher {
    pub fn new(
        db: DbPool,
        registry: Arc<ConnectionRegistry>,
        directory: Arc<dyn ParticipantDirectory>,
        max_message_length: usize,
    ) -> Self {
        Self {
            db,
            registry,
            directory,
            max_message_length,
        }
    }

    /// Load a conversation and check `participant` belongs to it.
    pub async fn authorize(&self, conversation_id: i64, participant: ParticipantRef) -> Result<Conversation> {
        let conversation = ConversationRepository::find_by_id(&self.db, conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", conversation_id)))?;

        if !conversation.is_participant(&participant) {
            return Err(AppError::Authorization(
                "Not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    /// Persist a message into an existing conversation and deliver it.
    ///
    /// `expected_receiver`, when given, must be the other participant.
    #[instrument(skip(self, outgoing), fields(sender = %sender))]
    pub async fn send(
        &self,
        conversation_id: i64,
        sender: ParticipantRef,
        expected_receiver: Option<ParticipantRef>,
        outgoing: OutgoingMessage,
    ) -> Result<Delivery> {
        outgoing.validate(self.max_message_length)?;

        let conversation = self.authorize(conversation_id, sender).await?;
        let receiver = conversation
            .other_participant(&sender)
            .ok_or_else(|| AppError::Authorization("Not a participant of this conversation".to_string()))?;

        if let Some(expected) = expected_receiver {
            if expected != receiver {
                return Err(AppError::Authorization(format!(
                    "{} is not the other participant of conversation {}",
                    expected, conversation_id
                )));
            }
        }

        let mut tx = self.begin_write().await?;
        let message = write_message(&mut tx, conversation_id, sender, receiver, &outgoing)
            .await
            .inspect_err(|e| {
                warn!(
                    conversation_id,
                    sender = %sender,
                    error = %e,
                    "[SEND] ROLLBACK conversation_id={} error={}",
                    conversation_id,
                    e
                )
            })?;
        tx.commit().await?;

        Ok(self.deliver(message).await)
    }

    /// Find or create the conversation for (sender, receiver, listing) and send
    /// the opening message, all in one transaction.
    ///
    /// Returns the conversation as stored after the send and whether it was
    /// created by this call.
    #[instrument(skip(self, outgoing), fields(sender = %sender, receiver = %receiver))]
    pub async fn start_conversation(
        &self,
        sender: ParticipantRef,
        receiver: ParticipantRef,
        listing_id: i64,
        outgoing: OutgoingMessage,
    ) -> Result<(Conversation, bool, Delivery)> {
        outgoing.validate(self.max_message_length)?;

        let mut tx = self.begin_write().await?;
        let (conversation, created) =
            ConversationRepository::find_or_create(&mut tx, sender, receiver, listing_id).await?;
        let message = write_message(&mut tx, conversation.id, sender, receiver, &outgoing)
            .await
            .inspect_err(|e| {
                warn!(
                    conversation_id = conversation.id,
                    error = %e,
                    "[SEND] ROLLBACK conversation_id={} error={}",
                    conversation.id,
                    e
                )
            })?;
        tx.commit().await?;

        if created {
            info!(
                conversation_id = conversation.id,
                listing_id,
                "[CONVERSATION] CREATED conversation_id={} listing_id={}",
                conversation.id,
                listing_id
            );
        }

        let conversation = ConversationRepository::find_by_id(&self.db, conversation.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", conversation.id)))?;
        let delivery = self.deliver(message).await;
        Ok((conversation, created, delivery))
    }

    /// Mark every message addressed to `reader` as read and zero their counter.
    ///
    /// Returns how many messages changed; repeated calls return zero.
    pub async fn mark_read(&self, conversation_id: i64, reader: ParticipantRef) -> Result<u64> {
        self.authorize(conversation_id, reader).await?;
        self.clear_unread(conversation_id, reader).await
    }

    /// Full history for `reader`, marking it read first.
    pub async fn history(&self, conversation_id: i64, reader: ParticipantRef) -> Result<Vec<MessageView>> {
        let conversation = self.authorize(conversation_id, reader).await?;
        self.clear_unread(conversation_id, reader).await?;

        let messages = MessageRepository::list_for_conversation(&self.db, conversation_id).await?;
        let [first, second] = conversation.participants;
        let summaries = [self.summarize(first).await, self.summarize(second).await];

        Ok(messages
            .into_iter()
            .map(|message| {
                let sender = summaries
                    .iter()
                    .find(|s| s.participant == message.sender)
                    .cloned()
                    .unwrap_or_else(|| ParticipantSummary::bare(message.sender));
                MessageView::new(message, sender)
            })
            .collect())
    }

    /// Remove a conversation and its messages. Returns the message count removed.
    #[instrument(skip(self), fields(requester = %requester))]
    pub async fn delete_conversation(&self, conversation_id: i64, requester: ParticipantRef) -> Result<u64> {
        let mut tx = self.begin_write().await?;

        let conversation = ConversationRepository::find_by_id(&mut *tx, conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", conversation_id)))?;
        if !conversation.is_participant(&requester) {
            return Err(AppError::Authorization(
                "Not a participant of this conversation".to_string(),
            ));
        }

        let deleted = ConversationRepository::delete(&mut tx, conversation_id).await?;
        tx.commit().await?;

        info!(
            conversation_id,
            deleted_messages = deleted,
            "[CONVERSATION] DELETED conversation_id={} messages={}",
            conversation_id,
            deleted
        );
        Ok(deleted)
    }

    /// Directory data for `participant`, or a bare summary when the directory
    /// has no entry or is unavailable.
    pub async fn summarize(&self, participant: ParticipantRef) -> ParticipantSummary {
        match self.directory.participant_summary(participant).await {
            Ok(Some(summary)) => summary,
            Ok(None) => ParticipantSummary::bare(participant),
            Err(e) => {
                warn!(participant = %participant, error = %e, "[DIRECTORY] lookup failed");
                ParticipantSummary::bare(participant)
            }
        }
    }

    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.db.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn clear_unread(&self, conversation_id: i64, reader: ParticipantRef) -> Result<u64> {
        let mut tx = self.begin_write().await?;
        let marked = MessageRepository::mark_read_for(&mut *tx, conversation_id, reader).await?;
        ConversationRepository::reset_unread(&mut *tx, conversation_id, reader).await?;
        tx.commit().await?;

        debug!(
            conversation_id,
            reader = %reader,
            marked,
            "[READ] conversation_id={} reader={} marked={}",
            conversation_id,
            reader,
            marked
        );
        Ok(marked)
    }

    /// Push `new_message` to the receiver if online. Best effort: a missing or
    /// closed session leaves the message for the pull path.
    async fn deliver(&self, message: Message) -> Delivery {
        let conversation_id = message.conversation_id;
        let receiver = message.receiver;
        let sender = self.summarize(message.sender).await;
        let view = MessageView::new(message, sender);

        let pushed = match self.registry.lookup(&receiver).await {
            Some(session) => session.push(ServerEvent::NewMessage {
                conversation_id,
                message: view.clone(),
            }),
            None => false,
        };

        info!(
            conversation_id,
            message_id = view.id,
            receiver = %receiver,
            pushed,
            "[SEND] DELIVERED message_id={} conversation_id={} pushed={}",
            view.id,
            conversation_id,
            pushed
        );

        Delivery { message: view, pushed }
    }
}

/// Steps 3-5 of the send path on a caller-owned transaction.
async fn write_message(
    conn: &mut SqliteConnection,
    conversation_id: i64,
    sender: ParticipantRef,
    receiver: ParticipantRef,
    outgoing: &OutgoingMessage,
) -> Result<Message> {
    let message = MessageRepository::insert(
        &mut *conn,
        MessageForCreate {
            conversation_id,
            sender,
            receiver,
            content: outgoing.content.clone(),
            attachment: outgoing.attachment.clone(),
            created_at: Utc::now(),
        },
    )
    .await?;

    ConversationRepository::append_message_summary(&mut *conn, conversation_id, outgoing.summary(), message.created_at)
        .await?;
    ConversationRepository::increment_unread(&mut *conn, conversation_id, receiver).await?;

    Ok(message)
}

#[cfg(test)]
mod tests;
