use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::model::participant::ParticipantRef;

/// Snapshot of the most recent message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Two-party conversation anchored to a listing.
///
/// `participants` is kept in canonical order and `unread[i]` belongs to
/// `participants[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: i64,
    pub participants: [ParticipantRef; 2],
    pub listing_id: i64,
    pub last_message: Option<LastMessage>,
    pub unread: [i64; 2],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn slot(&self, participant: &ParticipantRef) -> Option<usize> {
        self.participants.iter().position(|p| p == participant)
    }

    pub fn is_participant(&self, participant: &ParticipantRef) -> bool {
        self.slot(participant).is_some()
    }

    /// The participant on the other side, or `None` for outsiders.
    pub fn other_participant(&self, participant: &ParticipantRef) -> Option<ParticipantRef> {
        self.slot(participant).map(|i| self.participants[1 - i])
    }

    pub fn unread_for(&self, participant: &ParticipantRef) -> Option<i64> {
        self.slot(participant).map(|i| self.unread[i])
    }
}

/// Order a pair canonically so an unordered pair always maps to one row.
///
/// Fails when both sides are the same participant.
pub fn canonical_pair(
    first: ParticipantRef,
    second: ParticipantRef,
) -> Result<(ParticipantRef, ParticipantRef), AppError> {
    match first.cmp(&second) {
        std::cmp::Ordering::Less => Ok((first, second)),
        std::cmp::Ordering::Greater => Ok((second, first)),
        std::cmp::Ordering::Equal => Err(AppError::Validation(
            "A conversation needs two distinct participants".to_string(),
        )),
    }
}

/// Raw `conversations` row.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub id: i64,
    pub a_kind: String,
    pub a_id: i64,
    pub b_kind: String,
    pub b_id: i64,
    pub listing_id: i64,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub a_unread: i64,
    pub b_unread: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = AppError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let a = ParticipantRef::from_columns(&row.a_kind, row.a_id).map_err(AppError::Persistence)?;
        let b = ParticipantRef::from_columns(&row.b_kind, row.b_id).map_err(AppError::Persistence)?;

        let last_message = match (row.last_message, row.last_message_at) {
            (Some(content), Some(at)) => Some(LastMessage { content, at }),
            _ => None,
        };

        Ok(Conversation {
            id: row.id,
            participants: [a, b],
            listing_id: row.listing_id,
            last_message,
            unread: [row.a_unread, row.b_unread],
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: ParticipantRef,
    pub receiver: ParticipantRef,
    pub content: String,
    pub attachment: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Data structure for inserting a new message.
#[derive(Debug, Clone)]
pub struct MessageForCreate {
    pub conversation_id: i64,
    pub sender: ParticipantRef,
    pub receiver: ParticipantRef,
    pub content: String,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw `messages` row.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_kind: String,
    pub sender_id: i64,
    pub receiver_kind: String,
    pub receiver_id: i64,
    pub content: String,
    pub attachment: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender: ParticipantRef::from_columns(&row.sender_kind, row.sender_id)
                .map_err(AppError::Persistence)?,
            receiver: ParticipantRef::from_columns(&row.receiver_kind, row.receiver_id)
                .map_err(AppError::Persistence)?,
            content: row.content,
            attachment: row.attachment,
            read: row.is_read,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_pair_is_order_independent() {
        let a = ParticipantRef::User(9);
        let b = ParticipantRef::Agent(2);
        assert_eq!(canonical_pair(a, b).unwrap(), canonical_pair(b, a).unwrap());
    }

    #[test]
    fn test_canonical_pair_rejects_self() {
        let a = ParticipantRef::Company(4);
        assert!(matches!(canonical_pair(a, a), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_other_participant() {
        let now = Utc::now();
        let conversation = Conversation {
            id: 1,
            participants: [ParticipantRef::User(1), ParticipantRef::Agent(1)],
            listing_id: 10,
            last_message: None,
            unread: [0, 3],
            created_at: now,
            updated_at: now,
        };

        assert_eq!(conversation.other_participant(&ParticipantRef::User(1)), Some(ParticipantRef::Agent(1)));
        assert_eq!(conversation.unread_for(&ParticipantRef::Agent(1)), Some(3));
        assert_eq!(conversation.other_participant(&ParticipantRef::Company(1)), None);
    }
}
