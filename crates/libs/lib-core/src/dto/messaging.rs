//! # Messaging Data Transfer Objects
//!
//! Request and response structures for the conversation REST surface. The
//! live channel reuses [`MessageView`] for `message_sent` and `new_message`.
//!
//! ## Endpoints Using These DTOs
//!
//! - `GET /api/conversations` -> `Vec<`[`ConversationView`]`>`
//! - `POST /api/conversations` - [`CreateConversationRequest`] -> [`ConversationView`]
//! - `GET /api/conversations/unread-count` -> [`UnreadCountResponse`]
//! - `GET /api/conversations/{id}/messages` -> `Vec<`[`MessageView`]`>`
//! - `POST /api/conversations/{id}/messages` - [`PostMessageRequest`] -> [`MessageView`]
//! - `PUT /api/conversations/{id}/read` -> [`MarkReadResponse`]
//! - `DELETE /api/conversations/{id}` -> [`DeleteConversationResponse`]
//!
//! ## Wire Format
//!
//! Participants are written as `{"kind": "agent", "id": 7}`. Optional fields
//! are omitted when `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::store::{Conversation, LastMessage, Message};
use crate::model::{ParticipantKind, ParticipantRef};

/// Display data for a participant, from the participant directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub participant: ParticipantRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ParticipantSummary {
    /// Summary with no directory data, used when the directory has no entry.
    pub fn bare(participant: ParticipantRef) -> Self {
        Self {
            participant,
            display_name: None,
            avatar_url: None,
        }
    }
}

/// Listing data embedded in conversation responses, from the listing catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingSummary {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Conversation as seen by one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: i64,
    pub listing_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<ListingSummary>,
    pub participants: Vec<ParticipantSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Unread count of the participant the view was built for
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationView {
    pub fn new(
        conversation: &Conversation,
        viewer: &ParticipantRef,
        listing: Option<ListingSummary>,
        participants: Vec<ParticipantSummary>,
    ) -> Self {
        Self {
            id: conversation.id,
            listing_id: conversation.listing_id,
            listing,
            participants,
            last_message: conversation.last_message.clone(),
            unread_count: conversation.unread_for(viewer).unwrap_or(0),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

/// A message with its sender populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: ParticipantSummary,
    pub receiver: ParticipantRef,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: Message, sender: ParticipantSummary) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender,
            receiver: message.receiver,
            content: message.content,
            attachment: message.attachment,
            read: message.read,
            created_at: message.created_at,
        }
    }
}

/// Start (or reuse) a conversation about a listing with an initial message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub receiver_id: i64,
    pub receiver_kind: ParticipantKind,
    pub listing_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl CreateConversationRequest {
    pub fn receiver(&self) -> ParticipantRef {
        ParticipantRef::new(self.receiver_kind, self.receiver_id)
    }
}

/// Post a message into an existing conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkReadResponse {
    pub conversation_id: i64,
    /// Messages flipped to read by this call
    pub marked_read: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteConversationResponse {
    pub conversation_id: i64,
    pub deleted_messages: u64,
}
