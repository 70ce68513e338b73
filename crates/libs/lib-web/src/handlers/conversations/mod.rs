//! # Conversation Handlers
//!
//! REST pull path for clients that are offline, reconnecting, or not using the
//! live channel. Every route requires a participant token.
//!
//! ## Endpoints
//!
//! - `GET    /api/conversations` - conversations of the caller, most recent first
//! - `POST   /api/conversations` - start (or reuse) a conversation with an opening message
//! - `GET    /api/conversations/unread-count` - total unread across conversations
//! - `GET    /api/conversations/{id}/messages` - history, marking it read
//! - `POST   /api/conversations/{id}/messages` - send a message
//! - `PUT    /api/conversations/{id}/read` - mark read
//! - `DELETE /api/conversations/{id}` - delete a conversation and its messages

use crate::chat::OutgoingMessage;
use crate::middleware::CurrentParticipant;
use crate::server::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    Extension,
};
use lib_core::dto::{
    ConversationView, CreateConversationRequest, DeleteConversationResponse, ListingSummary,
    MarkReadResponse, MessageView, ParticipantSummary, PostMessageRequest, UnreadCountResponse,
};
use lib_core::model::store::{Conversation, ConversationRepository};
use lib_core::{AppError, ParticipantRef, Result};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Builds conversation views, looking each listing and participant up once.
struct ViewBuilder<'a> {
    state: &'a AppState,
    listings: HashMap<i64, Option<ListingSummary>>,
    participants: HashMap<ParticipantRef, ParticipantSummary>,
}

impl<'a> ViewBuilder<'a> {
    fn new(state: &'a AppState) -> Self {
        Self {
            state,
            listings: HashMap::new(),
            participants: HashMap::new(),
        }
    }

    async fn listing(&mut self, listing_id: i64) -> Option<ListingSummary> {
        if let Some(cached) = self.listings.get(&listing_id) {
            return cached.clone();
        }
        let listing = match self.state.catalog.listing_summary(listing_id).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(listing_id, error = %e, "[CATALOG] lookup failed, omitting listing");
                None
            }
        };
        self.listings.insert(listing_id, listing.clone());
        listing
    }

    async fn participant(&mut self, participant: ParticipantRef) -> ParticipantSummary {
        if let Some(cached) = self.participants.get(&participant) {
            return cached.clone();
        }
        let summary = self.state.dispatcher.summarize(participant).await;
        self.participants.insert(participant, summary.clone());
        summary
    }

    async fn view(&mut self, conversation: &Conversation, viewer: &ParticipantRef) -> ConversationView {
        let listing = self.listing(conversation.listing_id).await;
        let mut participants = Vec::with_capacity(2);
        for participant in conversation.participants {
            participants.push(self.participant(participant).await);
        }
        ConversationView::new(conversation, viewer, listing, participants)
    }
}

/// List the caller's conversations.
///
/// **Route**: `GET /api/conversations`
#[instrument(skip(state, me), fields(participant = %me.participant))]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
) -> Result<Json<Vec<ConversationView>>> {
    let conversations = ConversationRepository::list_for_participant(&state.db, me.participant).await?;

    let mut builder = ViewBuilder::new(&state);
    let mut views = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        views.push(builder.view(conversation, &me.participant).await);
    }
    Ok(Json(views))
}

/// Start a conversation about a listing, or reuse the existing one, and send
/// the opening message.
///
/// **Route**: `POST /api/conversations`
///
/// Returns `201 Created` when the conversation is new, `200 OK` when reused.
///
/// ```json
/// {"receiver_id": 7, "receiver_kind": "agent", "listing_id": 77, "content": "Hello"}
/// ```
#[instrument(skip(state, me, req), fields(participant = %me.participant, listing_id = req.listing_id))]
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationView>)> {
    let receiver = req.receiver();
    if receiver == me.participant {
        return Err(AppError::Validation(
            "Cannot start a conversation with yourself".to_string(),
        ));
    }

    let listing = state
        .catalog
        .listing_summary(req.listing_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", req.listing_id)))?;

    if state.directory.participant_summary(receiver).await?.is_none() {
        return Err(AppError::NotFound(format!("Participant {} not found", receiver)));
    }

    let outgoing = OutgoingMessage::new(req.content, req.attachment);
    let (conversation, created, _delivery) = state
        .dispatcher
        .start_conversation(me.participant, receiver, req.listing_id, outgoing)
        .await?;

    let mut builder = ViewBuilder::new(&state);
    builder.listings.insert(listing.id, Some(listing));
    let view = builder.view(&conversation, &me.participant).await;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(view)))
}

/// Total unread messages for the caller.
///
/// **Route**: `GET /api/conversations/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
) -> Result<Json<UnreadCountResponse>> {
    let unread_count = ConversationRepository::total_unread(&state.db, me.participant).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// Conversation history, oldest first. Marks the caller's messages read.
///
/// **Route**: `GET /api/conversations/{id}/messages`
#[instrument(skip(state, me), fields(participant = %me.participant))]
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<Vec<MessageView>>> {
    let messages = state.dispatcher.history(conversation_id, me.participant).await?;
    Ok(Json(messages))
}

/// Send a message without the live channel. The receiver still gets
/// `new_message` if they are online.
///
/// **Route**: `POST /api/conversations/{id}/messages`
#[instrument(skip(state, me, req), fields(participant = %me.participant))]
pub async fn post_message(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>)> {
    let delivery = state
        .dispatcher
        .send(
            conversation_id,
            me.participant,
            None,
            OutgoingMessage::new(req.content, req.attachment),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(delivery.message)))
}

/// Mark the caller's messages in a conversation read.
///
/// **Route**: `PUT /api/conversations/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<MarkReadResponse>> {
    let marked_read = state.dispatcher.mark_read(conversation_id, me.participant).await?;
    Ok(Json(MarkReadResponse {
        conversation_id,
        marked_read,
    }))
}

/// Delete a conversation and its messages for both participants.
///
/// **Route**: `DELETE /api/conversations/{id}`
#[instrument(skip(state, me), fields(participant = %me.participant))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(me): Extension<CurrentParticipant>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<DeleteConversationResponse>> {
    let deleted_messages = state
        .dispatcher
        .delete_conversation(conversation_id, me.participant)
        .await?;

    info!(
        "[CONVERSATION] {} deleted conversation {} ({} messages)",
        me.participant, conversation_id, deleted_messages
    );
    Ok(Json(DeleteConversationResponse {
        conversation_id,
        deleted_messages,
    }))
}

#[cfg(test)]
mod tests;
