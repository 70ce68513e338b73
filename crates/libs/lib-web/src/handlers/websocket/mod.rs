//! # WebSocket Gateway
//!
//! The authenticated live channel for messaging.
//!
//! ## Endpoint
//!
//! - `GET /api/ws/chat` - upgrade to the live channel
//!
//! The token is read from `Authorization: Bearer <token>` or, for browsers that
//! cannot set headers on an upgrade, `?token=<token>`. It is checked before the
//! upgrade; a bad token gets `401` and no socket.
//!
//! ## Session Lifecycle
//!
//! 1. Authenticate, upgrade, register the session (displacing any older one)
//! 2. Send `connected`
//! 3. Process client frames one at a time until the socket closes
//! 4. Unregister, unless a newer session already replaced this one
//!
//! See [`crate::chat::protocol`] for the frames.

use crate::chat::{relay_typing, ClientEvent, OutgoingMessage, ServerEvent, SessionHandle};
use crate::middleware::{authenticate_token, bearer_token, CurrentParticipant};
use crate::server::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use lib_core::{AppError, ParticipantRef};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub token: Option<String>,
}

/// Conversations this session joined, mapped to the other participant.
///
/// Owned by the session's reader task only.
type JoinedConversations = HashMap<i64, ParticipantRef>;

/// WebSocket handler for the live messaging channel.
///
/// **Route**: `GET /api/ws/chat`
///
/// # Example
///
/// ```javascript
/// const ws = new WebSocket(`ws://localhost:3001/api/ws/chat?token=${token}`);
/// ws.onmessage = (event) => {
///   const frame = JSON.parse(event.data);
///   if (frame.event === 'new_message') render(frame.data.message);
/// };
/// ws.send(JSON.stringify({event: 'send_message', data: {conversation_id: 3, content: 'Hi'}}));
/// ```
pub async fn chat_websocket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<ChannelQuery>,
    State(state): State<AppState>,
) -> Response {
    let token = bearer_token(&headers).map(str::to_string).or(query.token);

    let current = match token.as_deref() {
        Some(token) => authenticate_token(token, &state.config),
        None => Err(AppError::Authentication("Missing token".to_string())),
    };
    let current = match current {
        Ok(current) => current,
        Err(e) => {
            warn!(error = %e, "[WS] AUTH_REJECTED error={}", e);
            return e.into_response();
        }
    };

    info!(
        participant = %current.participant,
        "[WS] UPGRADE_START participant={}",
        current.participant
    );
    ws.on_upgrade(move |socket| run_session(socket, state, current))
        .into_response()
}

/// Drive one live session until either side closes.
async fn run_session(socket: WebSocket, state: AppState, current: CurrentParticipant) {
    let participant = current.participant;
    let (handle, mut outbox) = SessionHandle::new(participant);
    let session_id = handle.id();
    let connection_start = Instant::now();

    if let Some(previous) = state.registry.register(handle.clone()).await {
        info!(
            participant = %participant,
            session_id = %session_id,
            replaced_session_id = %previous.id(),
            "[WS] SUPERSEDED participant={} old_session={} new_session={}",
            participant,
            previous.id(),
            session_id
        );
    }

    handle.push(ServerEvent::Connected {
        participant,
        session_id: session_id.to_string(),
    });

    let online = state.registry.online_count().await;
    info!(
        participant = %participant,
        session_id = %session_id,
        online,
        "[WS] CONNECTED participant={} session_id={} online={}",
        participant,
        session_id,
        online
    );

    let (mut sink, mut stream) = socket.split();
    let events_out = Arc::new(AtomicU64::new(0));
    let events_in = Arc::new(AtomicU64::new(0));

    let events_out_send = Arc::clone(&events_out);
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "[WS] SERIALIZE_ERROR");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                debug!(session_id = %session_id, event = event.name(), error = %e, "[WS] SEND_ERROR");
                break;
            }
            debug!(session_id = %session_id, event = event.name(), "[WS] SENT event={}", event.name());
            events_out_send.fetch_add(1, Ordering::Relaxed);
        }
    });

    let reader_state = state.clone();
    let reader_handle = handle.clone();
    let events_in_recv = Arc::clone(&events_in);
    let mut recv_task = tokio::spawn(async move {
        let mut joined = JoinedConversations::new();
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    events_in_recv.fetch_add(1, Ordering::Relaxed);
                    handle_frame(&reader_state, &reader_handle, &mut joined, text.as_str()).await;
                }
                Ok(Message::Binary(_)) => {
                    reader_handle.push(ServerEvent::error(&AppError::Decoding(
                        "Binary frames are not supported".to_string(),
                    )));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "[WS] RECV_ERROR");
                    break;
                }
            }
        }
    });

    tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            if let Err(e) = result {
                error!(session_id = %session_id, error = ?e, "[WS] SEND_TASK_ERROR");
            }
        }
        result = &mut recv_task => {
            send_task.abort();
            if let Err(e) = result {
                error!(session_id = %session_id, error = ?e, "[WS] RECV_TASK_ERROR");
            }
        }
    }

    let removed = state.registry.unregister_by_session(&handle).await;
    let duration = connection_start.elapsed();
    let received = events_in.load(Ordering::Relaxed);
    let sent = events_out.load(Ordering::Relaxed);
    info!(
        participant = %participant,
        session_id = %session_id,
        duration_ms = duration.as_millis(),
        events_in = received,
        events_out = sent,
        unregistered = removed,
        "[WS] DISCONNECTED participant={} session_id={} duration={}ms events_in={} events_out={}",
        participant,
        session_id,
        duration.as_millis(),
        received,
        sent
    );
}

/// Handle one client frame. Replies go to this session only.
async fn handle_frame(
    state: &AppState,
    session: &SessionHandle,
    joined: &mut JoinedConversations,
    text: &str,
) {
    let me = session.participant();

    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(participant = %me, error = %e, "[WS] MALFORMED_FRAME");
            session.push(ServerEvent::error(&AppError::Decoding(format!(
                "Malformed frame: {}",
                e
            ))));
            return;
        }
    };

    match event {
        ClientEvent::SendMessage(payload) => {
            let expected = payload.expected_receiver();
            let outgoing = OutgoingMessage::new(payload.content, payload.attachment);
            let reply = match state
                .dispatcher
                .send(payload.conversation_id, me, expected, outgoing)
                .await
            {
                Ok(delivery) => ServerEvent::MessageSent {
                    message: delivery.message,
                },
                Err(e) => {
                    warn!(
                        participant = %me,
                        conversation_id = payload.conversation_id,
                        error = %e,
                        "[SEND] REJECTED conversation_id={} error={}",
                        payload.conversation_id,
                        e
                    );
                    ServerEvent::message_error(&e)
                }
            };
            session.push(reply);
        }
        ClientEvent::JoinConversation { conversation_id } => {
            match state.dispatcher.authorize(conversation_id, me).await {
                Ok(conversation) => {
                    if let Some(peer) = conversation.other_participant(&me) {
                        joined.insert(conversation_id, peer);
                    }
                    session.push(ServerEvent::ConversationJoined { conversation_id });
                }
                Err(e) => {
                    session.push(ServerEvent::error(&e));
                }
            }
        }
        ClientEvent::Typing { conversation_id } => {
            relay_if_joined(state, joined, me, conversation_id, true).await;
        }
        ClientEvent::StopTyping { conversation_id } => {
            relay_if_joined(state, joined, me, conversation_id, false).await;
        }
    }
}

/// Typing indicators are only relayed for conversations this session joined.
async fn relay_if_joined(
    state: &AppState,
    joined: &JoinedConversations,
    me: ParticipantRef,
    conversation_id: i64,
    is_typing: bool,
) {
    match joined.get(&conversation_id) {
        Some(peer) => {
            relay_typing(&state.registry, conversation_id, me, *peer, is_typing).await;
        }
        None => {
            debug!(participant = %me, conversation_id, "[TYPING] not joined, dropped");
        }
    }
}
