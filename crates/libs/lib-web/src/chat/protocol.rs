//! # Live Channel Protocol
//!
//! JSON frames exchanged over `/api/ws/chat`. Every frame is an object with an
//! `event` name and a `data` payload:
//!
//! ```json
//! {"event": "send_message", "data": {"conversation_id": 3, "content": "Is it still available?"}}
//! {"event": "new_message", "data": {"conversation_id": 3, "message": {"id": 41, "...": "..."}}}
//! ```

use lib_core::dto::MessageView;
use lib_core::{AppError, ParticipantKind, ParticipantRef};
use serde::{Deserialize, Serialize};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage(SendMessagePayload),
    JoinConversation { conversation_id: i64 },
    Typing { conversation_id: i64 },
    StopTyping { conversation_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub conversation_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    /// Optional; when given it must name the other participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_kind: Option<ParticipantKind>,
}

impl SendMessagePayload {
    /// Receiver named by the client, if both halves were sent.
    pub fn expected_receiver(&self) -> Option<ParticipantRef> {
        match (self.receiver_kind, self.receiver_id) {
            (Some(kind), Some(id)) => Some(ParticipantRef::new(kind, id)),
            _ => None,
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First frame of every session.
    Connected {
        participant: ParticipantRef,
        session_id: String,
    },
    /// Acknowledges a `send_message` with the persisted message.
    MessageSent { message: MessageView },
    /// A `send_message` failed; nothing was persisted.
    MessageError { code: String, reason: String },
    /// A message addressed to this session's participant.
    NewMessage {
        conversation_id: i64,
        message: MessageView,
    },
    ConversationJoined { conversation_id: i64 },
    UserTyping {
        conversation_id: i64,
        participant: ParticipantRef,
    },
    UserStopTyping {
        conversation_id: i64,
        participant: ParticipantRef,
    },
    /// A frame other than `send_message` was rejected.
    Error { code: String, reason: String },
}

impl ServerEvent {
    pub fn message_error(err: &AppError) -> Self {
        ServerEvent::MessageError {
            code: err.code().to_string(),
            reason: err.user_message(),
        }
    }

    pub fn error(err: &AppError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            reason: err.user_message(),
        }
    }

    /// Event name as written on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::MessageError { .. } => "message_error",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::ConversationJoined { .. } => "conversation_joined",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStopTyping { .. } => "user_stop_typing",
            ServerEvent::Error { .. } => "error",
        }
    }
}
