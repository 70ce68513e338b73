//! # Typing Relay
//!
//! Forwards typing indicators to the other participant if they are online.
//! Nothing is persisted and nothing is acknowledged; an offline peer simply
//! misses the indicator.

use super::protocol::ServerEvent;
use super::registry::ConnectionRegistry;
use lib_core::ParticipantRef;
use tracing::trace;

/// Relay a typing state change from `from` to `to`.
///
/// Returns true when the indicator was queued on a live session.
pub async fn relay_typing(
    registry: &ConnectionRegistry,
    conversation_id: i64,
    from: ParticipantRef,
    to: ParticipantRef,
    is_typing: bool,
) -> bool {
    let Some(session) = registry.lookup(&to).await else {
        trace!(conversation_id, from = %from, to = %to, "[TYPING] peer offline, dropped");
        return false;
    };

    let event = if is_typing {
        ServerEvent::UserTyping {
            conversation_id,
            participant: from,
        }
    } else {
        ServerEvent::UserStopTyping {
            conversation_id,
            participant: from,
        }
    };
    session.push(event)
}
