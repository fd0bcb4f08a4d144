use super::state::ConversationId;
use super::state::EntityStore;
use super::state::MessageId;
use super::state::MessageRecord;
use super::state::StoreError;
use super::state::SyncState;
use super::state::TurnStatus;

/// Where a streamed chat-turn frame lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPlacement {
    /// Overwrite the still-streaming assistant message with this id.
    Amend(MessageId),
    Append,
}

/// A frame amends the conversation's last message only while that message is
/// an assistant turn still marked incomplete. Anything else starts a new one,
/// including the first frame of an empty conversation.
pub fn place_turn(store: &EntityStore, conversation_id: ConversationId) -> TurnPlacement {
    match store.last_message(conversation_id) {
        Some(last) if last.is_streaming_assistant() => TurnPlacement::Amend(last.id),
        _ => TurnPlacement::Append,
    }
}

/// Applies one chat-turn frame. Incomplete frames (re)arm the stall timer and
/// mark the conversation loading; a complete frame settles both.
pub(crate) fn apply_turn(
    state: &mut SyncState,
    conversation_id: ConversationId,
    status: TurnStatus,
    message: MessageRecord,
    now_ms: u64,
) -> Result<MessageId, StoreError> {
    let placement = place_turn(&state.store, conversation_id);
    let id = match placement {
        TurnPlacement::Amend(existing) => state.store.replace_message(message, existing)?,
        TurnPlacement::Append => state.store.append_message(message, conversation_id)?,
    };

    let loading = match status {
        TurnStatus::Incomplete => {
            state.stall_timer.arm(now_ms);
            true
        }
        TurnStatus::Complete => {
            state.stall_timer.cancel();
            false
        }
    };
    if let Some(conversation) = state.store.conversation_mut(conversation_id) {
        conversation.is_loading = loading;
    }

    tracing::trace!(
        conversation_id = %conversation_id,
        message_id = %id,
        status = status.label(),
        amended = matches!(placement, TurnPlacement::Amend(_)),
        "applied chat turn"
    );
    Ok(id)
}
