use super::coalescer::apply_turn;
use super::frame::decode_frame;
use super::frame::Command;
use super::frame::Frame;
use super::frame::StatusUpdate;
use super::notification::NotificationKind;
use super::reducer::SyncEffect;
use super::state::ConversationId;
use super::state::EntityStore;
use super::state::MessageId;
use super::state::MessageRecord;
use super::state::SyncState;

/// Routes one inbound frame to its handler. Kinds are checked in a fixed
/// order and at most one handler runs; xray data rides along on any kind.
pub(crate) fn apply_frame(state: &mut SyncState, text: &str, now_ms: u64) -> Vec<SyncEffect> {
    state.stall_timer.cancel();

    let Some(decoded) = decode_frame(text) else {
        tracing::trace!(len = text.len(), "dropping frame that is not a JSON object");
        return Vec::new();
    };
    if let Some(xray) = decoded.xray {
        state.diagnostics.xray = Some(xray);
    }

    match decoded.frame {
        Frame::Command { command, .. } => match command {
            Command::Reload => {
                tracing::info!("server requested reload");
                vec![SyncEffect::Reinitialize]
            }
            Command::Other(command) => {
                tracing::debug!(command = %command, "ignoring unknown command");
                Vec::new()
            }
        },
        Frame::Alert { message, severity } => {
            let kind = NotificationKind::from_wire(severity.as_deref());
            state.notifications.show(message, false, kind, now_ms);
            Vec::new()
        }
        Frame::Status {
            conversation_id,
            update,
        } => {
            apply_status(state, conversation_id, update, now_ms);
            Vec::new()
        }
        Frame::ChatTurn {
            conversation_id,
            status,
            message,
        } => {
            if let Err(err) = apply_turn(state, conversation_id, status, message, now_ms) {
                tracing::warn!(error = %err, "dropping chat turn");
                return Vec::new();
            }
            mark_unread(state, conversation_id);
            Vec::new()
        }
        Frame::PlainMessage {
            conversation_id,
            message,
        } => {
            let result = match pending_echo(&state.store, conversation_id, &message) {
                Some(temp_id) => state.store.replace_message(message, temp_id),
                None => state.store.append_message(message, conversation_id),
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "dropping message");
                return Vec::new();
            }
            mark_unread(state, conversation_id);
            Vec::new()
        }
        Frame::Unknown => {
            tracing::trace!("dropping frame of unknown kind");
            Vec::new()
        }
    }
}

fn apply_status(
    state: &mut SyncState,
    conversation_id: Option<ConversationId>,
    update: StatusUpdate,
    now_ms: u64,
) {
    match update {
        StatusUpdate::ApprovalResponseProcessed(message_id) => {
            let owner = conversation_id.or_else(|| {
                state
                    .store
                    .message(message_id)
                    .map(|message| message.conversation_id)
            });
            let Some(owner) = owner else {
                tracing::debug!(message_id = %message_id, "approval request already gone");
                return;
            };
            if !state.store.remove_message(message_id, owner) {
                tracing::debug!(message_id = %message_id, "approval request already gone");
            }
        }
        StatusUpdate::ToolStart(text) => {
            state
                .notifications
                .show(text, false, NotificationKind::ToolStart, now_ms);
        }
        StatusUpdate::ToolSuccess(text) => {
            state.notifications.clear();
            state
                .notifications
                .show(text, false, NotificationKind::ToolSuccess, now_ms);
        }
        StatusUpdate::ToolError(text) => {
            state.notifications.clear();
            state
                .notifications
                .show(text, false, NotificationKind::ToolError, now_ms);
        }
    }
}

/// A server-confirmed message that matches the newest optimistic message of
/// the same role takes over that message's slot.
fn pending_echo(
    store: &EntityStore,
    conversation_id: ConversationId,
    message: &MessageRecord,
) -> Option<MessageId> {
    if !matches!(message.id, Some(MessageId::Server(_))) {
        return None;
    }
    store
        .conversation_messages(conversation_id)
        .into_iter()
        .rev()
        .find(|candidate| candidate.id.is_temp() && candidate.role == message.role)
        .filter(|candidate| candidate.content.text() == message.content.text())
        .map(|candidate| candidate.id)
}

fn mark_unread(state: &mut SyncState, conversation_id: ConversationId) {
    if state.selection.conversation_id == Some(conversation_id) {
        return;
    }
    if let Some(conversation) = state.store.conversation_mut(conversation_id) {
        conversation.unread_messages = true;
    }
}
