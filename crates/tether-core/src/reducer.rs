use serde_json::json;
use serde_json::Value;

use super::actions::FetchFailure;
use super::actions::RuntimeAction;
use super::actions::SidebarToggle;
use super::actions::SyncAction;
use super::actions::UserAction;
use super::classifier::apply_frame;
use super::notification::NotificationKind;
use super::persistence::ConversationSettings;
use super::persistence::InitialData;
use super::persistence::PersistedAppState;
use super::state::ConnectionPhase;
use super::state::ConversationId;
use super::state::MessageRecord;
use super::state::SpaceId;
use super::state::SyncState;

pub const STALL_WARNING_TEXT: &str = "Waiting for response from chat server";
pub const CANT_CONNECT_TEXT: &str = "Can't connect to server";
pub const NOT_CONNECTED_TEXT: &str = "Not connected to chat server";

/// Conversation created by the server for a brand-new user.
const WELCOME_CONVERSATION: ConversationId = ConversationId(1);

/// Message fetches always include archived messages; `visible_messages`
/// hides them until the archived view is toggled on.
pub const FETCH_ARCHIVED: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Chat,
    Conversations,
    Welcome,
    Login,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    Navigate(Route),
    SaveAppState(PersistedAppState),
    FetchMessages {
        conversation_id: ConversationId,
        archived: bool,
    },
    FetchConversationSettings(ConversationId),
    SaveConversationSettings {
        conversation_id: ConversationId,
        settings: ConversationSettings,
    },
    /// Re-run initialization, then re-fetch the selected conversation.
    Reinitialize,
    SendFrame(Value),
    CreateSpace,
    UpdateSpace {
        space_id: SpaceId,
        name: String,
    },
    DeleteSpace(SpaceId),
    CreateConversation(Option<SpaceId>),
    DeleteConversation(ConversationId),
    ArchiveMessages(ConversationId),
}

pub fn reduce(state: &mut SyncState, action: SyncAction, now_ms: u64) -> Vec<SyncEffect> {
    match action {
        SyncAction::User(user) => reduce_user(state, user, now_ms),
        SyncAction::Runtime(runtime) => reduce_runtime(state, runtime, now_ms),
    }
}

fn reduce_user(state: &mut SyncState, action: UserAction, now_ms: u64) -> Vec<SyncEffect> {
    match action {
        UserAction::LoadConversation(conversation_id) => load_conversation(state, conversation_id),
        UserAction::LoadSpace(space_id) => {
            state.selection.space_id = space_id;
            vec![save_app_state(state), SyncEffect::Navigate(Route::Conversations)]
        }
        UserAction::OpenTab(conversation_id) => {
            open_tab(state, conversation_id);
            Vec::new()
        }
        UserAction::CloseTab(conversation_id) => {
            state.layout.open_tabs.retain(|id| *id != conversation_id);
            state.selection.conversation_id = None;
            vec![save_app_state(state), SyncEffect::Navigate(Route::Conversations)]
        }
        UserAction::ToggleSidebar(toggle) => {
            state.layout.sidebar_open = match toggle {
                SidebarToggle::Open => true,
                SidebarToggle::Close => false,
                SidebarToggle::Toggle => !state.layout.sidebar_open,
            };
            vec![save_app_state(state)]
        }
        UserAction::SetHighlighting(true) => {
            state.interaction.highlighting = true;
            Vec::new()
        }
        UserAction::SetHighlighting(false) => {
            state.interaction.highlighting = false;
            let frames = state.interaction.buffered.drain();
            if !frames.is_empty() {
                tracing::debug!(count = frames.len(), "replaying suppressed frames");
            }
            frames
                .iter()
                .flat_map(|frame| apply_frame(state, frame, now_ms))
                .collect()
        }
        UserAction::ToggleArchivedMessages(conversation_id) => {
            if let Some(conversation) = state.store.conversation_mut(conversation_id) {
                conversation.show_archived_messages = !conversation.show_archived_messages;
            }
            Vec::new()
        }
        UserAction::ToggleXray => {
            state.diagnostics.show_xray = !state.diagnostics.show_xray;
            Vec::new()
        }
        UserAction::DismissNotification => {
            state.notifications.clear();
            Vec::new()
        }
        UserAction::SubmitMessage {
            conversation_id,
            text,
        } => submit_message(state, conversation_id, text, now_ms),
        UserAction::MoveConversationToSpace {
            conversation_id,
            space_id,
        } => {
            if let Err(err) = state
                .store
                .move_conversation_to_space(conversation_id, space_id)
            {
                tracing::warn!(error = %err, "cannot move conversation");
                return Vec::new();
            }
            let value = if space_id.is_sentinel() {
                Value::Null
            } else {
                json!(space_id.0)
            };
            vec![update_setting(state, conversation_id, "space", value)]
        }
        UserAction::RenameConversation {
            conversation_id,
            title,
        } => {
            if let Err(err) = state
                .store
                .rename_conversation(conversation_id, title.clone())
            {
                tracing::warn!(error = %err, "cannot rename conversation");
                return Vec::new();
            }
            vec![update_setting(state, conversation_id, "title", json!(title))]
        }
        UserAction::RenameSpace { space_id, name } => {
            if let Err(err) = state.store.rename_space(space_id, name.clone()) {
                tracing::warn!(error = %err, "cannot rename space");
                return Vec::new();
            }
            vec![SyncEffect::UpdateSpace { space_id, name }]
        }
        UserAction::CreateSpace => vec![SyncEffect::CreateSpace],
        UserAction::DeleteSpace(space_id) => {
            if space_id.is_sentinel() {
                return Vec::new();
            }
            vec![SyncEffect::DeleteSpace(space_id)]
        }
        UserAction::CreateConversation(space_id) => {
            vec![SyncEffect::CreateConversation(
                space_id.filter(|id| !id.is_sentinel()),
            )]
        }
        UserAction::DeleteConversation(conversation_id) => {
            vec![SyncEffect::DeleteConversation(conversation_id)]
        }
        UserAction::ArchiveMessages(conversation_id) => {
            vec![SyncEffect::ArchiveMessages(conversation_id)]
        }
    }
}

fn reduce_runtime(state: &mut SyncState, action: RuntimeAction, now_ms: u64) -> Vec<SyncEffect> {
    match action {
        RuntimeAction::FrameReceived(text) => {
            if state.interaction.highlighting {
                state.stall_timer.cancel();
                state.interaction.buffered.push(text);
                return Vec::new();
            }
            apply_frame(state, &text, now_ms)
        }
        RuntimeAction::Tick => {
            state.notifications.expire(now_ms);
            if state.stall_timer.fire_if_due(now_ms) {
                tracing::info!("no chat response within the stall window");
                state
                    .notifications
                    .show(STALL_WARNING_TEXT, false, NotificationKind::Info, now_ms);
            }
            Vec::new()
        }
        RuntimeAction::ConnectionChanged(phase) => {
            state.connection.phase = phase;
            state.connection.is_active = phase == ConnectionPhase::Open;
            Vec::new()
        }
        RuntimeAction::InitialDataLoaded(data) => apply_initial_data(state, data),
        RuntimeAction::InitialDataFailed(FetchFailure::AuthRedirect) => Vec::new(),
        RuntimeAction::InitialDataFailed(FetchFailure::Unreachable(reason)) => {
            tracing::warn!(reason = %reason, "initial data fetch failed");
            state
                .notifications
                .show(CANT_CONNECT_TEXT, true, NotificationKind::Error, now_ms);
            Vec::new()
        }
        RuntimeAction::MessagesLoaded {
            conversation_id,
            messages,
        } => {
            state.interaction.messages_loading = false;
            if let Err(err) = state.store.merge_fetched_messages(conversation_id, messages) {
                tracing::warn!(error = %err, "discarding fetched messages");
            }
            Vec::new()
        }
        RuntimeAction::ConversationSettingsLoaded {
            conversation_id,
            settings,
        } => {
            state.conversation_settings = Some((conversation_id, settings));
            Vec::new()
        }
        RuntimeAction::SpaceCreated(record) => {
            state.store.insert_space(record);
            Vec::new()
        }
        RuntimeAction::SpaceDeleted(space_id) => {
            if let Err(err) = state.store.delete_space(space_id) {
                tracing::warn!(error = %err, "cannot delete space");
                return Vec::new();
            }
            if state.selection.space_id == Some(space_id) {
                state.selection.space_id = None;
            }
            state
                .notifications
                .show("Space deleted", false, NotificationKind::Success, now_ms);
            vec![save_app_state(state)]
        }
        RuntimeAction::ConversationCreated(record) => {
            let conversation_id = record.id;
            state.store.insert_conversation(record);
            load_conversation(state, conversation_id)
        }
        RuntimeAction::ConversationDeleted(conversation_id) => {
            state.store.delete_conversation(conversation_id);
            state.layout.open_tabs.retain(|id| *id != conversation_id);
            let was_selected = state.selection.conversation_id == Some(conversation_id);
            if was_selected {
                state.selection.conversation_id = None;
            }
            if matches!(&state.conversation_settings, Some((id, _)) if *id == conversation_id) {
                state.conversation_settings = None;
            }
            state.notifications.show(
                "Conversation deleted",
                false,
                NotificationKind::Success,
                now_ms,
            );
            let mut effects = vec![save_app_state(state)];
            if was_selected {
                effects.push(SyncEffect::Navigate(Route::Conversations));
            }
            effects
        }
        RuntimeAction::MessagesArchived(conversation_id) => {
            if let Err(err) = state.store.archive_messages(conversation_id) {
                tracing::warn!(error = %err, "cannot archive messages");
            }
            Vec::new()
        }
        RuntimeAction::SendFailed(reason) => {
            tracing::warn!(reason = %reason, "outbound frame not sent");
            state
                .notifications
                .show(NOT_CONNECTED_TEXT, false, NotificationKind::Error, now_ms);
            Vec::new()
        }
        RuntimeAction::RequestFailed { context, message } => {
            tracing::warn!(context, error = %message, "request failed");
            state.notifications.show(
                format!("Failed to {context}"),
                false,
                NotificationKind::Error,
                now_ms,
            );
            Vec::new()
        }
    }
}

fn load_conversation(state: &mut SyncState, conversation_id: ConversationId) -> Vec<SyncEffect> {
    if state.selection.conversation_id == Some(conversation_id) {
        return vec![SyncEffect::Navigate(Route::Chat)];
    }
    let Some(conversation) = state.store.conversation_mut(conversation_id) else {
        tracing::warn!(conversation_id = %conversation_id, "cannot load unknown conversation");
        return Vec::new();
    };
    conversation.unread_messages = false;

    state.selection.conversation_id = Some(conversation_id);
    open_tab(state, conversation_id);
    state.interaction.messages_loading = true;
    vec![
        SyncEffect::FetchConversationSettings(conversation_id),
        SyncEffect::FetchMessages {
            conversation_id,
            archived: FETCH_ARCHIVED,
        },
        save_app_state(state),
        SyncEffect::Navigate(Route::Chat),
    ]
}

fn open_tab(state: &mut SyncState, conversation_id: ConversationId) {
    if !state.layout.open_tabs.contains(&conversation_id) {
        state.layout.open_tabs.insert(0, conversation_id);
    }
}

fn save_app_state(state: &SyncState) -> SyncEffect {
    SyncEffect::SaveAppState(PersistedAppState::capture(state))
}

fn submit_message(
    state: &mut SyncState,
    conversation_id: ConversationId,
    text: String,
    now_ms: u64,
) -> Vec<SyncEffect> {
    let record = MessageRecord::user(conversation_id, text.clone());
    if let Err(err) = state.store.append_message(record, conversation_id) {
        tracing::warn!(error = %err, "cannot submit message");
        return Vec::new();
    }
    // The local copy stays; nothing is queued for a later connection.
    if !state.connection.is_active {
        state
            .notifications
            .show(NOT_CONNECTED_TEXT, false, NotificationKind::Error, now_ms);
        return Vec::new();
    }
    vec![SyncEffect::SendFrame(json!({
        "conversation_id": conversation_id.0,
        "role": "user",
        "content": { "text": text },
    }))]
}

/// Edits one field of a conversation's settings form. Settings already
/// loaded for that conversation are updated in place; otherwise a form
/// holding just this field is sent.
fn update_setting(
    state: &mut SyncState,
    conversation_id: ConversationId,
    setting: &str,
    value: Value,
) -> SyncEffect {
    let settings = match &mut state.conversation_settings {
        Some((id, settings)) if *id == conversation_id => {
            settings.set_value(setting, value);
            settings.clone()
        }
        _ => {
            let mut settings = ConversationSettings::default();
            settings.set_value(setting, value);
            settings
        }
    };
    SyncEffect::SaveConversationSettings {
        conversation_id,
        settings,
    }
}

fn apply_initial_data(state: &mut SyncState, data: InitialData) -> Vec<SyncEffect> {
    state.store.load_snapshot(data.spaces, data.conversations);
    state.user_profile = data.user_profile;

    let app_state = data.app_state.unwrap_or_default();
    let known_tabs = app_state
        .open_tabs
        .iter()
        .copied()
        .filter(|id| state.store.conversation(*id).is_some());
    state.layout.open_tabs = known_tabs.collect();
    state.layout.sidebar_open = app_state.sidebar_open && !state.layout.is_mobile;
    state.layout.grow_mode = app_state.grow_mode;

    let restored_space = app_state
        .selected_space_id
        .filter(|id| state.store.space(*id).is_some());
    let restored_conversation = app_state
        .selected_conversation_id
        .filter(|id| state.store.conversation(*id).is_some());
    if state
        .selection
        .conversation_id
        .is_some_and(|id| state.store.conversation(id).is_none())
    {
        state.selection.conversation_id = None;
    }
    state.selection.space_id = restored_space;

    tracing::info!(
        spaces = state.store.spaces().count(),
        conversations = state.store.conversations().count(),
        "initial data applied"
    );

    if let Some(conversation_id) = restored_conversation {
        return load_conversation(state, conversation_id);
    }
    let only_welcome = {
        let mut conversations = state.store.conversations();
        matches!(
            (conversations.next(), conversations.next()),
            (Some(only), None) if only.id == WELCOME_CONVERSATION
        )
    };
    if only_welcome {
        return load_conversation(state, WELCOME_CONVERSATION);
    }
    state.selection.conversation_id = None;
    vec![save_app_state(state), SyncEffect::Navigate(Route::Conversations)]
}

#[cfg(test)]
mod tests;
