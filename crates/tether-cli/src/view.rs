use serde_json::Value;
use tether_core::ConnectionPhase;
use tether_core::Content;
use tether_core::Conversation;
use tether_core::ConversationId;
use tether_core::Message;
use tether_core::NotificationKind;
use tether_core::Role;
use tether_core::SpaceId;
use tether_core::SyncState;
use tether_core::TurnStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidebarEntry {
    Space {
        id: SpaceId,
        name: String,
        selected: bool,
    },
    Conversation {
        id: ConversationId,
        title: String,
        unread: bool,
        selected: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub role: String,
    pub text: String,
    pub streaming: bool,
    /// Sent but not yet echoed back with a server id.
    pub pending: bool,
    pub archived: bool,
}

impl TranscriptEntry {
    fn from_message(message: &Message) -> Self {
        let speaker = match message.role {
            Role::User => Speaker::User,
            Role::Assistant => Speaker::Assistant,
            _ => Speaker::Other,
        };
        Self {
            speaker,
            role: message.role.as_str().to_string(),
            text: content_text(&message.content),
            streaming: message.status == Some(TurnStatus::Incomplete),
            pending: message.id.is_temp(),
            archived: message.is_archived,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub text: String,
    pub kind: NotificationKind,
    pub sticky: bool,
}

/// What the terminal shows, captured from the session state after every
/// change so the UI task never touches `SyncState` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub user: Option<String>,
    pub sidebar_open: bool,
    pub sidebar: Vec<SidebarEntry>,
    pub tabs: Vec<(ConversationId, String)>,
    pub selected_space: Option<SpaceId>,
    pub selected: Option<ConversationId>,
    pub title: Option<String>,
    pub space_conversations: Vec<(ConversationId, String)>,
    pub transcript: Vec<TranscriptEntry>,
    pub loading: bool,
    pub awaiting_reply: bool,
    pub frozen: bool,
    pub buffered: usize,
    pub notification: Option<NoticeView>,
    pub xray: Option<String>,
}

impl Default for ChatView {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            connected: false,
            user: None,
            sidebar_open: true,
            sidebar: Vec::new(),
            tabs: Vec::new(),
            selected_space: None,
            selected: None,
            title: None,
            space_conversations: Vec::new(),
            transcript: Vec::new(),
            loading: false,
            awaiting_reply: false,
            frozen: false,
            buffered: 0,
            notification: None,
            xray: None,
        }
    }
}

impl ChatView {
    pub fn capture(state: &SyncState) -> Self {
        let store = &state.store;
        let selected = state.selection.conversation_id;
        let selected_space = state.selection.space_id;

        let mut sidebar = Vec::new();
        for (space_id, name) in store.spaces_options() {
            sidebar.push(SidebarEntry::Space {
                id: space_id,
                name,
                selected: selected_space == Some(space_id),
            });
            for conversation in space_members(state, space_id) {
                sidebar.push(SidebarEntry::Conversation {
                    id: conversation.id,
                    title: display_title(conversation),
                    unread: conversation.unread_messages,
                    selected: selected == Some(conversation.id),
                });
            }
        }

        let tabs = state
            .open_tabs()
            .iter()
            .filter_map(|id| store.conversation(*id))
            .map(|conversation| (conversation.id, display_title(conversation)))
            .collect();

        let space_conversations = match selected_space {
            Some(space_id) => space_members(state, space_id),
            None => store.conversations().collect(),
        }
        .into_iter()
        .map(|conversation| (conversation.id, display_title(conversation)))
        .collect();

        let current = state.selected_conversation();
        let transcript = selected
            .map(|id| {
                store
                    .visible_messages(id)
                    .into_iter()
                    .map(TranscriptEntry::from_message)
                    .collect()
            })
            .unwrap_or_default();

        let xray = if state.diagnostics.show_xray {
            state
                .diagnostics
                .xray
                .as_ref()
                .and_then(|xray| serde_json::to_string_pretty(xray).ok())
        } else {
            None
        };

        Self {
            phase: state.connection.phase,
            connected: state.connection.is_active,
            user: state
                .user_profile
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_owned),
            sidebar_open: state.layout.sidebar_open,
            sidebar,
            tabs,
            selected_space,
            selected,
            title: current.map(display_title),
            space_conversations,
            transcript,
            loading: state.interaction.messages_loading,
            awaiting_reply: current.is_some_and(|conversation| conversation.is_loading),
            frozen: state.interaction.highlighting,
            buffered: state.interaction.buffered.len(),
            notification: state.notifications.current().map(|notification| NoticeView {
                text: notification.message.clone(),
                kind: notification.kind,
                sticky: notification.sticky,
            }),
            xray,
        }
    }
}

/// The "None" space lists every conversation without a real space.
fn space_members(state: &SyncState, space_id: SpaceId) -> Vec<&Conversation> {
    let store = &state.store;
    if space_id.is_sentinel() {
        return store
            .conversations()
            .filter(|conversation| conversation.space_id.is_sentinel())
            .collect();
    }
    store
        .space(space_id)
        .map(|space| {
            space
                .conversation_ids
                .iter()
                .filter_map(|id| store.conversation(*id))
                .collect()
        })
        .unwrap_or_default()
}

fn display_title(conversation: &Conversation) -> String {
    if conversation.title.trim().is_empty() {
        format!("Conversation {}", conversation.id)
    } else {
        conversation.title.clone()
    }
}

fn content_text(content: &Content) -> String {
    match content.text() {
        Some(text) => text.to_string(),
        None => match content {
            Content::Text(text) => text.clone(),
            Content::Structured(fields) => Value::Object(fields.clone()).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tether_core::reduce;
    use tether_core::InitialData;
    use tether_core::RuntimeAction;
    use tether_core::SyncAction;
    use tether_core::UserAction;

    use super::*;

    fn state() -> SyncState {
        let mut state = SyncState::new();
        let data: InitialData = serde_json::from_value(json!({
            "spaces": [{ "id": 4, "name": "Work", "conversations": [2] }],
            "conversations": [
                { "id": 2, "title": "Plans", "space_id": 4 },
                { "id": 3, "title": "", "space_id": null }
            ],
            "user_profile": { "name": "sam" },
            "app_state": { "selectedSpaceId": 4, "selectedConversationId": 2, "openTabs": [2, 3] }
        }))
        .unwrap();
        reduce(
            &mut state,
            SyncAction::Runtime(RuntimeAction::InitialDataLoaded(data)),
            0,
        );
        reduce(
            &mut state,
            SyncAction::Runtime(RuntimeAction::ConnectionChanged(ConnectionPhase::Open)),
            0,
        );
        state
    }

    fn frame(state: &mut SyncState, value: Value) {
        reduce(
            state,
            SyncAction::Runtime(RuntimeAction::FrameReceived(value.to_string())),
            0,
        );
    }

    #[test]
    fn sidebar_groups_conversations_under_spaces() {
        let view = ChatView::capture(&state());

        assert_eq!(
            view.sidebar,
            vec![
                SidebarEntry::Space {
                    id: SpaceId::NONE,
                    name: "None".to_string(),
                    selected: false,
                },
                SidebarEntry::Conversation {
                    id: ConversationId(3),
                    title: "Conversation 3".to_string(),
                    unread: false,
                    selected: false,
                },
                SidebarEntry::Space {
                    id: SpaceId(4),
                    name: "Work".to_string(),
                    selected: true,
                },
                SidebarEntry::Conversation {
                    id: ConversationId(2),
                    title: "Plans".to_string(),
                    unread: false,
                    selected: true,
                },
            ]
        );
        assert_eq!(view.user.as_deref(), Some("sam"));
        assert_eq!(view.title.as_deref(), Some("Plans"));
        assert_eq!(view.space_conversations, vec![(ConversationId(2), "Plans".to_string())]);
    }

    #[test]
    fn transcript_marks_streaming_and_pending_messages() {
        let mut state = state();
        reduce(
            &mut state,
            SyncAction::User(UserAction::SubmitMessage {
                conversation_id: ConversationId(2),
                text: "hello".to_string(),
            }),
            0,
        );
        frame(
            &mut state,
            json!({
                "conversation_id": 2,
                "id": 40,
                "role": "assistant",
                "status": "incomplete",
                "content": { "text": "thin" }
            }),
        );

        let view = ChatView::capture(&state);

        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[0].speaker, Speaker::User);
        assert!(view.transcript[0].pending);
        assert_eq!(view.transcript[1].text, "thin");
        assert!(view.transcript[1].streaming);
        assert!(view.awaiting_reply);
    }

    #[test]
    fn frozen_view_reports_buffered_frames() {
        let mut state = state();
        reduce(
            &mut state,
            SyncAction::User(UserAction::SetHighlighting(true)),
            0,
        );
        frame(&mut state, json!({ "role": "alert", "content": "later" }));

        let view = ChatView::capture(&state);

        assert!(view.frozen);
        assert_eq!(view.buffered, 1);
        assert_eq!(view.notification, None);
    }

    #[test]
    fn xray_is_only_rendered_when_enabled() {
        let mut state = state();
        frame(
            &mut state,
            json!({ "role": "alert", "content": "hi", "xray": { "model": "m1" } }),
        );
        assert_eq!(ChatView::capture(&state).xray, None);

        reduce(&mut state, SyncAction::User(UserAction::ToggleXray), 0);
        let xray = ChatView::capture(&state).xray.unwrap();
        assert!(xray.contains("\"model\": \"m1\""));
    }
}
