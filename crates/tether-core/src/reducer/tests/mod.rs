use serde_json::json;
use serde_json::Value;

pub(super) use super::reduce;
pub(super) use super::Route;
pub(super) use super::SyncEffect;
pub(super) use super::CANT_CONNECT_TEXT;
pub(super) use super::NOT_CONNECTED_TEXT;
pub(super) use super::STALL_WARNING_TEXT;
pub(super) use crate::actions::FetchFailure;
pub(super) use crate::actions::RuntimeAction;
pub(super) use crate::actions::SidebarToggle;
pub(super) use crate::actions::SyncAction;
pub(super) use crate::actions::UserAction;
pub(super) use crate::notification::NotificationKind;
pub(super) use crate::persistence::ConversationRecord;
pub(super) use crate::persistence::InitialData;
pub(super) use crate::persistence::PersistedAppState;
pub(super) use crate::persistence::SpaceRecord;
pub(super) use crate::state::ConnectionPhase;
pub(super) use crate::state::ConversationId;
pub(super) use crate::state::MessageId;
pub(super) use crate::state::Role;
pub(super) use crate::state::SpaceId;
pub(super) use crate::state::SyncState;
pub(super) use crate::state::TurnStatus;

mod membership;
mod reconciliation;
mod status_frames;
mod streaming;

const WORK: SpaceId = SpaceId(10);
const HOME: SpaceId = SpaceId(20);
const PLANS: ConversationId = ConversationId(2);
const CHAT: ConversationId = ConversationId(3);

fn snapshot() -> InitialData {
    InitialData {
        spaces: vec![
            SpaceRecord {
                id: WORK,
                name: "Work".to_string(),
                description: None,
                conversations: vec![PLANS],
            },
            SpaceRecord {
                id: HOME,
                name: "Home".to_string(),
                description: Some("personal".to_string()),
                conversations: Vec::new(),
            },
        ],
        conversations: vec![
            ConversationRecord {
                id: PLANS,
                title: "Plans".to_string(),
                space_id: Some(WORK),
                excerpt: None,
            },
            ConversationRecord {
                id: CHAT,
                title: "Chat".to_string(),
                space_id: None,
                excerpt: None,
            },
        ],
        user_profile: json!({ "name": "sam" }),
        app_state: Some(PersistedAppState {
            selected_space_id: Some(WORK),
            selected_conversation_id: Some(PLANS),
            open_tabs: vec![PLANS],
            sidebar_open: true,
            grow_mode: false,
        }),
    }
}

/// Initialized session with `PLANS` selected and the socket open.
fn state() -> SyncState {
    let mut state = SyncState::new();
    run_runtime(&mut state, RuntimeAction::InitialDataLoaded(snapshot()));
    run_runtime(
        &mut state,
        RuntimeAction::ConnectionChanged(ConnectionPhase::Open),
    );
    state
}

fn run_runtime(state: &mut SyncState, action: RuntimeAction) -> Vec<SyncEffect> {
    run_runtime_at(state, action, 0)
}

fn run_runtime_at(state: &mut SyncState, action: RuntimeAction, now_ms: u64) -> Vec<SyncEffect> {
    reduce(state, SyncAction::Runtime(action), now_ms)
}

fn run_user(state: &mut SyncState, action: UserAction) -> Vec<SyncEffect> {
    reduce(state, SyncAction::User(action), 0)
}

fn frame(value: Value) -> RuntimeAction {
    RuntimeAction::FrameReceived(value.to_string())
}

fn turn(conversation_id: ConversationId, status: &str, text: &str) -> Value {
    json!({
        "conversation_id": conversation_id.0,
        "role": "assistant",
        "status": status,
        "content": { "text": text },
    })
}

/// `(role, text, status)` for every message of a conversation, in order.
fn transcript(state: &SyncState, conversation_id: ConversationId) -> Vec<(Role, String, Option<TurnStatus>)> {
    state
        .store
        .conversation_messages(conversation_id)
        .into_iter()
        .map(|message| {
            (
                message.role.clone(),
                message.content.text().unwrap_or_default().to_string(),
                message.status,
            )
        })
        .collect()
}

fn notification_text(state: &SyncState) -> Option<&str> {
    state
        .notifications
        .current()
        .map(|notification| notification.message.as_str())
}
