use super::persistence::ConversationRecord;
use super::persistence::ConversationSettings;
use super::persistence::InitialData;
use super::persistence::SpaceRecord;
use super::state::ConnectionPhase;
use super::state::ConversationId;
use super::state::MessageRecord;
use super::state::SpaceId;

#[derive(Debug, Clone)]
pub enum SyncAction {
    User(UserAction),
    Runtime(RuntimeAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarToggle {
    Open,
    Close,
    Toggle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    LoadConversation(ConversationId),
    LoadSpace(Option<SpaceId>),
    OpenTab(ConversationId),
    CloseTab(ConversationId),
    ToggleSidebar(SidebarToggle),
    SetHighlighting(bool),
    ToggleArchivedMessages(ConversationId),
    ToggleXray,
    DismissNotification,
    SubmitMessage {
        conversation_id: ConversationId,
        text: String,
    },
    MoveConversationToSpace {
        conversation_id: ConversationId,
        space_id: SpaceId,
    },
    RenameConversation {
        conversation_id: ConversationId,
        title: String,
    },
    RenameSpace {
        space_id: SpaceId,
        name: String,
    },
    CreateSpace,
    DeleteSpace(SpaceId),
    CreateConversation(Option<SpaceId>),
    DeleteConversation(ConversationId),
    ArchiveMessages(ConversationId),
}

/// Why a REST fetch failed, as far as the client cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The server sent the user to onboarding or login; the router already
    /// handled it.
    AuthRedirect,
    Unreachable(String),
}

#[derive(Debug, Clone)]
pub enum RuntimeAction {
    FrameReceived(String),
    Tick,
    ConnectionChanged(ConnectionPhase),
    InitialDataLoaded(InitialData),
    InitialDataFailed(FetchFailure),
    MessagesLoaded {
        conversation_id: ConversationId,
        messages: Vec<MessageRecord>,
    },
    ConversationSettingsLoaded {
        conversation_id: ConversationId,
        settings: ConversationSettings,
    },
    SpaceCreated(SpaceRecord),
    SpaceDeleted(SpaceId),
    ConversationCreated(ConversationRecord),
    ConversationDeleted(ConversationId),
    MessagesArchived(ConversationId),
    SendFailed(String),
    RequestFailed {
        context: &'static str,
        message: String,
    },
}
