use async_trait::async_trait;
use tether_core::ConversationId;
use tether_core::ConversationRecord;
use tether_core::ConversationSettings;
use tether_core::InitialData;
use tether_core::MessageRecord;
use tether_core::PersistedAppState;
use tether_core::Route;
use tether_core::SpaceId;
use tether_core::SpaceRecord;
use thiserror::Error;

/// 401 body sent to users who have not finished onboarding.
pub const ONBOARDING_MARKER: &str = "initial_start";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("onboarding required")]
    Onboarding,
    #[error("not logged in")]
    Unauthorized,
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("session cookie is not a valid header value")]
    InvalidCookie,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Where a failed request sends the user, if anywhere.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            Self::Onboarding => Some(Route::Welcome),
            Self::Unauthorized => Some(Route::Login),
            Self::InvalidCookie | Self::Status { .. } | Self::Http(_) | Self::Decode(_) => None,
        }
    }
}

/// Cookie-authenticated REST surface of the chat server.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn get_initial_data(&self) -> Result<InitialData, ApiError>;

    async fn get_messages(
        &self,
        conversation_id: ConversationId,
        archived: bool,
    ) -> Result<Vec<MessageRecord>, ApiError>;

    async fn get_conversation_settings(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationSettings, ApiError>;

    async fn save_conversation_settings(
        &self,
        conversation_id: ConversationId,
        settings: &ConversationSettings,
    ) -> Result<(), ApiError>;

    async fn save_state(&self, state: &PersistedAppState) -> Result<(), ApiError>;

    async fn create_space(&self) -> Result<SpaceRecord, ApiError>;

    async fn update_space(&self, space_id: SpaceId, name: &str) -> Result<(), ApiError>;

    async fn delete_space(&self, space_id: SpaceId) -> Result<(), ApiError>;

    async fn create_conversation(
        &self,
        space_id: Option<SpaceId>,
    ) -> Result<ConversationRecord, ApiError>;

    async fn delete_conversation(&self, conversation_id: ConversationId) -> Result<(), ApiError>;

    async fn archive_messages(&self, conversation_id: ConversationId) -> Result<(), ApiError>;
}

pub trait Router: Send + Sync {
    fn navigate(&self, route: Route);
}
