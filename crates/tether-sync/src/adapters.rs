use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::COOKIE;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tether_core::ConversationId;
use tether_core::ConversationRecord;
use tether_core::ConversationSettings;
use tether_core::InitialData;
use tether_core::MessageRecord;
use tether_core::PersistedAppState;
use tether_core::SpaceId;
use tether_core::SpaceRecord;
use url::Url;

use crate::contracts::ApiClient;
use crate::contracts::ApiError;
use crate::contracts::ONBOARDING_MARKER;

pub const NEW_SPACE_NAME: &str = "New Space";

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

/// `ApiClient` over HTTP. Cookies the server sets are kept between requests;
/// a configured session cookie is sent up front.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    base: Url,
    http: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(base: Url, session_cookie: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie {
            let value = HeaderValue::from_str(cookie).map_err(|_| ApiError::InvalidCookie)?;
            headers.insert(COOKIE, value);
        }
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base.as_str().trim_end_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(classify_unauthorized(&body));
        }
        tracing::debug!(status = status.as_u16(), body = %body, "request rejected");
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.send(request).await.map(|_| ())
    }
}

fn classify_unauthorized(body: &str) -> ApiError {
    let marker = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned));
    if marker.as_deref() == Some(ONBOARDING_MARKER) {
        ApiError::Onboarding
    } else {
        ApiError::Unauthorized
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn get_initial_data(&self) -> Result<InitialData, ApiError> {
        self.fetch(self.http.get(self.endpoint("initialize"))).await
    }

    async fn get_messages(
        &self,
        conversation_id: ConversationId,
        archived: bool,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let request = self
            .http
            .get(self.endpoint(&format!("conversations/{conversation_id}/messages")))
            .query(&[("archived", archived)]);
        let envelope: MessagesEnvelope = self.fetch(request).await?;
        Ok(envelope.messages)
    }

    async fn get_conversation_settings(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationSettings, ApiError> {
        self.fetch(
            self.http
                .get(self.endpoint(&format!("conversations/{conversation_id}/settings"))),
        )
        .await
    }

    async fn save_conversation_settings(
        &self,
        conversation_id: ConversationId,
        settings: &ConversationSettings,
    ) -> Result<(), ApiError> {
        self.execute(
            self.http
                .put(self.endpoint(&format!("conversations/{conversation_id}/settings")))
                .json(settings),
        )
        .await
    }

    async fn save_state(&self, state: &PersistedAppState) -> Result<(), ApiError> {
        self.execute(self.http.post(self.endpoint("state")).json(state))
            .await
    }

    async fn create_space(&self) -> Result<SpaceRecord, ApiError> {
        self.fetch(
            self.http
                .post(self.endpoint("spaces"))
                .json(&json!({ "name": NEW_SPACE_NAME })),
        )
        .await
    }

    async fn update_space(&self, space_id: SpaceId, name: &str) -> Result<(), ApiError> {
        self.execute(
            self.http
                .put(self.endpoint(&format!("spaces/{}", space_id.0)))
                .json(&json!({ "name": name })),
        )
        .await
    }

    async fn delete_space(&self, space_id: SpaceId) -> Result<(), ApiError> {
        self.execute(
            self.http
                .patch(self.endpoint(&format!("spaces/{}", space_id.0)))
                .json(&json!({})),
        )
        .await
    }

    async fn create_conversation(
        &self,
        space_id: Option<SpaceId>,
    ) -> Result<ConversationRecord, ApiError> {
        let path = match space_id {
            Some(space_id) => format!("spaces/{}/conversations", space_id.0),
            None => "conversations".to_string(),
        };
        self.fetch(self.http.post(self.endpoint(&path)).json(&json!({})))
            .await
    }

    async fn delete_conversation(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        self.execute(
            self.http
                .patch(self.endpoint(&format!("conversations/{conversation_id}")))
                .json(&json!({})),
        )
        .await
    }

    async fn archive_messages(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        self.execute(
            self.http
                .post(self.endpoint(&format!(
                    "conversations/{conversation_id}/messages/archive"
                )))
                .json(&json!({})),
        )
        .await
    }
}
