use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::state::ConversationId;
use super::state::SpaceId;
use super::state::SyncState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRecord {
    pub id: SpaceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conversations: Vec<ConversationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    /// `null` on the server means "no space".
    #[serde(default)]
    pub space_id: Option<SpaceId>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

/// UI state the server keeps between sessions. Keys are camelCase because
/// that is how the server stores the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedAppState {
    pub selected_space_id: Option<SpaceId>,
    pub selected_conversation_id: Option<ConversationId>,
    pub open_tabs: Vec<ConversationId>,
    pub sidebar_open: bool,
    pub grow_mode: bool,
}

impl Default for PersistedAppState {
    fn default() -> Self {
        Self {
            selected_space_id: None,
            selected_conversation_id: None,
            open_tabs: Vec::new(),
            sidebar_open: true,
            grow_mode: false,
        }
    }
}

impl PersistedAppState {
    pub fn capture(state: &SyncState) -> Self {
        Self {
            selected_space_id: state.selection.space_id,
            selected_conversation_id: state.selection.conversation_id,
            open_tabs: state.layout.open_tabs.clone(),
            sidebar_open: state.layout.sidebar_open,
            grow_mode: state.layout.grow_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    #[serde(default)]
    pub spaces: Vec<SpaceRecord>,
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
    #[serde(default)]
    pub user_profile: Value,
    #[serde(default)]
    pub app_state: Option<PersistedAppState>,
}

/// Per-conversation settings forms. The client only edits `title` and
/// `space` and passes the rest through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConversationSettings {
    #[serde(default)]
    pub conversation: Value,
    #[serde(default)]
    pub program: Value,
}

impl ConversationSettings {
    pub fn set_value(&mut self, setting: &str, value: Value) {
        if !self.conversation.is_object() {
            self.conversation = Value::Object(Default::default());
        }
        if let Value::Object(fields) = &mut self.conversation {
            let entry = fields
                .entry(setting.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            match entry {
                Value::Object(slot) => {
                    slot.insert("value".to_string(), value);
                }
                other => *other = serde_json::json!({ "value": value }),
            }
        }
    }

    pub fn value(&self, setting: &str) -> Option<&Value> {
        self.conversation.get(setting).and_then(|slot| slot.get("value"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn initial_data_accepts_null_space_and_missing_app_state() {
        let data: InitialData = serde_json::from_value(json!({
            "spaces": [{ "id": 3, "name": "Work", "description": null, "conversations": [7] }],
            "conversations": [{ "id": 7, "title": "Plans", "space_id": null }],
            "user_profile": { "name": "sam" }
        }))
        .unwrap();

        assert_eq!(data.conversations[0].space_id, None);
        assert_eq!(data.spaces[0].conversations, vec![ConversationId(7)]);
        assert!(data.app_state.is_none());
    }

    #[test]
    fn app_state_round_trips_with_camel_case_keys() {
        let state = PersistedAppState {
            selected_space_id: Some(SpaceId(2)),
            selected_conversation_id: Some(ConversationId(9)),
            open_tabs: vec![ConversationId(9), ConversationId(4)],
            sidebar_open: false,
            grow_mode: true,
        };
        let encoded = serde_json::to_value(&state).unwrap();
        assert_eq!(
            encoded,
            json!({
                "selectedSpaceId": 2,
                "selectedConversationId": 9,
                "openTabs": [9, 4],
                "sidebarOpen": false,
                "growMode": true
            })
        );
    }

    #[test]
    fn settings_value_updates_keep_other_fields() {
        let mut settings = ConversationSettings {
            conversation: json!({ "space": { "value": null, "options": [1, 2] } }),
            program: json!({}),
        };
        settings.set_value("space", json!(2));
        settings.set_value("title", json!("Renamed"));

        assert_eq!(settings.value("space"), Some(&json!(2)));
        assert_eq!(settings.conversation["space"]["options"], json!([1, 2]));
        assert_eq!(settings.value("title"), Some(&json!("Renamed")));
    }
}
