use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::config::Config;
use super::notification::NotificationCenter;
use super::notification::NotificationPolicy;
use super::persistence::ConversationRecord;
use super::persistence::ConversationSettings;
use super::persistence::SpaceRecord;
use super::suppression::SuppressionBuffer;
use super::timers::StallTimer;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SpaceId(pub i64);

impl SpaceId {
    /// Client-side "no space" bucket. Never sent to the server as a real id.
    pub const NONE: SpaceId = SpaceId(-1);

    pub fn is_sentinel(self) -> bool {
        self == Self::NONE
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server ids are integers; ids minted locally before the server confirms a
/// message are UUIDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum MessageId {
    Server(i64),
    Temp(Uuid),
}

impl MessageId {
    pub fn temp() -> Self {
        Self::Temp(Uuid::new_v4())
    }

    pub fn is_temp(self) -> bool {
        matches!(self, Self::Temp(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Temp(id) => write!(f, "tmp-{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    Command,
    Alert,
    Status,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Command => "command",
            Self::Alert => "alert",
            Self::Status => "status",
            Self::Other(role) => role.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "command" => Self::Command,
            "alert" => Self::Alert,
            "status" => Self::Status,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        match value {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Incomplete,
    Complete,
}

impl TurnStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        }
    }
}

/// Message body as the server sends it: either a bare string (alerts,
/// commands) or an object whose `text` key holds the display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Map<String, Value>),
}

impl Content {
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("text".to_string(), Value::String(text.into()));
        Self::Structured(map)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Structured(map) => map.get("text").and_then(Value::as_str),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Structured(map) => map.get(key),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// A message as it arrives over the wire or from a REST listing. The id is
/// optional until the server has confirmed the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub status: Option<TurnStatus>,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub is_archived: Option<bool>,
}

fn default_role() -> Role {
    Role::Assistant
}

impl MessageRecord {
    pub fn user(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation_id: Some(conversation_id),
            role: Role::User,
            status: None,
            content: Content::from_text(text),
            is_archived: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub status: Option<TurnStatus>,
    pub content: Content,
    pub is_archived: bool,
}

impl Message {
    fn from_record(record: MessageRecord, id: MessageId, conversation_id: ConversationId) -> Self {
        Self {
            id,
            conversation_id,
            role: record.role,
            status: record.status,
            content: record.content,
            is_archived: record.is_archived.unwrap_or(false),
        }
    }

    pub fn is_streaming_assistant(&self) -> bool {
        self.role == Role::Assistant && self.status == Some(TurnStatus::Incomplete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
    pub description: Option<String>,
    pub conversation_ids: Vec<ConversationId>,
}

impl Space {
    fn sentinel() -> Self {
        Self {
            id: SpaceId::NONE,
            name: "None".to_string(),
            description: None,
            conversation_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub space_id: SpaceId,
    pub message_ids: Vec<MessageId>,
    pub is_loading: bool,
    pub unread_messages: bool,
    pub show_archived_messages: bool,
    pub excerpt: Option<String>,
}

impl Conversation {
    fn from_record(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            space_id: record.space_id.unwrap_or(SpaceId::NONE),
            message_ids: Vec::new(),
            is_loading: false,
            unread_messages: false,
            show_archived_messages: false,
            excerpt: record.excerpt,
        }
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.message_ids.last().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),
    #[error("unknown space {0:?}")]
    UnknownSpace(SpaceId),
    #[error("unknown message {0}")]
    UnknownMessage(MessageId),
    #[error("the \"None\" space cannot be deleted")]
    SentinelSpace,
}

/// Normalized spaces, conversations and messages. Every entity mutation in
/// the client goes through the methods below.
#[derive(Debug, Clone)]
pub struct EntityStore {
    spaces: BTreeMap<SpaceId, Space>,
    conversations: BTreeMap<ConversationId, Conversation>,
    messages: BTreeMap<MessageId, Message>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        let mut spaces = BTreeMap::new();
        spaces.insert(SpaceId::NONE, Space::sentinel());
        Self {
            spaces,
            conversations: BTreeMap::new(),
            messages: BTreeMap::new(),
        }
    }

    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.get(&id)
    }

    pub fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.spaces.values()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub(crate) fn conversation_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(&id)
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(&id)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Messages of a conversation in list order.
    pub fn conversation_messages(&self, id: ConversationId) -> Vec<&Message> {
        self.conversations
            .get(&id)
            .map(|conversation| {
                conversation
                    .message_ids
                    .iter()
                    .filter_map(|message_id| self.messages.get(message_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Same as [`Self::conversation_messages`], minus archived messages unless
    /// the conversation is showing them.
    pub fn visible_messages(&self, id: ConversationId) -> Vec<&Message> {
        let show_archived = self
            .conversations
            .get(&id)
            .is_some_and(|conversation| conversation.show_archived_messages);
        self.conversation_messages(id)
            .into_iter()
            .filter(|message| show_archived || !message.is_archived)
            .collect()
    }

    pub fn last_message(&self, id: ConversationId) -> Option<&Message> {
        self.conversations
            .get(&id)
            .and_then(Conversation::last_message_id)
            .and_then(|message_id| self.messages.get(&message_id))
    }

    /// Space picker entries, "None" first.
    pub fn spaces_options(&self) -> Vec<(SpaceId, String)> {
        let mut options: Vec<(SpaceId, String)> = self
            .spaces
            .values()
            .map(|space| (space.id, space.name.clone()))
            .collect();
        options.sort_by_key(|(id, _)| !id.is_sentinel());
        options
    }

    /// Replaces every space and conversation with a fresh server snapshot.
    /// Message lists start empty and are refilled by later fetches.
    pub fn load_snapshot(&mut self, spaces: Vec<SpaceRecord>, conversations: Vec<ConversationRecord>) {
        self.spaces.clear();
        self.conversations.clear();
        self.messages.clear();
        self.spaces.insert(SpaceId::NONE, Space::sentinel());
        for space in spaces {
            self.insert_space(space);
        }
        for conversation in conversations {
            self.insert_conversation(conversation);
        }
    }

    pub fn insert_space(&mut self, record: SpaceRecord) {
        if record.id.is_sentinel() {
            return;
        }
        let mut conversation_ids = Vec::with_capacity(record.conversations.len());
        for id in record.conversations {
            if !conversation_ids.contains(&id) {
                conversation_ids.push(id);
            }
        }
        self.spaces.insert(
            record.id,
            Space {
                id: record.id,
                name: record.name,
                description: record.description,
                conversation_ids,
            },
        );
    }

    pub fn insert_conversation(&mut self, record: ConversationRecord) {
        let mut conversation = Conversation::from_record(record);
        if !self.spaces.contains_key(&conversation.space_id) {
            conversation.space_id = SpaceId::NONE;
        }
        let id = conversation.id;
        let space_id = conversation.space_id;
        if let Some(previous) = self.conversations.insert(id, conversation) {
            for message_id in previous.message_ids {
                self.messages.remove(&message_id);
            }
        }
        self.attach_to_space(id, space_id);
    }

    fn attach_to_space(&mut self, conversation_id: ConversationId, space_id: SpaceId) {
        for space in self.spaces.values_mut() {
            if space.id != space_id {
                space.conversation_ids.retain(|id| *id != conversation_id);
            }
        }
        if space_id.is_sentinel() {
            return;
        }
        if let Some(space) = self.spaces.get_mut(&space_id) {
            if !space.conversation_ids.contains(&conversation_id) {
                space.conversation_ids.push(conversation_id);
            }
        }
    }

    pub fn append_message(
        &mut self,
        record: MessageRecord,
        conversation_id: ConversationId,
    ) -> Result<MessageId, StoreError> {
        let Some(conversation) = self.conversations.get_mut(&conversation_id) else {
            return Err(StoreError::UnknownConversation(conversation_id));
        };
        let id = record.id.unwrap_or_else(MessageId::temp);
        let message = Message::from_record(record, id, conversation_id);
        if let Some(text) = message.content.text() {
            conversation.excerpt = Some(text.to_string());
        }
        if !conversation.message_ids.contains(&id) {
            conversation.message_ids.push(id);
        }
        self.messages.insert(id, message);
        Ok(id)
    }

    /// Rewrites the slot at `existing_id`. A payload carrying a server id
    /// different from `existing_id` moves the slot to that id, in the map and
    /// in the conversation's list, without leaving a second entry behind.
    pub fn replace_message(
        &mut self,
        record: MessageRecord,
        existing_id: MessageId,
    ) -> Result<MessageId, StoreError> {
        let Some(previous) = self.messages.remove(&existing_id) else {
            return Err(StoreError::UnknownMessage(existing_id));
        };
        let conversation_id = previous.conversation_id;
        let id = match record.id {
            Some(confirmed @ MessageId::Server(_)) => confirmed,
            _ => existing_id,
        };
        let message = Message::from_record(record, id, conversation_id);

        if let Some(conversation) = self.conversations.get_mut(&conversation_id) {
            if id != existing_id {
                if conversation.message_ids.contains(&id) {
                    conversation.message_ids.retain(|listed| *listed != existing_id);
                } else if let Some(slot) = conversation
                    .message_ids
                    .iter_mut()
                    .find(|listed| **listed == existing_id)
                {
                    *slot = id;
                }
            }
            if let Some(text) = message.content.text() {
                conversation.excerpt = Some(text.to_string());
            }
        }

        self.messages.insert(id, message);
        Ok(id)
    }

    /// Returns whether anything was removed. Calling it again is a no-op.
    pub fn remove_message(&mut self, message_id: MessageId, conversation_id: ConversationId) -> bool {
        let removed_entry = self.messages.remove(&message_id).is_some();
        let mut removed_from_list = false;
        if let Some(conversation) = self.conversations.get_mut(&conversation_id) {
            let before = conversation.message_ids.len();
            conversation.message_ids.retain(|id| *id != message_id);
            removed_from_list = conversation.message_ids.len() != before;
        }
        removed_entry || removed_from_list
    }

    /// Upserts a REST listing of messages. Server ids end up in ascending
    /// order; unconfirmed temp ids stay at the tail in the order they had.
    pub fn merge_fetched_messages(
        &mut self,
        conversation_id: ConversationId,
        records: Vec<MessageRecord>,
    ) -> Result<usize, StoreError> {
        let Some(conversation) = self.conversations.get_mut(&conversation_id) else {
            return Err(StoreError::UnknownConversation(conversation_id));
        };
        let mut added = 0;
        for record in records {
            let Some(id) = record.id else {
                continue;
            };
            if !conversation.message_ids.contains(&id) {
                conversation.message_ids.push(id);
                added += 1;
            }
            self.messages
                .insert(id, Message::from_record(record, id, conversation_id));
        }
        let (mut confirmed, pending): (Vec<MessageId>, Vec<MessageId>) = conversation
            .message_ids
            .iter()
            .partition(|id| !id.is_temp());
        confirmed.sort();
        confirmed.extend(pending);
        conversation.message_ids = confirmed;
        Ok(added)
    }

    pub fn archive_messages(&mut self, conversation_id: ConversationId) -> Result<(), StoreError> {
        let Some(conversation) = self.conversations.get(&conversation_id) else {
            return Err(StoreError::UnknownConversation(conversation_id));
        };
        for id in &conversation.message_ids {
            if let Some(message) = self.messages.get_mut(id) {
                message.is_archived = true;
            }
        }
        Ok(())
    }

    pub fn move_conversation_to_space(
        &mut self,
        conversation_id: ConversationId,
        space_id: SpaceId,
    ) -> Result<(), StoreError> {
        if !self.spaces.contains_key(&space_id) {
            return Err(StoreError::UnknownSpace(space_id));
        }
        let Some(conversation) = self.conversations.get_mut(&conversation_id) else {
            return Err(StoreError::UnknownConversation(conversation_id));
        };
        conversation.space_id = space_id;
        for space in self.spaces.values_mut() {
            space.conversation_ids.retain(|id| *id != conversation_id);
        }
        self.attach_to_space(conversation_id, space_id);
        Ok(())
    }

    /// Drops a real space. Its conversations fall back to the "None" space;
    /// their ids are returned.
    pub fn delete_space(&mut self, space_id: SpaceId) -> Result<Vec<ConversationId>, StoreError> {
        if space_id.is_sentinel() {
            return Err(StoreError::SentinelSpace);
        }
        let Some(space) = self.spaces.remove(&space_id) else {
            return Err(StoreError::UnknownSpace(space_id));
        };
        let mut orphaned = Vec::new();
        for conversation in self.conversations.values_mut() {
            if conversation.space_id == space_id {
                conversation.space_id = SpaceId::NONE;
                orphaned.push(conversation.id);
            }
        }
        for id in space.conversation_ids {
            if !orphaned.contains(&id) {
                orphaned.push(id);
            }
        }
        Ok(orphaned)
    }

    pub fn delete_conversation(&mut self, conversation_id: ConversationId) -> Option<Conversation> {
        let conversation = self.conversations.remove(&conversation_id)?;
        for space in self.spaces.values_mut() {
            space.conversation_ids.retain(|id| *id != conversation_id);
        }
        for message_id in &conversation.message_ids {
            self.messages.remove(message_id);
        }
        Some(conversation)
    }

    pub fn rename_space(&mut self, space_id: SpaceId, name: String) -> Result<(), StoreError> {
        match self.spaces.get_mut(&space_id) {
            Some(space) if !space_id.is_sentinel() => {
                space.name = name;
                Ok(())
            }
            Some(_) => Err(StoreError::SentinelSpace),
            None => Err(StoreError::UnknownSpace(space_id)),
        }
    }

    pub fn rename_conversation(
        &mut self,
        conversation_id: ConversationId,
        title: String,
    ) -> Result<(), StoreError> {
        let Some(conversation) = self.conversations.get_mut(&conversation_id) else {
            return Err(StoreError::UnknownConversation(conversation_id));
        };
        conversation.title = title;
        Ok(())
    }

    /// Checks the space/conversation membership invariants. Used by tests and
    /// debug assertions.
    pub fn membership_is_consistent(&self) -> bool {
        let every_space_known = self
            .conversations
            .values()
            .all(|conversation| self.spaces.contains_key(&conversation.space_id));
        let lists_agree = self.spaces.values().all(|space| {
            space.conversation_ids.iter().all(|id| {
                self.conversations
                    .get(id)
                    .map_or(true, |conversation| conversation.space_id == space.id)
            })
        });
        let listed_once = self.conversations.keys().all(|id| {
            self.spaces
                .values()
                .filter(|space| !space.id.is_sentinel())
                .filter(|space| space.conversation_ids.contains(id))
                .count()
                <= 1
        });
        every_space_known && lists_agree && listed_once
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub is_active: bool,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            is_active: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncSelection {
    pub space_id: Option<SpaceId>,
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone)]
pub struct SyncLayout {
    pub open_tabs: Vec<ConversationId>,
    pub sidebar_open: bool,
    pub grow_mode: bool,
    pub is_mobile: bool,
}

impl Default for SyncLayout {
    fn default() -> Self {
        Self {
            open_tabs: Vec::new(),
            sidebar_open: true,
            grow_mode: false,
            is_mobile: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncInteraction {
    pub highlighting: bool,
    pub buffered: SuppressionBuffer,
    pub messages_loading: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub xray: Option<Value>,
    pub show_xray: bool,
}

/// Everything one client session knows. Owned by a single task and mutated
/// only through [`crate::reducer::reduce`].
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub store: EntityStore,
    pub selection: SyncSelection,
    pub layout: SyncLayout,
    pub interaction: SyncInteraction,
    pub notifications: NotificationCenter,
    pub connection: ConnectionStatus,
    pub diagnostics: Diagnostics,
    pub stall_timer: StallTimer,
    pub user_profile: Value,
    pub conversation_settings: Option<(ConversationId, ConversationSettings)>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &Config) -> Self {
        Self {
            notifications: NotificationCenter::with_policy(NotificationPolicy::from(
                &config.notifications,
            )),
            stall_timer: StallTimer::new(config.sync.stall_warning_ms),
            ..Self::default()
        }
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.selection
            .conversation_id
            .and_then(|id| self.store.conversation(id))
    }

    pub fn selected_space(&self) -> Option<&Space> {
        self.selection.space_id.and_then(|id| self.store.space(id))
    }

    pub fn open_tabs(&self) -> &[ConversationId] {
        &self.layout.open_tabs
    }
}
