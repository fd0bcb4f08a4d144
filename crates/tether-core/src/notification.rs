use serde::Deserialize;
use serde::Serialize;

use super::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
    ToolStart,
    ToolSuccess,
    ToolError,
}

impl NotificationKind {
    /// Alert severities the server does not define fall back to `Info`.
    pub fn from_wire(kind: Option<&str>) -> Self {
        match kind {
            Some("success") => Self::Success,
            Some("error") => Self::Error,
            Some("tool_start") => Self::ToolStart,
            Some("tool_success") => Self::ToolSuccess,
            Some("tool_error") => Self::ToolError,
            _ => Self::Info,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
            Self::ToolStart => "tool_start",
            Self::ToolSuccess => "tool_success",
            Self::ToolError => "tool_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub sticky: bool,
    pub kind: NotificationKind,
    pub expires_at_ms: Option<u64>,
}

/// How long each kind of notification stays up. `None` means it stays until
/// something replaces or dismisses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPolicy {
    pub default_ms: u64,
    pub tool_outcome_ms: u64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            default_ms: 4_000,
            tool_outcome_ms: 2_000,
        }
    }
}

impl From<&NotificationConfig> for NotificationPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            default_ms: config.default_ms,
            tool_outcome_ms: config.tool_outcome_ms,
        }
    }
}

impl NotificationPolicy {
    pub fn lifetime_ms(&self, kind: NotificationKind, sticky: bool) -> Option<u64> {
        if sticky {
            return None;
        }
        match kind {
            NotificationKind::ToolStart => None,
            NotificationKind::ToolSuccess | NotificationKind::ToolError => {
                Some(self.tool_outcome_ms)
            }
            NotificationKind::Info | NotificationKind::Success | NotificationKind::Error => {
                Some(self.default_ms)
            }
        }
    }
}

/// Holds the single active notification.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    pub policy: NotificationPolicy,
    current: Option<Notification>,
    next_id: u64,
}

impl NotificationCenter {
    pub fn with_policy(policy: NotificationPolicy) -> Self {
        Self {
            policy,
            current: None,
            next_id: 0,
        }
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    pub fn show(
        &mut self,
        message: impl Into<String>,
        sticky: bool,
        kind: NotificationKind,
        now_ms: u64,
    ) -> u64 {
        self.next_id += 1;
        let expires_at_ms = self
            .policy
            .lifetime_ms(kind, sticky)
            .map(|lifetime| now_ms.saturating_add(lifetime));
        self.current = Some(Notification {
            id: self.next_id,
            message: message.into(),
            sticky,
            kind,
            expires_at_ms,
        });
        self.next_id
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Drops the current notification once its deadline has passed. A
    /// notification shown after an older one never inherits its deadline.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        let expired = self
            .current
            .as_ref()
            .and_then(|notification| notification.expires_at_ms)
            .is_some_and(|deadline| deadline <= now_ms);
        if expired {
            self.current = None;
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.current
            .as_ref()
            .and_then(|notification| notification.expires_at_ms)
    }
}
