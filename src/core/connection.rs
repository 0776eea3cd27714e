use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Notion,
    /// A kind written by another version of wick. Kept so the store still loads.
    #[serde(other)]
    Unsupported,
}

impl ConnectionKind {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// The task source stamped on tasks pulled through this kind of connection.
    pub fn task_source(&self) -> Option<TaskSource> {
        match self {
            Self::Notion => Some(TaskSource::Notion),
            Self::Unsupported => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notion => "notion",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Credentials and target for a connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub token: String,
    /// Root page whose to-dos are mirrored, in dashed UUID form.
    pub page_id: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("token", &"<redacted>")
            .field("page_id", &self.page_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub kind: ConnectionKind,
    pub name: String,
    pub config: ConnectionConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_synced_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

fn default_enabled() -> bool {
    true
}

impl Connection {
    pub(crate) fn from_new(fields: NewConnection, now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: fields.kind,
            name: fields.name,
            config: fields.config,
            enabled: fields.enabled,
            last_synced_at: None,
            created_at: now,
        }
    }

    /// Whether the orchestrator should reconcile this connection.
    pub fn is_syncable(&self) -> bool {
        self.enabled && self.kind.is_supported()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    pub kind: ConnectionKind,
    pub name: String,
    pub config: ConnectionConfig,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionPatch {
    pub name: Option<String>,
    pub config: Option<ConnectionConfig>,
    pub enabled: Option<bool>,
    pub last_synced_at: Option<NaiveDateTime>,
}

impl ConnectionPatch {
    pub fn synced_at(at: NaiveDateTime) -> Self {
        Self {
            last_synced_at: Some(at),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, connection: &mut Connection) {
        if let Some(name) = self.name {
            connection.name = name;
        }
        if let Some(config) = self.config {
            connection.config = config;
        }
        if let Some(enabled) = self.enabled {
            connection.enabled = enabled;
        }
        if let Some(at) = self.last_synced_at {
            connection.last_synced_at = Some(at);
        }
    }
}
