pub mod connect;
pub mod notion;
pub mod orchestrator;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod testing;

use chrono::NaiveDateTime;

use crate::core::connection::ConnectionConfig;
use crate::error::RemoteError;

pub use connect::connect;
pub use notion::NotionClient;
pub use orchestrator::{ConnectionOutcome, SyncOrchestrator, SyncSummary};
pub use reconcile::{PushOutcome, ReconcileReport, Reconciler, TaskChanges};

/// A to-do as the remote side reports it. Never stored; it is folded into a
/// local task during pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub source_id: String,
    pub title: String,
    pub completed: bool,
    /// Context label, the title of the page the item sits on.
    pub description: String,
    pub source_url: Option<String>,
}

/// What a successful credentials check reports about the target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub title: String,
    pub property_names: Vec<String>,
}

/// The remote side of a connection. Every call carries the connection's
/// credentials; implementations hold no per-connection state.
#[allow(async_fn_in_trait)]
pub trait RemoteClient {
    /// Check that the credentials can see the target before a connection is saved.
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<TargetInfo, RemoteError>;

    /// Every to-do under the target, pagination and nesting flattened.
    async fn fetch_items(&self, config: &ConnectionConfig) -> Result<Vec<RemoteItem>, RemoteError>;

    async fn push_completion(
        &self,
        config: &ConnectionConfig,
        item_id: &str,
        completed: bool,
    ) -> Result<(), RemoteError>;

    async fn push_text(
        &self,
        config: &ConnectionConfig,
        item_id: &str,
        text: &str,
    ) -> Result<(), RemoteError>;
}

/// Current sync status for status indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error(String),
    LastSynced(NaiveDateTime),
}
