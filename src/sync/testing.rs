//! In-process fakes for exercising the sync engine without a network.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{RemoteClient, RemoteItem, TargetInfo};
use crate::core::connection::{Connection, ConnectionConfig, ConnectionKind, NewConnection};
use crate::core::task::{NewTask, Task, TaskSource};
use crate::error::RemoteError;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Test(String),
    Fetch(String),
    PushCompletion(String, bool),
    PushText(String, String),
}

/// Serves a fixed item list per page and records every call in order.
#[derive(Default)]
pub struct RecordingRemote {
    pages: Mutex<HashMap<String, Vec<RemoteItem>>>,
    broken_pages: Mutex<HashSet<String>>,
    broken_items: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, page_id: &str, items: Vec<RemoteItem>) {
        self.pages.lock().unwrap().insert(page_id.to_string(), items);
    }

    /// Fetches for this page fail with 401.
    pub fn break_page(&self, page_id: &str) {
        self.broken_pages.lock().unwrap().insert(page_id.to_string());
    }

    /// Pushes to this item fail with 502.
    pub fn break_item(&self, item_id: &str) {
        self.broken_items.lock().unwrap().insert(item_id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_page(&self, page_id: &str) -> Result<(), RemoteError> {
        if self.broken_pages.lock().unwrap().contains(page_id) {
            return Err(RemoteError::Api {
                status: 401,
                code: "unauthorized".into(),
                message: "API token is invalid.".into(),
            });
        }
        Ok(())
    }

    fn check_item(&self, item_id: &str) -> Result<(), RemoteError> {
        if self.broken_items.lock().unwrap().contains(item_id) {
            return Err(RemoteError::Api {
                status: 502,
                code: "bad_gateway".into(),
                message: "upstream unavailable".into(),
            });
        }
        Ok(())
    }
}

impl RemoteClient for RecordingRemote {
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<TargetInfo, RemoteError> {
        self.record(Call::Test(config.page_id.clone()));
        self.check_page(&config.page_id)?;
        Ok(TargetInfo {
            title: format!("Page {}", config.page_id),
            property_names: vec!["title".into()],
        })
    }

    async fn fetch_items(&self, config: &ConnectionConfig) -> Result<Vec<RemoteItem>, RemoteError> {
        self.record(Call::Fetch(config.page_id.clone()));
        // Suspend once like a real request would, so overlapping cycles can interleave
        tokio::task::yield_now().await;
        self.check_page(&config.page_id)?;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&config.page_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_completion(
        &self,
        _config: &ConnectionConfig,
        item_id: &str,
        completed: bool,
    ) -> Result<(), RemoteError> {
        self.record(Call::PushCompletion(item_id.to_string(), completed));
        self.check_item(item_id)
    }

    async fn push_text(
        &self,
        _config: &ConnectionConfig,
        item_id: &str,
        text: &str,
    ) -> Result<(), RemoteError> {
        self.record(Call::PushText(item_id.to_string(), text.to_string()));
        self.check_item(item_id)
    }
}

pub fn item(id: &str, title: &str, completed: bool) -> RemoteItem {
    RemoteItem {
        source_id: id.to_string(),
        title: title.to_string(),
        completed,
        description: "Inbox".to_string(),
        source_url: Some(format!("https://www.notion.so/inbox#{}", id)),
    }
}

pub async fn add_connection(store: &impl Store, page_id: &str) -> Connection {
    store
        .create_connection(NewConnection {
            kind: ConnectionKind::Notion,
            name: format!("Notion {}", page_id),
            config: ConnectionConfig {
                token: "secret_test".into(),
                page_id: page_id.into(),
            },
            enabled: true,
        })
        .await
        .unwrap()
}

pub async fn add_linked_task(
    store: &impl Store,
    connection: &Connection,
    source_id: &str,
    title: &str,
    completed: bool,
) -> Task {
    store
        .create_task(NewTask {
            title: title.into(),
            completed,
            source: TaskSource::Notion,
            source_id: Some(source_id.into()),
            source_url: Some(format!("https://www.notion.so/inbox#{}", source_id)),
            connection_id: Some(connection.id),
            description: "Inbox".into(),
            due_date: None,
        })
        .await
        .unwrap()
}
