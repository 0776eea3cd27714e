//! Local persistence for tasks and connections.
//!
//! The sync engine only ever talks to a [`Store`]; callers decide whether it
//! is backed by JSON files on disk or kept in memory.

pub mod json;
pub mod memory;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::core::connection::{Connection, ConnectionPatch, NewConnection};
use crate::core::task::{NewTask, Task, TaskFilter, TaskPatch, check_link, sort_tasks};
use crate::error::StoreError;

pub use json::JsonStore;
pub use memory::MemoryStore;

/// CRUD over tasks and connections. Every call is its own atomic unit;
/// nothing spans calls. Missing records come back as `Ok(None)`.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Tasks matching `filter`, incomplete first then newest first.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn create_task(&self, fields: NewTask) -> Result<Task, StoreError>;
    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Option<Task>, StoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn list_connections(&self) -> Result<Vec<Connection>, StoreError>;
    async fn get_connection(&self, id: Uuid) -> Result<Option<Connection>, StoreError>;
    async fn create_connection(&self, fields: NewConnection) -> Result<Connection, StoreError>;
    async fn update_connection(
        &self,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> Result<Option<Connection>, StoreError>;
    /// Removes the connection and every task it owns.
    async fn delete_connection(&self, id: Uuid) -> Result<Option<Connection>, StoreError>;
}

/// The full record set, shared by both store implementations.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub tasks: Vec<Task>,
    pub connections: Vec<Connection>,
}

impl Tables {
    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        tasks
    }

    pub fn get_task(&self, id: Uuid) -> Option<Task> {
        self.tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn create_task(&mut self, fields: NewTask, now: NaiveDateTime) -> Result<Task, StoreError> {
        check_link(fields.source, fields.source_id.as_deref(), fields.connection_id)
            .map_err(StoreError::Invalid)?;
        if let Some(conn_id) = fields.connection_id {
            if !self.connections.iter().any(|c| c.id == conn_id) {
                return Err(StoreError::Invalid(format!("unknown connection {}", conn_id)));
            }
        }
        let task = Task::from_new(fields, now);
        self.tasks.push(task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch, now: NaiveDateTime) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        patch.apply(task, now);
        Some(task.clone())
    }

    pub fn delete_task(&mut self, id: Uuid) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    pub fn list_connections(&self) -> Vec<Connection> {
        let mut connections = self.connections.clone();
        connections.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        connections
    }

    pub fn get_connection(&self, id: Uuid) -> Option<Connection> {
        self.connections.iter().find(|c| c.id == id).cloned()
    }

    pub fn create_connection(&mut self, fields: NewConnection, now: NaiveDateTime) -> Connection {
        let connection = Connection::from_new(fields, now);
        self.connections.push(connection.clone());
        connection
    }

    pub fn update_connection(&mut self, id: Uuid, patch: ConnectionPatch) -> Option<Connection> {
        let connection = self.connections.iter_mut().find(|c| c.id == id)?;
        patch.apply(connection);
        Some(connection.clone())
    }

    pub fn delete_connection(&mut self, id: Uuid) -> Option<Connection> {
        let idx = self.connections.iter().position(|c| c.id == id)?;
        let removed = self.connections.remove(idx);
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.belongs_to(id));
        log::info!(
            "Deleted connection '{}' and {} owned tasks",
            removed.name,
            before - self.tasks.len()
        );
        Some(removed)
    }
}
