use std::sync::Mutex;

use uuid::Uuid;

use super::{Store, Tables};
use crate::core::connection::{Connection, ConnectionPatch, NewConnection};
use crate::core::now;
use crate::core::task::{NewTask, Task, TaskFilter, TaskPatch};
use crate::error::StoreError;

/// A store that lives only as long as the process. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        // A poisoned lock still holds consistent tables: every mutation is a single push/remove.
        let mut guard = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl Store for MemoryStore {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        Ok(self.with(|t| t.list_tasks(filter)))
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.with(|t| t.get_task(id)))
    }

    async fn create_task(&self, fields: NewTask) -> Result<Task, StoreError> {
        self.with(|t| t.create_task(fields, now()))
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        Ok(self.with(|t| t.update_task(id, patch, now())))
    }

    async fn delete_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.with(|t| t.delete_task(id)))
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, StoreError> {
        Ok(self.with(|t| t.list_connections()))
    }

    async fn get_connection(&self, id: Uuid) -> Result<Option<Connection>, StoreError> {
        Ok(self.with(|t| t.get_connection(id)))
    }

    async fn create_connection(&self, fields: NewConnection) -> Result<Connection, StoreError> {
        Ok(self.with(|t| t.create_connection(fields, now())))
    }

    async fn update_connection(
        &self,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> Result<Option<Connection>, StoreError> {
        Ok(self.with(|t| t.update_connection(id, patch)))
    }

    async fn delete_connection(&self, id: Uuid) -> Result<Option<Connection>, StoreError> {
        Ok(self.with(|t| t.delete_connection(id)))
    }
}
