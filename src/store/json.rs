use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, Tables};
use crate::core::connection::{Connection, ConnectionPatch, NewConnection};
use crate::core::now;
use crate::core::task::{NewTask, Task, TaskFilter, TaskPatch};
use crate::error::StoreError;

const TASKS_FILE: &str = "tasks.json";
const CONNECTIONS_FILE: &str = "connections.json";

/// Tasks and connections kept as two pretty-printed JSON files in one directory.
///
/// Every call re-reads the files, so edits made by another process between
/// calls are picked up. Writes go through a temp file and a rename.
pub struct JsonStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    fn connections_path(&self) -> PathBuf {
        self.dir.join(CONNECTIONS_FILE)
    }

    async fn load(&self) -> Result<Tables, StoreError> {
        Ok(Tables {
            tasks: read_json(&self.tasks_path()).await?,
            connections: read_json(&self.connections_path()).await?,
        })
    }

    async fn save(&self, tables: &Tables) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        write_json(&self.tasks_path(), &tables.tasks).await?;
        write_json(&self.connections_path(), &tables.connections).await
    }

    async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let tables = self.load().await?;
        Ok(f(&tables))
    }

    async fn write<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load().await?;
        let out = f(&mut tables)?;
        self.save(&tables).await?;
        Ok(out)
    }
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    // Per-write name so two processes never rename each other's temp file
    let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp, json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

impl Store for JsonStore {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.read(|t| t.list_tasks(filter)).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.read(|t| t.get_task(id)).await
    }

    async fn create_task(&self, fields: NewTask) -> Result<Task, StoreError> {
        self.write(|t| t.create_task(fields, now())).await
    }

    async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        self.write(|t| Ok(t.update_task(id, patch, now()))).await
    }

    async fn delete_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.write(|t| Ok(t.delete_task(id))).await
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, StoreError> {
        self.read(|t| t.list_connections()).await
    }

    async fn get_connection(&self, id: Uuid) -> Result<Option<Connection>, StoreError> {
        self.read(|t| t.get_connection(id)).await
    }

    async fn create_connection(&self, fields: NewConnection) -> Result<Connection, StoreError> {
        self.write(|t| Ok(t.create_connection(fields, now()))).await
    }

    async fn update_connection(
        &self,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> Result<Option<Connection>, StoreError> {
        self.write(|t| Ok(t.update_connection(id, patch))).await
    }

    async fn delete_connection(&self, id: Uuid) -> Result<Option<Connection>, StoreError> {
        self.write(|t| Ok(t.delete_connection(id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::{ConnectionConfig, ConnectionKind};
    use crate::core::task::TaskSource;

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        let conn = store
            .create_connection(NewConnection {
                kind: ConnectionKind::Notion,
                name: "Work".into(),
                config: ConnectionConfig {
                    token: "secret".into(),
                    page_id: "page".into(),
                },
                enabled: true,
            })
            .await
            .unwrap();
        let task = store
            .create_task(NewTask {
                source: TaskSource::Notion,
                source_id: Some("block-1".into()),
                source_url: Some("https://www.notion.so/page#block1".into()),
                connection_id: Some(conn.id),
                ..NewTask::local("Ship it")
            })
            .await
            .unwrap();

        let reopened = JsonStore::new(dir.path());
        let loaded = reopened.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
        let conns = reopened.list_connections().await.unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].name, "Work");
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("not-yet"));
        assert!(store.list_tasks(&TaskFilter::default()).await.unwrap().is_empty());
        assert!(store.list_connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TASKS_FILE), "{ not json").unwrap();
        let store = JsonStore::new(dir.path());
        let err = store.list_tasks(&TaskFilter::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn update_touches_only_patched_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let task = store.create_task(NewTask::local("Draft")).await.unwrap();

        let updated = store
            .update_task(
                task.id,
                TaskPatch {
                    title: Some("Final".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.created_at, task.created_at);
        assert!(!updated.completed);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension() == Some("tmp".as_ref()))
            .count();
        assert_eq!(leftovers, 0);
    }
}
