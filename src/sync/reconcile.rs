use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::{RemoteClient, RemoteItem};
use crate::core::connection::{Connection, ConnectionPatch};
use crate::core::now;
use crate::core::task::{NewTask, Task, TaskFilter, TaskPatch, TaskSource};
use crate::error::{RemoteError, StoreError, SyncError};
use crate::store::Store;

/// Result of pushing one task's completion flag.
#[derive(Debug)]
pub struct PushOutcome {
    pub task_id: Uuid,
    pub source_id: String,
    pub completed: bool,
    pub result: Result<(), RemoteError>,
}

/// What one reconciliation cycle did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Remote items pulled this cycle.
    pub item_count: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub pushes: Vec<PushOutcome>,
}

impl ReconcileReport {
    pub fn push_failures(&self) -> impl Iterator<Item = &PushOutcome> {
        self.pushes.iter().filter(|p| p.result.is_err())
    }
}

/// Which fields a user edit touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub completed: bool,
    pub title: bool,
}

#[derive(Debug, Default)]
struct PullStats {
    seen: HashSet<String>,
    created: usize,
    updated: usize,
    /// Extra local copies of one remote item, removed while indexing.
    deduplicated: usize,
}

/// Converges one connection's local tasks with its remote items.
pub struct Reconciler<'a, S, R> {
    store: &'a S,
    remote: &'a R,
}

impl<'a, S: Store, R: RemoteClient> Reconciler<'a, S, R> {
    pub fn new(store: &'a S, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Run push → pull → delete for one connection, then stamp `last_synced_at`.
    ///
    /// Fails when the remote listing fails (bad token, missing page) or the
    /// store does. A failure part-way leaves whatever was already applied;
    /// the next cycle finishes the job.
    pub async fn reconcile(&self, connection: &Connection) -> Result<ReconcileReport, SyncError> {
        let source = connection
            .kind
            .task_source()
            .ok_or_else(|| SyncError::UnsupportedConnection(connection.kind.as_str().to_string()))?;
        let filter = TaskFilter::for_connection(connection.id, source);

        log::info!("Reconciling connection '{}' ({})", connection.name, connection.id);

        // Phase 1: local completion state wins on the remote side
        let local = self.store.list_tasks(&filter).await?;
        let pushes = self.push_completions(connection, &local).await;
        let mut held = HashSet::new();
        for failure in pushes.iter().filter(|p| p.result.is_err()) {
            if let Err(ref e) = failure.result {
                log::warn!(
                    "Failed to push completion for {} (task {}): {}",
                    failure.source_id,
                    failure.task_id,
                    e
                );
            }
            held.insert(failure.task_id);
        }

        // Phase 2: remote wins on pulled fields
        let items = self.remote.fetch_items(&connection.config).await?;
        log::info!("Pulled {} remote items for '{}'", items.len(), connection.name);
        let pull = self.pull(connection, source, &filter, &items, &held).await?;

        // Phase 3: anything the remote no longer lists goes away locally
        let deleted = self.delete_orphans(&filter, &pull.seen).await?;

        self.store
            .update_connection(connection.id, ConnectionPatch::synced_at(now()))
            .await?;

        let report = ReconcileReport {
            item_count: items.len(),
            created: pull.created,
            updated: pull.updated,
            deleted: deleted + pull.deduplicated,
            pushes,
        };
        log::info!(
            "Reconciled '{}': {} items, {} created, {} updated, {} deleted, {} push failures",
            connection.name,
            report.item_count,
            report.created,
            report.updated,
            report.deleted,
            report.push_failures().count(),
        );
        Ok(report)
    }

    /// Send each linked task's `completed` flag. One result per task; the
    /// caller decides what a failure means.
    pub async fn push_completions(
        &self,
        connection: &Connection,
        tasks: &[Task],
    ) -> Vec<PushOutcome> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            if !task.belongs_to(connection.id) {
                continue;
            }
            let Some(ref source_id) = task.source_id else {
                continue;
            };
            log::debug!("Pushing completed={} for {}", task.completed, source_id);
            let result = self
                .remote
                .push_completion(&connection.config, source_id, task.completed)
                .await;
            outcomes.push(PushOutcome {
                task_id: task.id,
                source_id: source_id.clone(),
                completed: task.completed,
                result,
            });
        }
        outcomes
    }

    /// Apply remote items to local tasks. Tasks in `held` keep their local
    /// completion flag because its push has not landed yet.
    async fn pull(
        &self,
        connection: &Connection,
        source: TaskSource,
        filter: &TaskFilter,
        items: &[RemoteItem],
        held: &HashSet<Uuid>,
    ) -> Result<PullStats, StoreError> {
        let mut stats = PullStats::default();
        let mut local = self.store.list_tasks(filter).await?;
        // Oldest first, so the copy that survives is the original import
        local.sort_by_key(|t| t.created_at);

        let mut by_source_id: HashMap<String, Task> = HashMap::new();
        let mut duplicates = Vec::new();
        for task in local {
            let Some(source_id) = task.source_id.clone() else {
                continue;
            };
            match by_source_id.entry(source_id) {
                Entry::Occupied(_) => duplicates.push(task),
                Entry::Vacant(slot) => {
                    slot.insert(task);
                }
            }
        }
        // Two processes importing the same new item at once leave two copies
        for task in duplicates {
            log::warn!(
                "Removing duplicate of remote item {:?} ('{}')",
                task.source_id,
                task.title
            );
            if self.store.delete_task(task.id).await?.is_some() {
                stats.deduplicated += 1;
            }
        }

        for item in items {
            stats.seen.insert(item.source_id.clone());

            if let Some(task) = by_source_id.get_mut(&item.source_id) {
                let mut patch = TaskPatch {
                    title: Some(item.title.clone()),
                    description: Some(item.description.clone()),
                    completed: Some(item.completed),
                    source_url: Some(item.source_url.clone()),
                    ..Default::default()
                };
                if held.contains(&task.id) {
                    patch.completed = None;
                }
                let patch = patch.minus(task);
                if patch.is_empty() {
                    continue;
                }
                log::debug!("Updating '{}' from remote {}", task.title, item.source_id);
                // Deleted locally since the listing: nothing to update
                if let Some(updated) = self.store.update_task(task.id, patch).await? {
                    *task = updated;
                    stats.updated += 1;
                }
            } else {
                log::info!("Importing new remote item: {}", item.title);
                let created = self
                    .store
                    .create_task(NewTask {
                        title: item.title.clone(),
                        description: item.description.clone(),
                        completed: item.completed,
                        due_date: None,
                        source,
                        source_id: Some(item.source_id.clone()),
                        source_url: item.source_url.clone(),
                        connection_id: Some(connection.id),
                    })
                    .await?;
                by_source_id.insert(item.source_id.clone(), created);
                stats.created += 1;
            }
        }

        Ok(stats)
    }

    async fn delete_orphans(
        &self,
        filter: &TaskFilter,
        seen: &HashSet<String>,
    ) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for task in self.store.list_tasks(filter).await? {
            let Some(ref source_id) = task.source_id else {
                continue;
            };
            if seen.contains(source_id) {
                continue;
            }
            log::info!("Remote removed '{}', deleting locally", task.title);
            if self.store.delete_task(task.id).await?.is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Push a user edit straight away. Never fails: the next reconcile
    /// corrects anything that does not land.
    pub async fn push_single_task(&self, task: &Task, changes: TaskChanges) {
        let (Some(source_id), Some(connection_id)) = (&task.source_id, task.connection_id) else {
            return;
        };

        let connection = match self.store.get_connection(connection_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                log::warn!(
                    "Task '{}' points at a missing connection {}",
                    task.title,
                    connection_id
                );
                return;
            }
            Err(e) => {
                log::error!("Failed to load connection {}: {}", connection_id, e);
                return;
            }
        };
        if !connection.is_syncable() {
            log::debug!("Connection '{}' is not syncable, skipping push", connection.name);
            return;
        }

        if changes.completed {
            match self
                .remote
                .push_completion(&connection.config, source_id, task.completed)
                .await
            {
                Ok(()) => log::debug!("Pushed completed={} for {}", task.completed, source_id),
                Err(e) => log::warn!("Failed to push completion for '{}': {}", task.title, e),
            }
        }
        if changes.title {
            match self.remote.push_text(&connection.config, source_id, &task.title).await {
                Ok(()) => log::debug!("Pushed title for {}", source_id),
                Err(e) => log::warn!("Failed to push title for '{}': {}", task.title, e),
            }
        }
    }
}
