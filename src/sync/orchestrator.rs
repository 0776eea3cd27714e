use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use uuid::Uuid;

use super::reconcile::{ReconcileReport, Reconciler};
use super::{RemoteClient, SyncStatus};
use crate::core::now;
use crate::error::SyncError;
use crate::store::Store;

/// How one connection fared in a cycle.
#[derive(Debug)]
pub enum ConnectionOutcome {
    Synced {
        connection_id: Uuid,
        name: String,
        report: ReconcileReport,
    },
    Failed {
        connection_id: Uuid,
        name: String,
        error: SyncError,
    },
}

impl ConnectionOutcome {
    pub fn connection_id(&self) -> Uuid {
        match self {
            Self::Synced { connection_id, .. } | Self::Failed { connection_id, .. } => {
                *connection_id
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of one `sync_all` call.
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Another cycle was still running, so this one did nothing.
    pub skipped: bool,
    pub outcomes: Vec<ConnectionOutcome>,
}

impl SyncSummary {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs reconciliation over every enabled connection, one at a time.
pub struct SyncOrchestrator<S, R> {
    store: S,
    remote: R,
    in_flight: AtomicBool,
    status: Mutex<SyncStatus>,
}

impl<S: Store, R: RemoteClient> SyncOrchestrator<S, R> {
    pub fn new(store: S, remote: R) -> Self {
        Self {
            store,
            remote,
            in_flight: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn reconciler(&self) -> Reconciler<'_, S, R> {
        Reconciler::new(&self.store, &self.remote)
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Reconcile every enabled, supported connection in turn. A failing
    /// connection is logged and the rest still run. Nothing escapes.
    pub async fn sync_all(&self) -> SyncSummary {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            log::info!("Sync already in progress, skipping this run");
            return SyncSummary {
                skipped: true,
                ..Default::default()
            };
        };
        self.set_status(SyncStatus::Syncing);

        let mut summary = SyncSummary::default();
        let connections = match self.store.list_connections().await {
            Ok(c) => c,
            Err(e) => {
                log::error!("Failed to load connections: {}", e);
                self.set_status(SyncStatus::Error(e.to_string()));
                return summary;
            }
        };

        let reconciler = self.reconciler();
        for connection in connections.iter().filter(|c| c.is_syncable()) {
            let outcome = match reconciler.reconcile(connection).await {
                Ok(report) => ConnectionOutcome::Synced {
                    connection_id: connection.id,
                    name: connection.name.clone(),
                    report,
                },
                Err(error) => {
                    log::error!("Sync failed for '{}': {}", connection.name, error);
                    ConnectionOutcome::Failed {
                        connection_id: connection.id,
                        name: connection.name.clone(),
                        error,
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        let failures = summary.failures();
        if failures > 0 {
            self.set_status(SyncStatus::Error(format!(
                "{} of {} connections failed to sync",
                failures,
                summary.outcomes.len()
            )));
        } else {
            self.set_status(SyncStatus::LastSynced(now()));
        }
        log::info!(
            "Sync complete: {} connections, {} failed",
            summary.outcomes.len(),
            failures
        );
        summary
    }

    /// Sync now, then every `interval` until `shutdown` resolves. Ticks that
    /// fall due while a cycle is running are dropped, not queued.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Sync loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.sync_all().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::{ConnectionConfig, ConnectionKind, ConnectionPatch, NewConnection};
    use crate::store::MemoryStore;
    use crate::sync::testing::{Call, RecordingRemote, add_connection, item};

    fn fetches(remote: &RecordingRemote) -> Vec<String> {
        remote
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Fetch(page) => Some(page),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn failing_connection_does_not_block_others() {
        let store = MemoryStore::new();
        let remote = RecordingRemote::new();
        let broken = add_connection(&store, "page-a").await;
        let healthy = add_connection(&store, "page-b").await;
        remote.break_page("page-a");
        remote.set_items("page-b", vec![item("x", "Still synced", false)]);
        let orch = SyncOrchestrator::new(store, remote);

        let summary = orch.sync_all().await;

        assert_eq!(fetches(orch.remote()), vec!["page-a", "page-b"]);
        assert_eq!(summary.failures(), 1);
        let failed: Vec<Uuid> = summary
            .outcomes
            .iter()
            .filter(|o| o.is_failure())
            .map(|o| o.connection_id())
            .collect();
        assert_eq!(failed, vec![broken.id]);
        let healthy = orch.store().get_connection(healthy.id).await.unwrap().unwrap();
        assert!(healthy.last_synced_at.is_some());
        assert!(matches!(orch.status(), SyncStatus::Error(_)));
    }

    #[tokio::test]
    async fn skips_disabled_and_unsupported() {
        let store = MemoryStore::new();
        let remote = RecordingRemote::new();
        let off = add_connection(&store, "page-off").await;
        store
            .update_connection(
                off.id,
                ConnectionPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .create_connection(NewConnection {
                kind: ConnectionKind::Unsupported,
                name: "Future".into(),
                config: ConnectionConfig {
                    token: "t".into(),
                    page_id: "page-future".into(),
                },
                enabled: true,
            })
            .await
            .unwrap();
        add_connection(&store, "page-on").await;
        let orch = SyncOrchestrator::new(store, remote);

        let summary = orch.sync_all().await;

        assert_eq!(fetches(orch.remote()), vec!["page-on"]);
        assert_eq!(summary.outcomes.len(), 1);
        assert!(matches!(orch.status(), SyncStatus::LastSynced(_)));
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let store = MemoryStore::new();
        add_connection(&store, "page-a").await;
        let orch = SyncOrchestrator::new(store, RecordingRemote::new());

        let (first, second) = tokio::join!(orch.sync_all(), orch.sync_all());

        assert!(!first.skipped);
        assert!(second.skipped);
        assert_eq!(fetches(orch.remote()).len(), 1);

        // The guard is released once the first run finishes
        let third = orch.sync_all().await;
        assert!(!third.skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_start_and_every_interval() {
        let store = MemoryStore::new();
        add_connection(&store, "page-a").await;
        let orch = SyncOrchestrator::new(store, RecordingRemote::new());

        orch.run(
            Duration::from_secs(300),
            tokio::time::sleep(Duration::from_secs(650)),
        )
        .await;

        assert_eq!(fetches(orch.remote()).len(), 3);
    }
}
