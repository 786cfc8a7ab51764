/// Background revalidation.
///
/// Each invalidation takes a ticket from the store and spawns a task that
/// refetches the collection from the matching bulk loader. A result whose
/// ticket has been superseded by a later write is dropped by the store.
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::cache::{CacheKey, CacheStore, Snapshot};
use crate::remote::{RemoteResult, RemoteService};

/// Fetch the full collection for `key`.
pub async fn fetch(remote: &dyn RemoteService, key: &CacheKey) -> RemoteResult<Snapshot> {
    Ok(match key {
        CacheKey::Workspaces => Snapshot::Workspaces(remote.load_workspaces().await?),
        CacheKey::Boards => Snapshot::Boards(remote.load_boards().await?),
        CacheKey::Columns(board_id) => Snapshot::Columns(remote.load_columns(board_id).await?),
        CacheKey::Cards(board_id) => Snapshot::Cards(remote.load_cards(board_id).await?),
        CacheKey::Tags(board_id) => Snapshot::Tags(remote.load_tags(board_id).await?),
        CacheKey::Notes(board_id) => Snapshot::Notes(remote.load_notes(board_id).await?),
    })
}

pub struct Revalidator {
    store: Arc<CacheStore>,
    remote: Arc<dyn RemoteService>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Revalidator {
    pub fn new(store: Arc<CacheStore>, remote: Arc<dyn RemoteService>) -> Self {
        Self {
            store,
            remote,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `key` stale and refetch it in the background. Outside a tokio
    /// runtime the key is only marked stale; the next `load` refetches it.
    pub fn invalidate(&self, key: &CacheKey) {
        let ticket = self.store.invalidate(key);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!(
                target: "modulo.refresh",
                "No tokio runtime to refresh {}, leaving it stale",
                key
            );
            return;
        };
        let store = self.store.clone();
        let remote = self.remote.clone();

        let task = runtime.spawn(async move {
            match fetch(remote.as_ref(), &ticket.key).await {
                Ok(snapshot) => {
                    if store.complete_refresh(&ticket, snapshot) {
                        log::debug!(target: "modulo.refresh", "refreshed {}", ticket.key);
                    }
                }
                Err(e) => {
                    log::warn!(
                        target: "modulo.refresh",
                        "Refresh of {} failed, keeping stale snapshot: {}",
                        ticket.key,
                        e
                    );
                }
            }
        });

        let mut pending = self.pending();
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }

    /// Number of refreshes not yet finished.
    pub fn in_flight(&self) -> usize {
        self.pending().iter().filter(|t| !t.is_finished()).count()
    }

    /// Wait until every refresh scheduled so far (and any scheduled while
    /// waiting) has finished.
    pub async fn settled(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending());
            if batch.is_empty() {
                return;
            }
            for task in batch {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        log::warn!(target: "modulo.refresh", "Refresh task panicked: {}", e);
                    }
                }
            }
        }
    }

    /// Abort every pending refresh.
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.pending().drain(..).collect();
        if !tasks.is_empty() {
            log::info!(target: "modulo.refresh", "Aborting {} pending refresh(es)", tasks.len());
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for Revalidator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
