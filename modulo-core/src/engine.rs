/// The synchronization engine.
///
/// Owns the cache store handle, the remote service and the background
/// revalidator. Mutations live in `tx::*` as further `impl SyncEngine`
/// blocks; this file holds construction, reads and lifecycle.
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::cache::{CacheEvent, CacheKey, CacheStore, Snapshot};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::position;
use crate::refresh::{self, Revalidator};
use crate::remote::RemoteService;
use crate::types::{Board, Card, Column, Note, Tag, Workspace};

pub struct SyncEngine {
    pub(crate) store: Arc<CacheStore>,
    pub(crate) remote: Arc<dyn RemoteService>,
    pub(crate) config: EngineConfig,
    revalidator: Revalidator,
}

impl SyncEngine {
    pub fn new(
        store: Arc<CacheStore>,
        remote: Arc<dyn RemoteService>,
        config: EngineConfig,
    ) -> Self {
        let revalidator = Revalidator::new(store.clone(), remote.clone());
        Self {
            store,
            remote,
            config,
            revalidator,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.store.subscribe()
    }

    /// Current snapshot without touching the network.
    pub fn read(&self, key: &CacheKey) -> Option<Snapshot> {
        self.store.read(key)
    }

    /// Read-through: serve a fresh cached snapshot, otherwise fetch it.
    ///
    /// If a transaction writes the key while the fetch is in flight, the
    /// fetched rows are discarded and the newer cached value is returned.
    pub async fn load(&self, key: &CacheKey) -> Result<Snapshot, EngineError> {
        if !self.store.is_stale(key) {
            if let Some(snapshot) = self.store.read(key) {
                return Ok(snapshot);
            }
        }

        let ticket = self.store.invalidate(key);
        let fetched = refresh::fetch(self.remote.as_ref(), key)
            .await
            .map_err(|source| {
                log::warn!(target: "modulo.refresh", "Load of {} failed: {}", key, source);
                EngineError::Load {
                    key: key.clone(),
                    source,
                }
            })?;

        if self.store.complete_refresh(&ticket, fetched.clone()) {
            return Ok(fetched);
        }
        Ok(self.store.read(key).unwrap_or(fetched))
    }

    /// Mark `key` stale and refetch it in the background. The refetch is
    /// spawned on the current tokio runtime, if there is one.
    pub fn invalidate(&self, key: &CacheKey) {
        self.revalidator.invalidate(key);
    }

    /// Wait for every scheduled background refresh.
    pub async fn settled(&self) {
        self.revalidator.settled().await;
    }

    /// Abort pending refreshes and drop every cached collection.
    pub fn shutdown(&self) {
        self.revalidator.shutdown();
        self.store.clear();
        log::info!(target: "modulo.cache", "Engine shut down");
    }

    // Read helpers. Unknown keys read as empty.

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.read(&CacheKey::Workspaces)
            .and_then(|s| s.workspaces().map(<[Workspace]>::to_vec))
            .unwrap_or_default()
    }

    pub fn boards(&self) -> Vec<Board> {
        self.read(&CacheKey::Boards)
            .and_then(|s| s.boards().map(<[Board]>::to_vec))
            .unwrap_or_default()
    }

    /// Columns of a board, ordered by position.
    pub fn columns(&self, board_id: &str) -> Vec<Column> {
        let mut columns = self
            .read(&CacheKey::Columns(board_id.to_string()))
            .and_then(|s| s.columns().map(<[Column]>::to_vec))
            .unwrap_or_default();
        position::sort_by_position(&mut columns);
        columns
    }

    /// Cards of one column, ordered by position.
    pub fn cards_in_column(&self, board_id: &str, column_id: &str) -> Vec<Card> {
        let mut cards: Vec<Card> = self
            .read(&CacheKey::Cards(board_id.to_string()))
            .and_then(|s| s.cards().map(<[Card]>::to_vec))
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.column_id == column_id)
            .collect();
        position::sort_by_position(&mut cards);
        cards
    }

    pub fn card(&self, board_id: &str, card_id: &str) -> Option<Card> {
        self.read(&CacheKey::Cards(board_id.to_string()))?
            .cards()?
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
    }

    pub fn tags(&self, board_id: &str) -> Vec<Tag> {
        self.read(&CacheKey::Tags(board_id.to_string()))
            .and_then(|s| s.tags().map(<[Tag]>::to_vec))
            .unwrap_or_default()
    }

    pub fn notes(&self, board_id: &str) -> Vec<Note> {
        self.read(&CacheKey::Notes(board_id.to_string()))
            .and_then(|s| s.notes().map(<[Note]>::to_vec))
            .unwrap_or_default()
    }

    /// Caller-supplied ID, or a fresh one when blank.
    pub(crate) fn next_id(requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            requested.to_string()
        }
    }

    /// Schedule refreshes for keys a transaction touched.
    pub(crate) fn settle(&self, operation: &'static str, keys: &[CacheKey]) {
        if !self.config.settle_refresh {
            log::debug!(target: "modulo.tx", "{}: settle refresh disabled", operation);
            return;
        }
        for key in keys {
            self.revalidator.invalidate(key);
        }
    }
}
