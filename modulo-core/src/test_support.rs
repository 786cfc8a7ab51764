//! Shared fixtures for unit tests.
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::cache::{CacheKey, CacheStore};
use crate::config::EngineConfig;
use crate::engine::SyncEngine;
use crate::remote::MemoryService;
use crate::types::*;

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
}

pub fn workspace(id: &str, name: &str) -> Workspace {
    Workspace {
        id: id.into(),
        name: name.into(),
        color: None,
        icon_path: None,
        created_at: fixed_time(),
        updated_at: fixed_time(),
        archived_at: None,
    }
}

pub fn board(id: &str, title: &str) -> Board {
    Board {
        id: id.into(),
        workspace_id: DEFAULT_WORKSPACE_ID.into(),
        title: title.into(),
        description: None,
        icon: "Folder".into(),
        emoji: None,
        color: None,
        created_at: fixed_time(),
        updated_at: fixed_time(),
        archived_at: None,
    }
}

pub fn column(board_id: &str, id: &str, title: &str, position: i64) -> Column {
    Column {
        id: id.into(),
        board_id: board_id.into(),
        title: title.into(),
        position,
        color: None,
        icon: "Circle".into(),
        is_enabled: true,
        wip_limit: None,
        created_at: fixed_time(),
        updated_at: fixed_time(),
        archived_at: None,
    }
}

/// Card titled after its ID.
pub fn card(board_id: &str, column_id: &str, id: &str, position: i64) -> Card {
    Card {
        id: id.into(),
        board_id: board_id.into(),
        column_id: column_id.into(),
        title: id.into(),
        description: None,
        position,
        priority: Priority::Medium,
        due_date: None,
        remind_at: None,
        subtasks: Vec::new(),
        tags: Vec::new(),
        created_at: fixed_time(),
        updated_at: fixed_time(),
        archived_at: None,
    }
}

pub fn subtask(board_id: &str, card_id: &str, id: &str, position: i64) -> Subtask {
    Subtask {
        id: id.into(),
        board_id: board_id.into(),
        card_id: card_id.into(),
        title: id.into(),
        is_completed: false,
        position,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub fn tag(board_id: &str, id: &str, label: &str) -> Tag {
    Tag {
        id: id.into(),
        board_id: board_id.into(),
        label: label.into(),
        color: None,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub fn note(board_id: &str, id: &str, title: &str) -> Note {
    Note {
        id: id.into(),
        board_id: board_id.into(),
        title: title.into(),
        content: String::new(),
        pinned: false,
        tags: Vec::new(),
        created_at: fixed_time(),
        updated_at: fixed_time(),
        archived_at: None,
    }
}

/// Board `b1` with "Todo" = [A, B, C] and "Done" = [D].
pub fn seeded_board() -> MemoryService {
    let service = MemoryService::new();
    service.seed(|t| {
        t.boards.push(board("b1", "Roadmap"));
        t.columns.push(column("b1", "todo", "Todo", 0));
        t.columns.push(column("b1", "done", "Done", 1));
        for (i, id) in ["A", "B", "C"].iter().enumerate() {
            t.cards.push(card("b1", "todo", id, i as i64));
        }
        t.cards.push(card("b1", "done", "D", 0));
    });
    service
}

pub fn engine_for(service: &Arc<MemoryService>) -> SyncEngine {
    engine_with_config(service, EngineConfig::default())
}

pub fn engine_with_config(service: &Arc<MemoryService>, config: EngineConfig) -> SyncEngine {
    SyncEngine::new(Arc::new(CacheStore::new()), service.clone(), config)
}

/// Engine over [`seeded_board`] with columns, cards and tags of `b1` loaded.
pub async fn loaded_engine() -> (Arc<MemoryService>, SyncEngine) {
    let service = Arc::new(seeded_board());
    let engine = engine_for(&service);
    for key in [
        CacheKey::Columns("b1".into()),
        CacheKey::Cards("b1".into()),
        CacheKey::Tags("b1".into()),
    ] {
        engine.load(&key).await.unwrap();
    }
    (service, engine)
}

/// (id, position) pairs, in order.
pub fn order<T: crate::position::Positioned>(items: &[T]) -> Vec<(String, i64)> {
    items
        .iter()
        .map(|i| (i.id().to_string(), i.position()))
        .collect()
}

pub fn pairs(expected: &[(&str, i64)]) -> Vec<(String, i64)> {
    expected.iter().map(|(id, p)| (id.to_string(), *p)).collect()
}
