/// In-memory persistence service.
///
/// Applies the same server-side rules as the SQLite backend:
/// - titles trimmed and validated, colours and icons checked
/// - target indices clamped, sibling positions renumbered densely after
///   every structural change
/// - columns with active cards cannot be deleted
/// - WIP limits enforced when a card enters a full column
/// - tag assignments restricted to the card's board, returned ordered by ID
///
/// Test hooks: `fail_next` queues a one-shot rejection per operation,
/// `hold_loads` holds bulk-load responses and `hold_mutations` holds
/// mutation responses until the returned guard is dropped.
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::*;
use crate::error::RemoteError;
use crate::position::{self, Scope};
use crate::types::{cards_of_column, DEFAULT_WORKSPACE_ID};
use crate::validate;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_TAG_LABEL_LENGTH: usize = 100;
const DEFAULT_BOARD_ICON: &str = "Folder";
const DEFAULT_COLUMN_ICON: &str = "Circle";

/// Raw rows. Cards are stored without embedded subtasks and tags; those are
/// joined in by `load_cards`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub workspaces: Vec<Workspace>,
    pub boards: Vec<Board>,
    pub columns: Vec<Column>,
    pub cards: Vec<Card>,
    pub subtasks: Vec<Subtask>,
    pub tags: Vec<Tag>,
    /// (card_id, tag_id)
    pub card_tags: Vec<(String, String)>,
    pub notes: Vec<Note>,
}

pub struct MemoryService {
    tables: Mutex<MemoryTables>,
    failures: Mutex<HashMap<&'static str, VecDeque<RemoteError>>>,
    load_gate: Arc<RwLock<()>>,
    mutation_gate: Arc<RwLock<()>>,
    load_counts: Mutex<HashMap<&'static str, usize>>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn not_found(kind: &'static str, id: &str) -> RemoteError {
    RemoteError::NotFound {
        kind,
        id: id.to_string(),
    }
}

impl MemoryService {
    /// Empty service holding only the default workspace.
    pub fn new() -> Self {
        let now = Utc::now();
        let tables = MemoryTables {
            workspaces: vec![Workspace {
                id: DEFAULT_WORKSPACE_ID.to_string(),
                name: "Default Workspace".to_string(),
                color: Some("#6366F1".to_string()),
                icon_path: None,
                created_at: now,
                updated_at: now,
                archived_at: None,
            }],
            ..Default::default()
        };
        Self {
            tables: Mutex::new(tables),
            failures: Mutex::new(HashMap::new()),
            load_gate: Arc::new(RwLock::new(())),
            mutation_gate: Arc::new(RwLock::new(())),
            load_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Mutate the raw tables directly (fixtures).
    pub fn seed<F: FnOnce(&mut MemoryTables)>(&self, f: F) {
        f(&mut lock(&self.tables));
    }

    /// Copy of the raw tables (assertions).
    pub fn tables(&self) -> MemoryTables {
        lock(&self.tables).clone()
    }

    /// Make the next call to `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: RemoteError) {
        lock(&self.failures)
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Hold every bulk-load response until the guard is dropped.
    pub async fn hold_loads(&self) -> OwnedRwLockWriteGuard<()> {
        self.load_gate.clone().write_owned().await
    }

    /// Hold every mutation until the guard is dropped. An injected failure
    /// is claimed when the call arrives, not when it is released.
    pub async fn hold_mutations(&self) -> OwnedRwLockWriteGuard<()> {
        self.mutation_gate.clone().write_owned().await
    }

    /// How many times the loader for `kind` ("cards", "columns", ...) ran.
    pub fn load_count(&self, kind: &str) -> usize {
        lock(&self.load_counts).get(kind).copied().unwrap_or(0)
    }

    fn take_failure(&self, operation: &'static str) -> RemoteResult<()> {
        match lock(&self.failures).get_mut(operation).and_then(|q| q.pop_front()) {
            Some(err) => {
                log::debug!(target: "modulo.remote.memory", "injected failure for {}", operation);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Claim any injected failure for `operation`, then wait for the
    /// mutation gate before the write is applied.
    async fn admit(&self, operation: &'static str) -> RemoteResult<()> {
        let claimed = self.take_failure(operation);
        drop(self.mutation_gate.read().await);
        claimed
    }

    /// Hand back rows read at call time once the load gate opens, so a held
    /// gate models a response that is still on the wire.
    async fn served<T: Send>(&self, kind: &'static str, rows: T) -> RemoteResult<T> {
        drop(self.load_gate.read().await);
        *lock(&self.load_counts).entry(kind).or_insert(0) += 1;
        self.take_failure(kind)?;
        Ok(rows)
    }
}

impl MemoryTables {
    fn board(&self, id: &str) -> RemoteResult<&Board> {
        self.boards
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found("board", id))
    }

    fn column_index(&self, id: &str, board_id: &str) -> RemoteResult<usize> {
        let index = self
            .columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| not_found("column", id))?;
        if self.columns[index].board_id != board_id {
            return Err(RemoteError::Constraint(format!(
                "column {} does not belong to board {}",
                id, board_id
            )));
        }
        Ok(index)
    }

    fn card_index(&self, id: &str, board_id: &str) -> RemoteResult<usize> {
        let index = self
            .cards
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| not_found("card", id))?;
        if self.cards[index].board_id != board_id {
            return Err(RemoteError::Constraint(format!(
                "card {} does not belong to board {}",
                id, board_id
            )));
        }
        Ok(index)
    }

    fn subtask_index(&self, id: &str, board_id: &str, card_id: &str) -> RemoteResult<usize> {
        let index = self
            .subtasks
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| not_found("subtask", id))?;
        let subtask = &self.subtasks[index];
        if subtask.board_id != board_id || subtask.card_id != card_id {
            return Err(RemoteError::Constraint(format!(
                "subtask {} does not belong to card {}",
                id, card_id
            )));
        }
        Ok(index)
    }

    fn tag_index(&self, id: &str, board_id: &str) -> RemoteResult<usize> {
        self.tags
            .iter()
            .position(|t| t.id == id && t.board_id == board_id)
            .ok_or_else(|| not_found("tag", id))
    }

    fn ensure_unique_id<'a>(
        mut ids: impl Iterator<Item = &'a str>,
        id: &str,
    ) -> RemoteResult<()> {
        if id.trim().is_empty() {
            return Err(RemoteError::Invalid("identifier must not be empty".into()));
        }
        if ids.any(|existing| existing == id) {
            return Err(RemoteError::Constraint(format!("duplicate id {}", id)));
        }
        Ok(())
    }

    /// Replace the board's columns with `ordered` (already renumbered).
    fn store_columns(&mut self, board_id: &str, ordered: Vec<Column>) {
        self.columns.retain(|c| c.board_id != board_id);
        self.columns.extend(ordered);
    }

    fn board_columns(&self, board_id: &str) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect();
        position::sort_by_position(&mut columns);
        columns
    }

    fn column_cards(&self, column_id: &str) -> Vec<Card> {
        cards_of_column(&self.cards, column_id)
            .into_iter()
            .cloned()
            .collect()
    }

    fn store_column_cards(&mut self, column_id: &str, ordered: Vec<Card>) {
        let ids: BTreeSet<String> = ordered.iter().map(|c| c.id.clone()).collect();
        self.cards
            .retain(|c| c.column_id != column_id && !ids.contains(&c.id));
        self.cards.extend(ordered);
    }

    fn card_subtasks(&self, card_id: &str) -> Vec<Subtask> {
        let mut subtasks: Vec<Subtask> = self
            .subtasks
            .iter()
            .filter(|s| s.card_id == card_id)
            .cloned()
            .collect();
        position::sort_by_position(&mut subtasks);
        subtasks
    }

    fn store_card_subtasks(&mut self, card_id: &str, ordered: Vec<Subtask>) {
        self.subtasks.retain(|s| s.card_id != card_id);
        self.subtasks.extend(ordered);
    }

    fn check_wip(&self, column: &Column, moving_card: Option<&str>) -> RemoteResult<()> {
        let Some(limit) = column.wip_limit else {
            return Ok(());
        };
        let occupied = self
            .cards
            .iter()
            .filter(|c| c.column_id == column.id && c.is_active())
            .filter(|c| Some(c.id.as_str()) != moving_card)
            .count() as i64;
        if occupied >= limit {
            return Err(RemoteError::WipLimitExceeded {
                column_id: column.id.clone(),
                limit,
            });
        }
        Ok(())
    }

    fn card_tags(&self, card_id: &str) -> Vec<Tag> {
        let mut ids: Vec<&str> = self
            .card_tags
            .iter()
            .filter(|(c, _)| c == card_id)
            .map(|(_, t)| t.as_str())
            .collect();
        ids.sort_unstable();
        ids.iter()
            .filter_map(|id| self.tags.iter().find(|t| t.id == *id).cloned())
            .collect()
    }

    fn set_card_tags(
        &mut self,
        card_id: &str,
        board_id: &str,
        tag_ids: &[String],
    ) -> RemoteResult<Vec<Tag>> {
        let ordered: BTreeSet<String> = tag_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        for id in &ordered {
            if !self.tags.iter().any(|t| &t.id == id && t.board_id == board_id) {
                return Err(RemoteError::Invalid(format!(
                    "tag {} does not exist on board {}",
                    id, board_id
                )));
            }
        }
        self.card_tags.retain(|(c, _)| c != card_id);
        for id in ordered {
            self.card_tags.push((card_id.to_string(), id));
        }
        if let Some(card) = self.cards.iter_mut().find(|c| c.id == card_id) {
            card.updated_at = Utc::now();
        }
        Ok(self.card_tags(card_id))
    }
}

#[async_trait]
impl RemoteService for MemoryService {
    async fn load_workspaces(&self) -> RemoteResult<Vec<Workspace>> {
        let mut workspaces = lock(&self.tables).workspaces.clone();
        workspaces.sort_by_key(|w| w.created_at);
        self.served("workspaces", workspaces).await
    }

    async fn load_boards(&self) -> RemoteResult<Vec<Board>> {
        let mut boards = lock(&self.tables).boards.clone();
        boards.sort_by_key(|b| b.created_at);
        self.served("boards", boards).await
    }

    async fn load_columns(&self, board_id: &str) -> RemoteResult<Vec<Column>> {
        let columns = lock(&self.tables).board_columns(board_id);
        self.served("columns", columns).await
    }

    async fn load_cards(&self, board_id: &str) -> RemoteResult<Vec<Card>> {
        let cards = {
            let tables = lock(&self.tables);
            let mut cards: Vec<Card> = tables
                .cards
                .iter()
                .filter(|c| c.board_id == board_id)
                .map(|c| Card {
                    subtasks: tables.card_subtasks(&c.id),
                    tags: tables.card_tags(&c.id),
                    ..c.clone()
                })
                .collect();
            cards.sort_by(|a, b| {
                a.column_id
                    .cmp(&b.column_id)
                    .then(a.position.cmp(&b.position))
            });
            cards
        };
        self.served("cards", cards).await
    }

    async fn load_tags(&self, board_id: &str) -> RemoteResult<Vec<Tag>> {
        let mut tags: Vec<Tag> = lock(&self.tables)
            .tags
            .iter()
            .filter(|t| t.board_id == board_id)
            .cloned()
            .collect();
        tags.sort_by_key(|t| t.label.to_lowercase());
        self.served("tags", tags).await
    }

    async fn load_notes(&self, board_id: &str) -> RemoteResult<Vec<Note>> {
        let mut notes: Vec<Note> = lock(&self.tables)
            .notes
            .iter()
            .filter(|n| n.board_id == board_id && n.archived_at.is_none())
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.pinned.cmp(&a.pinned).then(b.updated_at.cmp(&a.updated_at)));
        self.served("notes", notes).await
    }

    async fn create_workspace(&self, req: CreateWorkspace) -> RemoteResult<Workspace> {
        self.admit("create_workspace").await?;
        let name = validate::title(&req.name, "workspace name", MAX_TITLE_LENGTH)?;
        let color = validate::color(req.color, "workspace")?;
        let mut tables = lock(&self.tables);
        MemoryTables::ensure_unique_id(tables.workspaces.iter().map(|w| w.id.as_str()), &req.id)?;
        let now = Utc::now();
        let workspace = Workspace {
            id: req.id,
            name,
            color,
            icon_path: validate::optional_text(req.icon_path),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        tables.workspaces.push(workspace.clone());
        Ok(workspace)
    }

    async fn update_workspace(&self, req: UpdateWorkspace) -> RemoteResult<()> {
        self.admit("update_workspace").await?;
        let name = req
            .name
            .try_map(|n| validate::title(&n, "workspace name", MAX_TITLE_LENGTH))?;
        let color = req.color.try_map(|c| validate::color(c, "workspace"))?;
        let mut tables = lock(&self.tables);
        let workspace = tables
            .workspaces
            .iter_mut()
            .find(|w| w.id == req.id)
            .ok_or_else(|| not_found("workspace", &req.id))?;
        let changed = name.apply_to(&mut workspace.name) | color.apply_to(&mut workspace.color);
        if changed {
            workspace.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_workspace(&self, id: &str) -> RemoteResult<()> {
        self.admit("delete_workspace").await?;
        if id == DEFAULT_WORKSPACE_ID {
            return Err(RemoteError::Constraint(
                "the default workspace cannot be removed".into(),
            ));
        }
        let mut tables = lock(&self.tables);
        if !tables.workspaces.iter().any(|w| w.id == id) {
            return Err(not_found("workspace", id));
        }
        let boards = tables.boards.iter().filter(|b| b.workspace_id == id).count();
        if boards > 0 {
            return Err(RemoteError::Constraint(format!(
                "workspace {} still owns {} board(s)",
                id, boards
            )));
        }
        tables.workspaces.retain(|w| w.id != id);
        Ok(())
    }

    async fn create_board(&self, req: CreateBoard) -> RemoteResult<()> {
        self.admit("create_board").await?;
        let title = validate::title(&req.title, "board title", MAX_TITLE_LENGTH)?;
        let icon = validate::board_icon(req.icon)?.unwrap_or_else(|| DEFAULT_BOARD_ICON.into());
        let mut tables = lock(&self.tables);
        if !tables.workspaces.iter().any(|w| w.id == req.workspace_id) {
            return Err(not_found("workspace", &req.workspace_id));
        }
        MemoryTables::ensure_unique_id(tables.boards.iter().map(|b| b.id.as_str()), &req.id)?;
        let now = Utc::now();
        tables.boards.push(Board {
            id: req.id,
            workspace_id: req.workspace_id,
            title,
            description: validate::optional_text(req.description),
            icon,
            emoji: validate::optional_text(req.emoji),
            color: validate::optional_text(req.color),
            created_at: now,
            updated_at: now,
            archived_at: None,
        });
        Ok(())
    }

    async fn update_board(&self, req: UpdateBoard) -> RemoteResult<()> {
        self.admit("update_board").await?;
        let title = req
            .title
            .try_map(|t| validate::title(&t, "board title", MAX_TITLE_LENGTH))?;
        let description = req.description.map(validate::optional_text);
        let icon = req.icon.try_map(|i| {
            validate::board_icon(Some(i)).map(|v| v.unwrap_or_else(|| DEFAULT_BOARD_ICON.into()))
        })?;
        let mut tables = lock(&self.tables);
        if let Patch::Set(workspace_id) = &req.workspace_id {
            if !tables.workspaces.iter().any(|w| &w.id == workspace_id) {
                return Err(not_found("workspace", workspace_id));
            }
        }
        let board = tables
            .boards
            .iter_mut()
            .find(|b| b.id == req.id)
            .ok_or_else(|| not_found("board", &req.id))?;
        let changed = title.apply_to(&mut board.title)
            | description.apply_to(&mut board.description)
            | icon.apply_to(&mut board.icon)
            | req.workspace_id.apply_to(&mut board.workspace_id);
        if changed {
            board.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_board(&self, id: &str) -> RemoteResult<()> {
        self.admit("delete_board").await?;
        let mut tables = lock(&self.tables);
        tables.board(id)?;
        let card_ids: BTreeSet<String> = tables
            .cards
            .iter()
            .filter(|c| c.board_id == id)
            .map(|c| c.id.clone())
            .collect();
        tables.boards.retain(|b| b.id != id);
        tables.columns.retain(|c| c.board_id != id);
        tables.cards.retain(|c| c.board_id != id);
        tables.subtasks.retain(|s| s.board_id != id);
        tables.tags.retain(|t| t.board_id != id);
        tables.card_tags.retain(|(c, _)| !card_ids.contains(c));
        tables.notes.retain(|n| n.board_id != id);
        Ok(())
    }

    async fn create_column(&self, req: CreateColumn) -> RemoteResult<()> {
        self.admit("create_column").await?;
        let title = validate::title(&req.title, "column title", MAX_TITLE_LENGTH)?;
        let color = validate::color(req.color, "column")?;
        let icon = validate::column_icon(req.icon)?.unwrap_or_else(|| DEFAULT_COLUMN_ICON.into());
        let wip_limit = validate::wip_limit(req.wip_limit)?;
        let mut tables = lock(&self.tables);
        tables.board(&req.board_id)?;
        MemoryTables::ensure_unique_id(tables.columns.iter().map(|c| c.id.as_str()), &req.id)?;
        let now = Utc::now();
        let column = Column {
            id: req.id,
            board_id: req.board_id.clone(),
            title,
            position: 0,
            color,
            icon,
            is_enabled: req.is_enabled.unwrap_or(true),
            wip_limit,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        let ordered = position::insert_at(
            &tables.board_columns(&req.board_id),
            column,
            req.position,
            Scope::Columns.base(),
        );
        tables.store_columns(&req.board_id, ordered);
        Ok(())
    }

    async fn move_column(&self, req: MoveColumn) -> RemoteResult<()> {
        self.admit("move_column").await?;
        let mut tables = lock(&self.tables);
        tables.column_index(&req.column_id, &req.board_id)?;
        let ordered = position::reorder(
            &tables.board_columns(&req.board_id),
            &req.column_id,
            req.target_index,
            Scope::Columns.base(),
        )
        .ok_or_else(|| not_found("column", &req.column_id))?;
        tables.store_columns(&req.board_id, ordered);
        Ok(())
    }

    async fn update_column(&self, req: UpdateColumn) -> RemoteResult<()> {
        self.admit("update_column").await?;
        let title = req
            .title
            .try_map(|t| validate::title(&t, "column title", MAX_TITLE_LENGTH))?;
        let color = req.color.try_map(|c| validate::color(c, "column"))?;
        let icon = req.icon.try_map(validate::column_icon)?;
        let mut tables = lock(&self.tables);
        let index = tables.column_index(&req.id, &req.board_id)?;
        let column = &mut tables.columns[index];
        let mut changed = title.apply_to(&mut column.title) | color.apply_to(&mut column.color);
        if let Patch::Set(icon) = icon {
            column.icon = icon.unwrap_or_else(|| DEFAULT_COLUMN_ICON.into());
            changed = true;
        }
        changed |= req.is_enabled.apply_to(&mut column.is_enabled);
        if changed {
            column.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_column(&self, id: &str, board_id: &str) -> RemoteResult<()> {
        self.admit("delete_column").await?;
        let mut tables = lock(&self.tables);
        tables.column_index(id, board_id)?;
        let cards = tables
            .cards
            .iter()
            .filter(|c| c.column_id == id && c.is_active())
            .count();
        if cards > 0 {
            return Err(RemoteError::ColumnNotEmpty {
                column_id: id.to_string(),
                cards,
            });
        }
        let remaining = position::remove(&tables.board_columns(board_id), id, Scope::Columns.base())
            .ok_or_else(|| not_found("column", id))?;
        tables.store_columns(board_id, remaining);
        Ok(())
    }

    async fn create_card(&self, req: CreateCard) -> RemoteResult<()> {
        self.admit("create_card").await?;
        let title = validate::title(&req.title, "card title", MAX_TITLE_LENGTH)?;
        let mut tables = lock(&self.tables);
        let column_index = tables.column_index(&req.column_id, &req.board_id)?;
        let column = tables.columns[column_index].clone();
        tables.check_wip(&column, None)?;
        MemoryTables::ensure_unique_id(tables.cards.iter().map(|c| c.id.as_str()), &req.id)?;
        let now = Utc::now();
        let card = Card {
            id: req.id.clone(),
            board_id: req.board_id.clone(),
            column_id: req.column_id.clone(),
            title,
            description: validate::optional_text(req.description),
            position: 0,
            priority: req.priority,
            due_date: validate::optional_text(req.due_date),
            remind_at: None,
            subtasks: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        let ordered = position::insert_at(
            &tables.column_cards(&req.column_id),
            card,
            req.position,
            Scope::Cards.base(),
        );
        tables.store_column_cards(&req.column_id, ordered);
        if let Err(err) = tables.set_card_tags(&req.id, &req.board_id, &req.tag_ids) {
            // Undo the insert so a rejected create leaves nothing behind.
            let remaining = position::remove(
                &tables.column_cards(&req.column_id),
                &req.id,
                Scope::Cards.base(),
            )
            .unwrap_or_default();
            tables.cards.retain(|c| c.id != req.id);
            tables.store_column_cards(&req.column_id, remaining);
            return Err(err);
        }
        Ok(())
    }

    async fn update_card(&self, req: UpdateCard) -> RemoteResult<()> {
        self.admit("update_card").await?;
        let title = req
            .title
            .try_map(|t| validate::title(&t, "card title", MAX_TITLE_LENGTH))?;
        let mut tables = lock(&self.tables);
        let index = tables.card_index(&req.id, &req.board_id)?;
        let card = &mut tables.cards[index];
        let changed = title.apply_to(&mut card.title)
            | req
                .description
                .map(validate::optional_text)
                .apply_to(&mut card.description)
            | req.priority.apply_to(&mut card.priority)
            | req
                .due_date
                .map(validate::optional_text)
                .apply_to(&mut card.due_date)
            | req
                .remind_at
                .map(validate::optional_text)
                .apply_to(&mut card.remind_at);
        if changed {
            card.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_card(&self, id: &str, board_id: &str) -> RemoteResult<()> {
        self.admit("delete_card").await?;
        let mut tables = lock(&self.tables);
        let index = tables.card_index(id, board_id)?;
        let column_id = tables.cards[index].column_id.clone();
        let remaining = position::remove(&tables.column_cards(&column_id), id, Scope::Cards.base())
            .ok_or_else(|| not_found("card", id))?;
        tables.cards.retain(|c| c.id != id);
        tables.store_column_cards(&column_id, remaining);
        tables.subtasks.retain(|s| s.card_id != id);
        tables.card_tags.retain(|(c, _)| c != id);
        Ok(())
    }

    async fn move_card(&self, req: MoveCard) -> RemoteResult<()> {
        self.admit("move_card").await?;
        let mut tables = lock(&self.tables);
        let index = tables.card_index(&req.card_id, &req.board_id)?;
        if tables.cards[index].column_id != req.from_column_id {
            return Err(RemoteError::Constraint(format!(
                "card {} is not in column {}",
                req.card_id, req.from_column_id
            )));
        }
        let to_index = tables.column_index(&req.to_column_id, &req.board_id)?;
        let base = Scope::Cards.base();

        if req.from_column_id == req.to_column_id {
            let ordered = position::reorder(
                &tables.column_cards(&req.from_column_id),
                &req.card_id,
                req.target_index,
                base,
            )
            .ok_or_else(|| not_found("card", &req.card_id))?;
            tables.store_column_cards(&req.from_column_id, ordered);
            return Ok(());
        }

        let destination = tables.columns[to_index].clone();
        tables.check_wip(&destination, Some(&req.card_id))?;
        let to_column_id = req.to_column_id.clone();
        let moved = position::move_across(
            &tables.column_cards(&req.from_column_id),
            &tables.column_cards(&req.to_column_id),
            &req.card_id,
            req.target_index,
            base,
            |card| {
                card.column_id = to_column_id;
                card.updated_at = Utc::now();
            },
        )
        .ok_or_else(|| not_found("card", &req.card_id))?;
        tables.store_column_cards(&req.from_column_id, moved.source);
        tables.store_column_cards(&req.to_column_id, moved.destination);
        Ok(())
    }

    async fn create_subtask(&self, req: CreateSubtask) -> RemoteResult<Subtask> {
        self.admit("create_subtask").await?;
        let title = validate::title(&req.title, "subtask title", MAX_TITLE_LENGTH)?;
        let mut tables = lock(&self.tables);
        tables.card_index(&req.card_id, &req.board_id)?;
        MemoryTables::ensure_unique_id(tables.subtasks.iter().map(|s| s.id.as_str()), &req.id)?;
        let existing = tables.card_subtasks(&req.card_id);
        let target = req.position.unwrap_or(existing.len() as i64);
        let now = Utc::now();
        let subtask = Subtask {
            id: req.id.clone(),
            board_id: req.board_id,
            card_id: req.card_id.clone(),
            title,
            is_completed: false,
            position: 0,
            created_at: now,
            updated_at: now,
        };
        let ordered = position::insert_at(&existing, subtask, target, Scope::Subtasks.base());
        let created = ordered
            .iter()
            .find(|s| s.id == req.id)
            .cloned()
            .ok_or_else(|| not_found("subtask", &req.id))?;
        tables.store_card_subtasks(&req.card_id, ordered);
        Ok(created)
    }

    async fn update_subtask(&self, req: UpdateSubtask) -> RemoteResult<Subtask> {
        self.admit("update_subtask").await?;
        let title = req
            .title
            .try_map(|t| validate::title(&t, "subtask title", MAX_TITLE_LENGTH))?;
        let mut tables = lock(&self.tables);
        let index = tables.subtask_index(&req.id, &req.board_id, &req.card_id)?;
        {
            let subtask = &mut tables.subtasks[index];
            let changed =
                title.apply_to(&mut subtask.title) | req.is_completed.apply_to(&mut subtask.is_completed);
            if changed {
                subtask.updated_at = Utc::now();
            }
        }
        if let Some(target) = req.target_position {
            let ordered = position::reorder(
                &tables.card_subtasks(&req.card_id),
                &req.id,
                target,
                Scope::Subtasks.base(),
            )
            .ok_or_else(|| not_found("subtask", &req.id))?;
            tables.store_card_subtasks(&req.card_id, ordered);
        }
        tables
            .subtasks
            .iter()
            .find(|s| s.id == req.id)
            .cloned()
            .ok_or_else(|| not_found("subtask", &req.id))
    }

    async fn delete_subtask(&self, req: DeleteSubtask) -> RemoteResult<()> {
        self.admit("delete_subtask").await?;
        let mut tables = lock(&self.tables);
        tables.subtask_index(&req.id, &req.board_id, &req.card_id)?;
        let remaining = position::remove(
            &tables.card_subtasks(&req.card_id),
            &req.id,
            Scope::Subtasks.base(),
        )
        .ok_or_else(|| not_found("subtask", &req.id))?;
        tables.store_card_subtasks(&req.card_id, remaining);
        Ok(())
    }

    async fn create_tag(&self, req: CreateTag) -> RemoteResult<Tag> {
        self.admit("create_tag").await?;
        let label = validate::title(&req.label, "tag label", MAX_TAG_LABEL_LENGTH)?;
        let color = validate::color(req.color, "tag")?;
        let mut tables = lock(&self.tables);
        tables.board(&req.board_id)?;
        MemoryTables::ensure_unique_id(tables.tags.iter().map(|t| t.id.as_str()), &req.id)?;
        let now = Utc::now();
        let tag = Tag {
            id: req.id,
            board_id: req.board_id,
            label,
            color,
            created_at: now,
            updated_at: now,
        };
        tables.tags.push(tag.clone());
        Ok(tag)
    }

    async fn update_tag(&self, req: UpdateTag) -> RemoteResult<Tag> {
        self.admit("update_tag").await?;
        let label = req
            .label
            .try_map(|l| validate::title(&l, "tag label", MAX_TAG_LABEL_LENGTH))?;
        let color = req.color.try_map(|c| validate::color(c, "tag"))?;
        let mut tables = lock(&self.tables);
        let index = tables.tag_index(&req.id, &req.board_id)?;
        let tag = &mut tables.tags[index];
        if label.apply_to(&mut tag.label) | color.apply_to(&mut tag.color) {
            tag.updated_at = Utc::now();
        }
        Ok(tag.clone())
    }

    async fn delete_tag(&self, id: &str, board_id: &str) -> RemoteResult<()> {
        self.admit("delete_tag").await?;
        let mut tables = lock(&self.tables);
        let index = tables.tag_index(id, board_id)?;
        tables.tags.remove(index);
        tables.card_tags.retain(|(_, t)| t != id);
        Ok(())
    }

    async fn set_card_tags(&self, req: SetCardTags) -> RemoteResult<Vec<Tag>> {
        self.admit("set_card_tags").await?;
        let mut tables = lock(&self.tables);
        tables.card_index(&req.card_id, &req.board_id)?;
        tables.set_card_tags(&req.card_id, &req.board_id, &req.tag_ids)
    }

    async fn create_note(&self, req: CreateNote) -> RemoteResult<Note> {
        self.admit("create_note").await?;
        let title = validate::title(&req.title, "note title", MAX_TITLE_LENGTH)?;
        let mut tables = lock(&self.tables);
        tables.board(&req.board_id)?;
        MemoryTables::ensure_unique_id(tables.notes.iter().map(|n| n.id.as_str()), &req.id)?;
        let now = Utc::now();
        let note = Note {
            id: req.id,
            board_id: req.board_id,
            title,
            content: req.content.unwrap_or_default(),
            pinned: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        tables.notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, req: UpdateNote) -> RemoteResult<()> {
        self.admit("update_note").await?;
        let title = req
            .title
            .try_map(|t| validate::title(&t, "note title", MAX_TITLE_LENGTH))?;
        let mut tables = lock(&self.tables);
        let note = tables
            .notes
            .iter_mut()
            .find(|n| n.id == req.id && n.board_id == req.board_id)
            .ok_or_else(|| not_found("note", &req.id))?;
        let changed = title.apply_to(&mut note.title)
            | req.content.apply_to(&mut note.content)
            | req.pinned.apply_to(&mut note.pinned);
        if changed {
            note.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_note(&self, id: &str, board_id: &str) -> RemoteResult<()> {
        self.admit("delete_note").await?;
        lock(&self.tables)
            .notes
            .retain(|n| !(n.id == id && n.board_id == board_id));
        Ok(())
    }

    async fn archive_note(&self, id: &str, board_id: &str) -> RemoteResult<()> {
        self.admit("archive_note").await?;
        let mut tables = lock(&self.tables);
        let note = tables
            .notes
            .iter_mut()
            .find(|n| n.id == id && n.board_id == board_id)
            .ok_or_else(|| not_found("note", id))?;
        let now = Utc::now();
        note.archived_at = Some(now);
        note.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{board, column, seeded_board, tag};

    #[tokio::test]
    async fn test_move_card_across_columns() {
        let service = seeded_board();
        service
            .move_card(MoveCard {
                board_id: "b1".into(),
                card_id: "B".into(),
                from_column_id: "todo".into(),
                to_column_id: "done".into(),
                target_index: 0,
            })
            .await
            .unwrap();

        let cards = service.load_cards("b1").await.unwrap();
        let todo: Vec<(&str, i64)> = cards_of_column(&cards, "todo")
            .iter()
            .map(|c| (c.id.as_str(), c.position))
            .collect();
        let done: Vec<(&str, i64)> = cards_of_column(&cards, "done")
            .iter()
            .map(|c| (c.id.as_str(), c.position))
            .collect();
        assert_eq!(todo, vec![("A", 0), ("C", 1)]);
        assert_eq!(done, vec![("B", 0), ("D", 1)]);
    }

    #[tokio::test]
    async fn test_wip_limit_blocks_move() {
        let service = seeded_board();
        service.seed(|t| {
            let done = t.columns.iter_mut().find(|c| c.id == "done").unwrap();
            done.wip_limit = Some(1);
        });
        let err = service
            .move_card(MoveCard {
                board_id: "b1".into(),
                card_id: "A".into(),
                from_column_id: "todo".into(),
                to_column_id: "done".into(),
                target_index: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::WipLimitExceeded { limit: 1, .. }));
    }

    #[tokio::test]
    async fn test_delete_non_empty_column_rejected() {
        let service = seeded_board();
        let err = service.delete_column("todo", "b1").await.unwrap_err();
        assert_eq!(
            err,
            RemoteError::ColumnNotEmpty {
                column_id: "todo".into(),
                cards: 3
            }
        );
    }

    #[tokio::test]
    async fn test_delete_empty_column_renumbers() {
        let service = MemoryService::new();
        service.seed(|t| {
            t.boards.push(board("b1", "Board"));
            t.columns.push(column("b1", "a", "A", 0));
            t.columns.push(column("b1", "b", "B", 1));
            t.columns.push(column("b1", "c", "C", 2));
        });
        service.delete_column("a", "b1").await.unwrap();
        let columns = service.load_columns("b1").await.unwrap();
        let got: Vec<(&str, i64)> = columns.iter().map(|c| (c.id.as_str(), c.position)).collect();
        assert_eq!(got, vec![("b", 0), ("c", 1)]);
    }

    #[tokio::test]
    async fn test_set_card_tags_orders_by_id_and_rejects_foreign() {
        let service = seeded_board();
        service.seed(|t| {
            t.tags.push(tag("b1", "t2", "two"));
            t.tags.push(tag("b1", "t1", "one"));
            t.tags.push(tag("b2", "tx", "other board"));
        });
        let tags = service
            .set_card_tags(SetCardTags {
                card_id: "A".into(),
                board_id: "b1".into(),
                tag_ids: vec!["t2".into(), "t1".into(), "t2".into()],
            })
            .await
            .unwrap();
        let ids: Vec<&str> = tags.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let err = service
            .set_card_tags(SetCardTags {
                card_id: "A".into(),
                board_id: "b1".into(),
                tag_ids: vec!["tx".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_create_subtask_clamps_and_numbers_from_zero() {
        let service = seeded_board();
        let first = service
            .create_subtask(CreateSubtask {
                id: "s1".into(),
                board_id: "b1".into(),
                card_id: "A".into(),
                title: "first".into(),
                position: None,
            })
            .await
            .unwrap();
        let second = service
            .create_subtask(CreateSubtask {
                id: "s0".into(),
                board_id: "b1".into(),
                card_id: "A".into(),
                title: "  before  ".into(),
                position: Some(-3),
            })
            .await
            .unwrap();
        assert_eq!(first.position, 0);
        assert_eq!(second.position, 0);
        assert_eq!(second.title, "before");

        let subtasks = service.tables().card_subtasks("A");
        let got: Vec<(&str, i64)> = subtasks.iter().map(|s| (s.id.as_str(), s.position)).collect();
        assert_eq!(got, vec![("s0", 0), ("s1", 1)]);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let service = seeded_board();
        service.fail_next("delete_card", RemoteError::Unavailable("offline".into()));
        assert!(service.delete_card("A", "b1").await.is_err());
        assert!(service.delete_card("A", "b1").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_card_clears_due_date() {
        let service = seeded_board();
        service.seed(|t| t.cards[0].due_date = Some("2026-10-30".into()));
        let before = service.tables().cards[0].clone();
        let id = before.id.clone();
        service
            .update_card(UpdateCard {
                id: id.clone(),
                board_id: "b1".into(),
                due_date: Patch::Set(None),
                ..Default::default()
            })
            .await
            .unwrap();
        let tables = service.tables();
        let updated = tables.cards.iter().find(|c| c.id == id).unwrap();
        assert_eq!(updated.due_date, None);
        assert_eq!(updated.title, before.title);
    }

    #[tokio::test]
    async fn test_delete_default_workspace_rejected() {
        let service = MemoryService::new();
        let err = service.delete_workspace(DEFAULT_WORKSPACE_ID).await.unwrap_err();
        assert!(matches!(err, RemoteError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_load_count() {
        let service = seeded_board();
        service.load_columns("b1").await.unwrap();
        service.load_columns("b1").await.unwrap();
        assert_eq!(service.load_count("columns"), 2);
        assert_eq!(service.load_count("cards"), 0);
    }
}
