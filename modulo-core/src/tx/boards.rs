/// Workspace and board mutations, cached under `workspaces` and `boards`.
///
/// Deleting a board drops every collection keyed to it once the service
/// confirms; only `boards` is refreshed afterwards.
use chrono::Utc;

use super::{replace_by_id, upsert, Transaction};
use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::remote::{CreateBoard, CreateWorkspace, UpdateBoard, UpdateWorkspace};
use crate::types::{Board, Workspace};
use crate::validate;

impl SyncEngine {
    pub async fn create_workspace(
        &self,
        mut req: CreateWorkspace,
    ) -> Result<Workspace, EngineError> {
        req.name = validate::title(&req.name, "workspace name", self.config.max_title_length)?;
        req.color = validate::color(req.color, "workspace")?;
        req.icon_path = validate::optional_text(req.icon_path);
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let speculative = Workspace {
            id: req.id.clone(),
            name: req.name.clone(),
            color: req.color.clone(),
            icon_path: req.icon_path.clone(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        let tx = Transaction::new("create_workspace")
            .affects(CacheKey::Workspaces)
            .speculate(move |_, snap| {
                let workspaces = upsert(snap.workspaces()?, speculative.clone(), |w| w.id.as_str());
                Some(Snapshot::Workspaces(workspaces))
            })
            .reconcile(|_, snap, confirmed: &Workspace| {
                let workspaces = upsert(snap.workspaces()?, confirmed.clone(), |w| w.id.as_str());
                Some(Snapshot::Workspaces(workspaces))
            });
        self.execute(tx, self.remote.create_workspace(req)).await
    }

    pub async fn update_workspace(&self, mut req: UpdateWorkspace) -> Result<(), EngineError> {
        validate::id(&req.id, "workspace id")?;
        let max = self.config.max_title_length;
        req.name = req.name.try_map(|n| validate::title(&n, "workspace name", max))?;
        req.color = req.color.try_map(|c| validate::color(c, "workspace"))?;

        let patch = req.clone();
        let tx = Transaction::new("update_workspace")
            .affects(CacheKey::Workspaces)
            .speculate(move |_, snap| {
                let workspaces =
                    replace_by_id(snap.workspaces()?, &patch.id, |w| w.id.as_str(), |workspace| {
                        patch.name.apply_to(&mut workspace.name);
                        patch.color.apply_to(&mut workspace.color);
                        workspace.updated_at = Utc::now();
                    })?;
                Some(Snapshot::Workspaces(workspaces))
            });
        self.execute(tx, self.remote.update_workspace(req)).await
    }

    /// The service refuses the default workspace and workspaces that still
    /// own boards.
    pub async fn delete_workspace(&self, id: &str) -> Result<(), EngineError> {
        validate::id(id, "workspace id")?;

        let workspace_id = id.to_string();
        let tx = Transaction::new("delete_workspace")
            .affects(CacheKey::Workspaces)
            .speculate(move |_, snap| {
                let workspaces: Vec<Workspace> = snap
                    .workspaces()?
                    .iter()
                    .filter(|w| w.id != workspace_id)
                    .cloned()
                    .collect();
                Some(Snapshot::Workspaces(workspaces))
            });
        self.execute(tx, self.remote.delete_workspace(id)).await
    }

    /// Create a board. A blank workspace ID files it under the default
    /// workspace.
    pub async fn create_board(&self, mut req: CreateBoard) -> Result<Board, EngineError> {
        req.title = validate::title(&req.title, "board title", self.config.max_title_length)?;
        req.icon = validate::board_icon(req.icon)?;
        req.description = validate::optional_text(req.description);
        req.emoji = validate::optional_text(req.emoji);
        req.color = validate::color(req.color, "board")?;
        if req.workspace_id.trim().is_empty() {
            req.workspace_id = self.config.default_workspace_id.clone();
        }
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let board = Board {
            id: req.id.clone(),
            workspace_id: req.workspace_id.clone(),
            title: req.title.clone(),
            description: req.description.clone(),
            icon: req
                .icon
                .clone()
                .unwrap_or_else(|| self.config.default_board_icon.clone()),
            emoji: req.emoji.clone(),
            color: req.color.clone(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        let speculative = board.clone();
        let tx = Transaction::new("create_board")
            .affects(CacheKey::Boards)
            .speculate(move |_, snap| {
                let boards = upsert(snap.boards()?, speculative.clone(), |b| b.id.as_str());
                Some(Snapshot::Boards(boards))
            });
        self.execute(tx, self.remote.create_board(req)).await?;
        Ok(board)
    }

    pub async fn update_board(&self, mut req: UpdateBoard) -> Result<(), EngineError> {
        validate::id(&req.id, "board id")?;
        let max = self.config.max_title_length;
        req.title = req.title.try_map(|t| validate::title(&t, "board title", max))?;
        req.description = req.description.map(validate::optional_text);
        let default_icon = self.config.default_board_icon.clone();
        req.icon = req
            .icon
            .try_map(|i| validate::board_icon(Some(i)).map(|v| v.unwrap_or(default_icon)))?;

        let patch = req.clone();
        let tx = Transaction::new("update_board")
            .affects(CacheKey::Boards)
            .speculate(move |_, snap| {
                let boards = replace_by_id(snap.boards()?, &patch.id, |b| b.id.as_str(), |board| {
                    patch.title.apply_to(&mut board.title);
                    patch.description.apply_to(&mut board.description);
                    patch.icon.apply_to(&mut board.icon);
                    patch.workspace_id.apply_to(&mut board.workspace_id);
                    board.updated_at = Utc::now();
                })?;
                Some(Snapshot::Boards(boards))
            });
        self.execute(tx, self.remote.update_board(req)).await
    }

    /// Delete a board and, once confirmed, every cached collection it owns.
    pub async fn delete_board(&self, id: &str) -> Result<(), EngineError> {
        validate::id(id, "board id")?;

        let board_id = id.to_string();
        let mut tx = Transaction::new("delete_board")
            .affects(CacheKey::Boards)
            .speculate(move |_, snap| {
                let boards: Vec<Board> = snap
                    .boards()?
                    .iter()
                    .filter(|b| b.id != board_id)
                    .cloned()
                    .collect();
                Some(Snapshot::Boards(boards))
            });
        for key in CacheKey::board_scoped(id) {
            tx = tx.evict_on_success(key);
        }
        self.execute(tx, self.remote.delete_board(id)).await
    }
}
