/// Column mutations. Columns of a board form one dense scope, cached under
/// `columns:<board>`.
use chrono::Utc;

use super::{replace_by_id, Transaction};
use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::patch::Patch;
use crate::position::{self, Scope};
use crate::remote::{CreateColumn, MoveColumn, UpdateColumn};
use crate::types::Column;
use crate::validate;

impl SyncEngine {
    /// Insert a column at `req.position` (0-based, clamped).
    pub async fn create_column(&self, mut req: CreateColumn) -> Result<Column, EngineError> {
        validate::id(&req.board_id, "board id")?;
        req.title = validate::title(&req.title, "column title", self.config.max_title_length)?;
        req.color = validate::color(req.color, "column")?;
        req.icon = validate::column_icon(req.icon)?;
        req.wip_limit = validate::wip_limit(req.wip_limit)?;
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let column = Column {
            id: req.id.clone(),
            board_id: req.board_id.clone(),
            title: req.title.clone(),
            position: 0,
            color: req.color.clone(),
            icon: req
                .icon
                .clone()
                .unwrap_or_else(|| self.config.default_column_icon.clone()),
            is_enabled: req.is_enabled.unwrap_or(true),
            wip_limit: req.wip_limit,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };

        let key = CacheKey::Columns(req.board_id.clone());
        let speculative = column.clone();
        let target = req.position;
        let tx = Transaction::new("create_column")
            .affects(key.clone())
            .speculate(move |_, snap| {
                let columns = position::insert_at(
                    snap.columns()?,
                    speculative.clone(),
                    target,
                    Scope::Columns.base(),
                );
                Some(Snapshot::Columns(columns))
            });
        self.execute(tx, self.remote.create_column(req)).await?;

        Ok(self
            .columns(&column.board_id)
            .into_iter()
            .find(|c| c.id == column.id)
            .unwrap_or(column))
    }

    /// Move a column to `target_index` within its board.
    pub async fn move_column(
        &self,
        board_id: &str,
        column_id: &str,
        target_index: i64,
    ) -> Result<(), EngineError> {
        validate::id(board_id, "board id")?;
        validate::id(column_id, "column id")?;

        let id = column_id.to_string();
        let tx = Transaction::new("move_column")
            .affects(CacheKey::Columns(board_id.to_string()))
            .speculate(move |_, snap| {
                let columns =
                    position::reorder(snap.columns()?, &id, target_index, Scope::Columns.base())?;
                Some(Snapshot::Columns(columns))
            });
        let req = MoveColumn {
            board_id: board_id.to_string(),
            column_id: column_id.to_string(),
            target_index,
        };
        self.execute(tx, self.remote.move_column(req)).await
    }

    /// Patch the fields present in `req`. Clearing the icon restores the
    /// default one.
    pub async fn update_column(&self, mut req: UpdateColumn) -> Result<(), EngineError> {
        validate::id(&req.id, "column id")?;
        let max = self.config.max_title_length;
        req.title = req.title.try_map(|t| validate::title(&t, "column title", max))?;
        req.color = req.color.try_map(|c| validate::color(c, "column"))?;
        req.icon = req.icon.try_map(validate::column_icon)?;

        let patch = req.clone();
        let default_icon = self.config.default_column_icon.clone();
        let tx = Transaction::new("update_column")
            .affects(CacheKey::Columns(req.board_id.clone()))
            .speculate(move |_, snap| {
                let columns = replace_by_id(snap.columns()?, &patch.id, |c| c.id.as_str(), |column| {
                    patch.title.apply_to(&mut column.title);
                    patch.color.apply_to(&mut column.color);
                    if let Patch::Set(icon) = &patch.icon {
                        column.icon = icon.clone().unwrap_or_else(|| default_icon.clone());
                    }
                    patch.is_enabled.apply_to(&mut column.is_enabled);
                    column.updated_at = Utc::now();
                })?;
                Some(Snapshot::Columns(columns))
            });
        self.execute(tx, self.remote.update_column(req)).await
    }

    /// Remove a column. The service refuses columns that still hold cards;
    /// the rollback then restores it.
    pub async fn delete_column(&self, id: &str, board_id: &str) -> Result<(), EngineError> {
        validate::id(id, "column id")?;
        validate::id(board_id, "board id")?;

        let column_id = id.to_string();
        let tx = Transaction::new("delete_column")
            .affects(CacheKey::Columns(board_id.to_string()))
            .speculate(move |_, snap| {
                let columns = position::remove(snap.columns()?, &column_id, Scope::Columns.base())?;
                Some(Snapshot::Columns(columns))
            });
        self.execute(tx, self.remote.delete_column(id, board_id)).await
    }
}
