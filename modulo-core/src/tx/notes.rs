/// Board notes, cached under `notes:<board>`: pinned first, then most
/// recently updated. Archived notes leave the cached list.
use chrono::Utc;

use super::{replace_by_id, upsert, Transaction};
use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::remote::{CreateNote, UpdateNote};
use crate::types::Note;
use crate::validate;

fn sorted(mut notes: Vec<Note>) -> Vec<Note> {
    notes.sort_by(|a, b| b.pinned.cmp(&a.pinned).then(b.updated_at.cmp(&a.updated_at)));
    notes
}

fn without(notes: &[Note], id: &str) -> Vec<Note> {
    notes.iter().filter(|n| n.id != id).cloned().collect()
}

impl SyncEngine {
    pub async fn create_note(&self, mut req: CreateNote) -> Result<Note, EngineError> {
        validate::id(&req.board_id, "board id")?;
        req.title = validate::title(&req.title, "note title", self.config.max_title_length)?;
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let speculative = Note {
            id: req.id.clone(),
            board_id: req.board_id.clone(),
            title: req.title.clone(),
            content: req.content.clone().unwrap_or_default(),
            pinned: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        let tx = Transaction::new("create_note")
            .affects(CacheKey::Notes(req.board_id.clone()))
            .speculate(move |_, snap| {
                let notes = upsert(snap.notes()?, speculative.clone(), |n| n.id.as_str());
                Some(Snapshot::Notes(sorted(notes)))
            })
            .reconcile(|_, snap, confirmed: &Note| {
                let notes = upsert(snap.notes()?, confirmed.clone(), |n| n.id.as_str());
                Some(Snapshot::Notes(sorted(notes)))
            });
        self.execute(tx, self.remote.create_note(req)).await
    }

    pub async fn update_note(&self, mut req: UpdateNote) -> Result<(), EngineError> {
        validate::id(&req.id, "note id")?;
        let max = self.config.max_title_length;
        req.title = req.title.try_map(|t| validate::title(&t, "note title", max))?;

        let patch = req.clone();
        let tx = Transaction::new("update_note")
            .affects(CacheKey::Notes(req.board_id.clone()))
            .speculate(move |_, snap| {
                let notes = replace_by_id(snap.notes()?, &patch.id, |n| n.id.as_str(), |note| {
                    patch.title.apply_to(&mut note.title);
                    patch.content.apply_to(&mut note.content);
                    patch.pinned.apply_to(&mut note.pinned);
                    note.updated_at = Utc::now();
                })?;
                Some(Snapshot::Notes(sorted(notes)))
            });
        self.execute(tx, self.remote.update_note(req)).await
    }

    pub async fn delete_note(&self, id: &str, board_id: &str) -> Result<(), EngineError> {
        validate::id(id, "note id")?;
        let note_id = id.to_string();
        let tx = Transaction::new("delete_note")
            .affects(CacheKey::Notes(board_id.to_string()))
            .speculate(move |_, snap| Some(Snapshot::Notes(without(snap.notes()?, &note_id))));
        self.execute(tx, self.remote.delete_note(id, board_id)).await
    }

    /// Archive a note; it disappears from the cached list.
    pub async fn archive_note(&self, id: &str, board_id: &str) -> Result<(), EngineError> {
        validate::id(id, "note id")?;
        let note_id = id.to_string();
        let tx = Transaction::new("archive_note")
            .affects(CacheKey::Notes(board_id.to_string()))
            .speculate(move |_, snap| Some(Snapshot::Notes(without(snap.notes()?, &note_id))));
        self.execute(tx, self.remote.archive_note(id, board_id)).await
    }
}
