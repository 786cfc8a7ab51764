/// Subtask mutations. Subtasks are embedded in their card, so every
/// subtask transaction writes `cards:<board>`. Positions use the subtask
/// scope base.
use chrono::Utc;

use super::{replace_by_id, Transaction};
use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::position::{self, Scope};
use crate::remote::{CreateSubtask, DeleteSubtask, UpdateSubtask};
use crate::types::Subtask;
use crate::validate;

/// Put the confirmed subtask at its server position, replacing any
/// speculative copy.
fn merge_confirmed(snap: &Snapshot, confirmed: &Subtask) -> Option<Snapshot> {
    let base = Scope::Subtasks.base();
    let cards = replace_by_id(snap.cards()?, &confirmed.card_id, |c| c.id.as_str(), |card| {
        let others: Vec<Subtask> = card
            .subtasks
            .iter()
            .filter(|s| s.id != confirmed.id)
            .cloned()
            .collect();
        card.subtasks =
            position::insert_at(&others, confirmed.clone(), confirmed.position - base, base);
    })?;
    Some(Snapshot::Cards(cards))
}

impl SyncEngine {
    /// Add a subtask at `req.position` (0-based, clamped), or at the end.
    /// Returns the subtask as stored by the service.
    pub async fn create_subtask(&self, mut req: CreateSubtask) -> Result<Subtask, EngineError> {
        validate::id(&req.board_id, "board id")?;
        validate::id(&req.card_id, "card id")?;
        req.title = validate::title(&req.title, "subtask title", self.config.max_title_length)?;
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let speculative = Subtask {
            id: req.id.clone(),
            board_id: req.board_id.clone(),
            card_id: req.card_id.clone(),
            title: req.title.clone(),
            is_completed: false,
            position: Scope::Subtasks.base(),
            created_at: now,
            updated_at: now,
        };
        let target = req.position;

        let tx = Transaction::new("create_subtask")
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |_, snap| {
                let cards = replace_by_id(snap.cards()?, &speculative.card_id, |c| c.id.as_str(), |card| {
                    let at = target.unwrap_or(card.subtasks.len() as i64);
                    card.subtasks = position::insert_at(
                        &card.subtasks,
                        speculative.clone(),
                        at,
                        Scope::Subtasks.base(),
                    );
                })?;
                Some(Snapshot::Cards(cards))
            })
            .reconcile(|_, snap, confirmed| merge_confirmed(snap, confirmed));
        self.execute(tx, self.remote.create_subtask(req)).await
    }

    /// Patch title/completion and optionally move the subtask to
    /// `target_position` (0-based) within its card.
    pub async fn update_subtask(&self, mut req: UpdateSubtask) -> Result<Subtask, EngineError> {
        validate::id(&req.id, "subtask id")?;
        validate::id(&req.card_id, "card id")?;
        let max = self.config.max_title_length;
        req.title = req.title.try_map(|t| validate::title(&t, "subtask title", max))?;

        let patch = req.clone();
        let tx = Transaction::new("update_subtask")
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |_, snap| {
                let cards = snap.cards()?;
                let card = cards.iter().find(|c| c.id == patch.card_id)?;
                let mut subtasks = replace_by_id(&card.subtasks, &patch.id, |s| s.id.as_str(), |subtask| {
                    patch.title.apply_to(&mut subtask.title);
                    patch.is_completed.apply_to(&mut subtask.is_completed);
                    subtask.updated_at = Utc::now();
                })?;
                if let Some(target) = patch.target_position {
                    subtasks =
                        position::reorder(&subtasks, &patch.id, target, Scope::Subtasks.base())?;
                }
                let cards = replace_by_id(cards, &patch.card_id, |c| c.id.as_str(), |card| {
                    card.subtasks = subtasks;
                })?;
                Some(Snapshot::Cards(cards))
            })
            .reconcile(|_, snap, confirmed| merge_confirmed(snap, confirmed));
        self.execute(tx, self.remote.update_subtask(req)).await
    }

    pub async fn delete_subtask(&self, req: DeleteSubtask) -> Result<(), EngineError> {
        validate::id(&req.id, "subtask id")?;
        validate::id(&req.card_id, "card id")?;

        let id = req.id.clone();
        let card_id = req.card_id.clone();
        let tx = Transaction::new("delete_subtask")
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |_, snap| {
                let cards = snap.cards()?;
                let card = cards.iter().find(|c| c.id == card_id)?;
                let remaining = position::remove(&card.subtasks, &id, Scope::Subtasks.base())?;
                let cards = replace_by_id(cards, &card_id, |c| c.id.as_str(), |card| {
                    card.subtasks = remaining;
                })?;
                Some(Snapshot::Cards(cards))
            });
        self.execute(tx, self.remote.delete_subtask(req)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::RemoteError;
    use crate::patch::Patch;
    use crate::test_support::{card, engine_for, loaded_engine, order, pairs, seeded_board, subtask};

    fn create(card: &str, id: &str, title: &str, position: Option<i64>) -> CreateSubtask {
        CreateSubtask {
            id: id.into(),
            board_id: "b1".into(),
            card_id: card.into(),
            title: title.into(),
            position,
        }
    }

    async fn with_subtasks() -> (Arc<crate::remote::MemoryService>, SyncEngine) {
        let (service, engine) = loaded_engine().await;
        service.seed(|t| {
            t.subtasks.push(subtask("b1", "A", "s1", 0));
            t.subtasks.push(subtask("b1", "A", "s2", 1));
            t.subtasks.push(subtask("b1", "A", "s3", 2));
        });
        engine.invalidate(&CacheKey::Cards("b1".into()));
        engine.settled().await;
        (service, engine)
    }

    fn subtasks_of(engine: &SyncEngine, card: &str) -> Vec<Subtask> {
        engine.card("b1", card).map(|c| c.subtasks).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_on_unknown_cards_appears_once() {
        let service = Arc::new(seeded_board());
        let engine = engine_for(&service);
        let key = CacheKey::Cards("b1".into());

        let created = engine
            .create_subtask(create("A", "", "Write tests", None))
            .await
            .unwrap();

        assert!(!engine.store().is_known(&key));
        engine.settled().await;

        let a = engine.card("b1", "A").unwrap();
        let matches = a.subtasks.iter().filter(|s| s.id == created.id).count();
        assert_eq!(matches, 1);
        assert_eq!(a.subtasks[0].position, 0);
    }

    #[tokio::test]
    async fn test_create_inserts_and_merges_confirmed() {
        let (_service, engine) = with_subtasks().await;

        let created = engine
            .create_subtask(create("A", "s0", " First ", Some(0)))
            .await
            .unwrap();

        assert_eq!(created.title, "First");
        assert_eq!(created.position, 0);
        assert_eq!(
            order(&subtasks_of(&engine, "A")),
            pairs(&[("s0", 0), ("s1", 1), ("s2", 2), ("s3", 3)])
        );
        // The cached copy carries the service's timestamps.
        let cached = subtasks_of(&engine, "A").remove(0);
        assert_eq!(cached, created);
    }

    #[test]
    fn test_merge_confirmed_lands_at_server_index() {
        let mut a = card("b1", "todo", "A", 0);
        a.subtasks = vec![subtask("b1", "A", "s0", 0), subtask("b1", "A", "s1", 1)];
        let snap = Snapshot::Cards(vec![a]);

        let merged = merge_confirmed(&snap, &subtask("b1", "A", "new", 1)).unwrap();

        let cards = merged.cards().unwrap();
        assert_eq!(
            order(&cards[0].subtasks),
            pairs(&[("s0", 0), ("new", 1), ("s1", 2)])
        );
    }

    #[tokio::test]
    async fn test_update_toggles_and_reorders() {
        let (_service, engine) = with_subtasks().await;

        let updated = engine
            .update_subtask(UpdateSubtask {
                id: "s1".into(),
                board_id: "b1".into(),
                card_id: "A".into(),
                is_completed: Patch::Set(true),
                target_position: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(updated.is_completed);
        assert_eq!(updated.position, 2);
        assert_eq!(
            order(&subtasks_of(&engine, "A")),
            pairs(&[("s2", 0), ("s3", 1), ("s1", 2)])
        );
    }

    #[tokio::test]
    async fn test_delete_rejected_restores_subtask() {
        let (service, engine) = with_subtasks().await;
        let before = engine.read(&CacheKey::Cards("b1".into()));
        service.fail_next("delete_subtask", RemoteError::NotFound {
            kind: "subtask",
            id: "s2".into(),
        });

        let err = engine
            .delete_subtask(DeleteSubtask {
                id: "s2".into(),
                board_id: "b1".into(),
                card_id: "A".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Rejected { operation: "delete_subtask", .. }));
        assert_eq!(engine.read(&CacheKey::Cards("b1".into())), before);
    }

    #[tokio::test]
    async fn test_delete_renumbers_from_zero() {
        let (_service, engine) = with_subtasks().await;

        engine
            .delete_subtask(DeleteSubtask {
                id: "s1".into(),
                board_id: "b1".into(),
                card_id: "A".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            order(&subtasks_of(&engine, "A")),
            pairs(&[("s2", 0), ("s3", 1)])
        );
    }
}
