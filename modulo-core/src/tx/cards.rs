/// Card mutations.
///
/// All cards of a board are cached together under `cards:<board>`; each
/// column's cards form their own dense scope inside that list. Moving a
/// card between columns renumbers both sequences and re-parents the card.
use std::collections::HashSet;

use chrono::Utc;

use super::{replace_by_id, Transaction};
use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::position::{self, Scope};
use crate::remote::{CreateCard, MoveCard, UpdateCard};
use crate::tags::resolve_tags;
use crate::types::{cards_of_column, Card};
use crate::validate;

/// One column's cards, ordered by position.
pub(crate) fn column_sequence(cards: &[Card], column_id: &str) -> Vec<Card> {
    cards_of_column(cards, column_id)
        .into_iter()
        .cloned()
        .collect()
}

/// Swap one column's sequence inside the board-wide list. Cards listed in
/// `ordered` are dropped from wherever they were before.
pub(crate) fn splice_column(cards: &[Card], column_id: &str, ordered: Vec<Card>) -> Vec<Card> {
    let incoming: HashSet<&str> = ordered.iter().map(|c| c.id.as_str()).collect();
    let mut next: Vec<Card> = cards
        .iter()
        .filter(|c| c.column_id != column_id && !incoming.contains(c.id.as_str()))
        .cloned()
        .collect();
    next.extend(ordered);
    next
}

impl SyncEngine {
    /// Create a card at `req.position` (0-based, clamped) in its column.
    ///
    /// Tag IDs are resolved against the cached tags of the board; unknown
    /// IDs are left off the speculative card.
    pub async fn create_card(&self, mut req: CreateCard) -> Result<Card, EngineError> {
        validate::id(&req.board_id, "board id")?;
        validate::id(&req.column_id, "column id")?;
        req.title = validate::title(&req.title, "card title", self.config.max_title_length)?;
        req.description = validate::optional_text(req.description);
        req.due_date = validate::optional_text(req.due_date);
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let card = Card {
            id: req.id.clone(),
            board_id: req.board_id.clone(),
            column_id: req.column_id.clone(),
            title: req.title.clone(),
            description: req.description.clone(),
            position: 0,
            priority: req.priority,
            due_date: req.due_date.clone(),
            remind_at: None,
            subtasks: Vec::new(),
            tags: resolve_tags(&req.tag_ids, &self.tags(&req.board_id)),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };

        let speculative = card.clone();
        let target = req.position;
        let tx = Transaction::new("create_card")
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |_, snap| {
                let cards = snap.cards()?;
                let ordered = position::insert_at(
                    &column_sequence(cards, &speculative.column_id),
                    speculative.clone(),
                    target,
                    Scope::Cards.base(),
                );
                Some(Snapshot::Cards(splice_column(
                    cards,
                    &speculative.column_id,
                    ordered,
                )))
            });
        self.execute(tx, self.remote.create_card(req)).await?;

        Ok(self.card(&card.board_id, &card.id).unwrap_or(card))
    }

    /// Patch the fields present in `req`.
    pub async fn update_card(&self, mut req: UpdateCard) -> Result<(), EngineError> {
        validate::id(&req.id, "card id")?;
        let max = self.config.max_title_length;
        req.title = req.title.try_map(|t| validate::title(&t, "card title", max))?;
        req.description = req.description.map(validate::optional_text);
        req.due_date = req.due_date.map(validate::optional_text);
        req.remind_at = req.remind_at.map(validate::optional_text);

        let patch = req.clone();
        let tx = Transaction::new("update_card")
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |_, snap| {
                let cards = replace_by_id(snap.cards()?, &patch.id, |c| c.id.as_str(), |card| {
                    patch.title.apply_to(&mut card.title);
                    patch.description.apply_to(&mut card.description);
                    patch.priority.apply_to(&mut card.priority);
                    patch.due_date.apply_to(&mut card.due_date);
                    patch.remind_at.apply_to(&mut card.remind_at);
                    card.updated_at = Utc::now();
                })?;
                Some(Snapshot::Cards(cards))
            });
        self.execute(tx, self.remote.update_card(req)).await
    }

    pub async fn delete_card(&self, id: &str, board_id: &str) -> Result<(), EngineError> {
        validate::id(id, "card id")?;
        validate::id(board_id, "board id")?;

        let card_id = id.to_string();
        let tx = Transaction::new("delete_card")
            .affects(CacheKey::Cards(board_id.to_string()))
            .speculate(move |_, snap| {
                let cards = snap.cards()?;
                let column_id = cards.iter().find(|c| c.id == card_id)?.column_id.clone();
                let remaining = position::remove(
                    &column_sequence(cards, &column_id),
                    &card_id,
                    Scope::Cards.base(),
                )?;
                let mut next = splice_column(cards, &column_id, remaining);
                next.retain(|c| c.id != card_id);
                Some(Snapshot::Cards(next))
            });
        self.execute(tx, self.remote.delete_card(id, board_id)).await
    }

    /// Move a card within its column or into another one.
    ///
    /// A cross-column move also refreshes the board's columns on settle,
    /// since column-level constraints (WIP limits) may have changed.
    pub async fn move_card(&self, req: MoveCard) -> Result<(), EngineError> {
        validate::id(&req.board_id, "board id")?;
        validate::id(&req.card_id, "card id")?;
        validate::id(&req.from_column_id, "column id")?;
        validate::id(&req.to_column_id, "column id")?;

        let cards_key = CacheKey::Cards(req.board_id.clone());
        let card_id = req.card_id.clone();
        let from = req.from_column_id.clone();
        let to = req.to_column_id.clone();
        let target = req.target_index;
        let base = Scope::Cards.base();

        let tx = if from == to {
            Transaction::new("move_card")
                .affects(cards_key)
                .speculate(move |_, snap| {
                    let cards = snap.cards()?;
                    let ordered =
                        position::reorder(&column_sequence(cards, &from), &card_id, target, base)?;
                    Some(Snapshot::Cards(splice_column(cards, &from, ordered)))
                })
        } else {
            Transaction::new("move_card")
                .affects(cards_key)
                .also_settle(CacheKey::Columns(req.board_id.clone()))
                .speculate(move |_, snap| {
                    let cards = snap.cards()?;
                    let moved = position::move_across(
                        &column_sequence(cards, &from),
                        &column_sequence(cards, &to),
                        &card_id,
                        target,
                        base,
                        |card| {
                            card.column_id = to.clone();
                            card.updated_at = Utc::now();
                        },
                    )?;
                    let next = splice_column(cards, &from, moved.source);
                    Some(Snapshot::Cards(splice_column(&next, &to, moved.destination)))
                })
        };
        self.execute(tx, self.remote.move_card(req)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::RemoteError;
    use crate::patch::Patch;
    use crate::remote::RemoteService;
    use crate::test_support::{
        engine_with_config, loaded_engine, order, pairs, seeded_board, tag,
    };
    use crate::types::Priority;

    fn cards_key() -> CacheKey {
        CacheKey::Cards("b1".into())
    }

    fn move_req(card: &str, from: &str, to: &str, target_index: i64) -> MoveCard {
        MoveCard {
            board_id: "b1".into(),
            card_id: card.into(),
            from_column_id: from.into(),
            to_column_id: to.into(),
            target_index,
        }
    }

    #[tokio::test]
    async fn test_move_b_from_todo_to_done() {
        let (_service, engine) = loaded_engine().await;

        engine.move_card(move_req("B", "todo", "done", 0)).await.unwrap();

        let todo = pairs(&[("A", 0), ("C", 1)]);
        let done = pairs(&[("B", 0), ("D", 1)]);
        assert_eq!(order(&engine.cards_in_column("b1", "todo")), todo);
        assert_eq!(order(&engine.cards_in_column("b1", "done")), done);
        assert_eq!(engine.card("b1", "B").unwrap().column_id, "done");

        engine.settled().await;
        assert_eq!(order(&engine.cards_in_column("b1", "todo")), todo);
        assert_eq!(order(&engine.cards_in_column("b1", "done")), done);
    }

    #[tokio::test]
    async fn test_move_within_column() {
        let (_service, engine) = loaded_engine().await;

        engine.move_card(move_req("A", "todo", "todo", 2)).await.unwrap();

        assert_eq!(
            order(&engine.cards_in_column("b1", "todo")),
            pairs(&[("B", 0), ("C", 1), ("A", 2)])
        );
        assert_eq!(order(&engine.cards_in_column("b1", "done")), pairs(&[("D", 0)]));
    }

    #[tokio::test]
    async fn test_cross_move_refreshes_columns() {
        let (service, engine) = loaded_engine().await;
        let before = service.load_count("columns");

        engine.move_card(move_req("C", "todo", "done", 9)).await.unwrap();
        engine.settled().await;

        assert_eq!(service.load_count("columns"), before + 1);
        assert_eq!(
            order(&engine.cards_in_column("b1", "done")),
            pairs(&[("D", 0), ("C", 1)])
        );
    }

    #[tokio::test]
    async fn test_wip_rejection_rolls_back_exactly() {
        let (service, engine) = loaded_engine().await;
        service.seed(|t| {
            if let Some(done) = t.columns.iter_mut().find(|c| c.id == "done") {
                done.wip_limit = Some(1);
            }
        });
        let before = engine.read(&cards_key());

        let err = engine
            .move_card(move_req("B", "todo", "done", 0))
            .await
            .unwrap_err();

        assert!(matches!(
            err.remote(),
            Some(RemoteError::WipLimitExceeded { limit: 1, .. })
        ));
        assert_eq!(engine.read(&cards_key()), before);
    }

    #[tokio::test]
    async fn test_late_refresh_does_not_clobber_move() {
        let service = Arc::new(seeded_board());
        let config = EngineConfig {
            settle_refresh: false,
            ..Default::default()
        };
        let engine = engine_with_config(&service, config);
        engine.load(&cards_key()).await.unwrap();

        // A refresh reads the pre-move rows, then stalls on the wire.
        let gate = service.hold_loads().await;
        engine.invalidate(&cards_key());
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        engine.move_card(move_req("B", "todo", "done", 0)).await.unwrap();
        drop(gate);
        engine.settled().await;

        assert_eq!(service.load_count("cards"), 2);
        assert_eq!(
            order(&engine.cards_in_column("b1", "todo")),
            pairs(&[("A", 0), ("C", 1)])
        );
        assert_eq!(
            order(&engine.cards_in_column("b1", "done")),
            pairs(&[("B", 0), ("D", 1)])
        );
    }

    #[tokio::test]
    async fn test_settle_twice_matches_once() {
        let (service, engine) = loaded_engine().await;
        engine.move_card(move_req("B", "todo", "done", 0)).await.unwrap();
        engine.settled().await;
        let once = engine.read(&cards_key());

        engine.invalidate(&cards_key());
        engine.invalidate(&cards_key());
        engine.settled().await;

        assert_eq!(engine.read(&cards_key()), once);
        assert_eq!(
            once,
            Some(Snapshot::Cards(service.load_cards("b1").await.unwrap()))
        );
    }

    #[tokio::test]
    async fn test_create_card_resolves_cached_tags() {
        let service = Arc::new(seeded_board());
        service.seed(|t| t.tags.push(tag("b1", "t1", "bug")));
        let engine = engine_with_config(&service, EngineConfig::default());
        engine.load(&cards_key()).await.unwrap();
        engine.load(&CacheKey::Tags("b1".into())).await.unwrap();
        // Created elsewhere after our tags were loaded.
        service.seed(|t| t.tags.push(tag("b1", "t2", "ux")));

        let created = engine
            .create_card(CreateCard {
                board_id: "b1".into(),
                column_id: "done".into(),
                title: "Ship it".into(),
                position: 0,
                tag_ids: vec!["t2".into(), "t1".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        let chips: Vec<&str> = created.tags.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(chips, vec!["t1"]);
        assert_eq!(created.position, 0);
        assert_eq!(
            order(&engine.cards_in_column("b1", "done")),
            pairs(&[(created.id.as_str(), 0), ("D", 1)])
        );

        engine.settled().await;
        let confirmed = engine.card("b1", &created.id).unwrap();
        let chips: Vec<&str> = confirmed.tags.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(chips, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_create_card_rejected_removes_placeholder() {
        let (service, engine) = loaded_engine().await;
        let before = engine.read(&cards_key());
        service.fail_next("create_card", RemoteError::Unavailable("offline".into()));

        let result = engine
            .create_card(CreateCard {
                board_id: "b1".into(),
                column_id: "todo".into(),
                title: "Lost".into(),
                position: 1,
                ..Default::default()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(engine.read(&cards_key()), before);
    }

    #[tokio::test]
    async fn test_update_card_present_vs_absent() {
        let (service, engine) = loaded_engine().await;
        service.seed(|t| {
            if let Some(a) = t.cards.iter_mut().find(|c| c.id == "A") {
                a.due_date = Some("2026-11-01".into());
                a.description = Some("keep me".into());
            }
        });
        engine.invalidate(&cards_key());
        engine.settled().await;

        engine
            .update_card(UpdateCard {
                id: "A".into(),
                board_id: "b1".into(),
                priority: Patch::Set(Priority::High),
                due_date: Patch::Set(None),
                ..Default::default()
            })
            .await
            .unwrap();

        let a = engine.card("b1", "A").unwrap();
        assert_eq!(a.priority, Priority::High);
        assert_eq!(a.due_date, None);
        assert_eq!(a.description.as_deref(), Some("keep me"));
        assert_eq!(a.title, "A");
    }

    #[tokio::test]
    async fn test_delete_card_renumbers_column() {
        let (_service, engine) = loaded_engine().await;

        engine.delete_card("A", "b1").await.unwrap();

        assert_eq!(
            order(&engine.cards_in_column("b1", "todo")),
            pairs(&[("B", 0), ("C", 1)])
        );
        assert!(engine.card("b1", "A").is_none());
        engine.settled().await;
        assert!(engine.card("b1", "A").is_none());
    }

    #[test]
    fn test_splice_column_keeps_one_copy() {
        let cards = vec![
            crate::test_support::card("b1", "todo", "A", 0),
            crate::test_support::card("b1", "done", "D", 0),
        ];
        let mut moved = cards[0].clone();
        moved.column_id = "done".into();
        moved.position = 1;
        let next = splice_column(&cards, "done", vec![cards[1].clone(), moved]);
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|c| c.column_id == "done"));
    }
}
