/// Tag mutations and card tag assignment.
///
/// Cards embed copies of their tags, so renaming or deleting a tag writes
/// both `tags:<board>` and `cards:<board>`.
use chrono::Utc;

use super::{replace_by_id, upsert, Transaction};
use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::remote::{CreateTag, SetCardTags, UpdateTag};
use crate::tags::{refresh_embedded, resolve_tags};
use crate::types::{Card, Tag};
use crate::validate;

/// Tag lists are kept in label order, case-insensitively.
fn sorted(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort_by_key(|t| t.label.to_lowercase());
    tags
}

/// Apply `f` to the embedded tag list of every card.
fn map_card_tags(cards: &[Card], mut f: impl FnMut(&mut Vec<Tag>) -> bool) -> Option<Vec<Card>> {
    let mut next = cards.to_vec();
    let mut touched = false;
    for card in &mut next {
        touched |= f(&mut card.tags);
    }
    touched.then_some(next)
}

impl SyncEngine {
    pub async fn create_tag(&self, mut req: CreateTag) -> Result<Tag, EngineError> {
        validate::id(&req.board_id, "board id")?;
        req.label = validate::title(&req.label, "tag label", self.config.max_tag_label_length)?;
        req.color = validate::color(req.color, "tag")?;
        req.id = Self::next_id(&req.id);

        let now = Utc::now();
        let speculative = Tag {
            id: req.id.clone(),
            board_id: req.board_id.clone(),
            label: req.label.clone(),
            color: req.color.clone(),
            created_at: now,
            updated_at: now,
        };
        let tx = Transaction::new("create_tag")
            .affects(CacheKey::Tags(req.board_id.clone()))
            .speculate(move |_, snap| {
                let tags = upsert(snap.tags()?, speculative.clone(), |t| t.id.as_str());
                Some(Snapshot::Tags(sorted(tags)))
            })
            .reconcile(|_, snap, confirmed: &Tag| {
                let tags = upsert(snap.tags()?, confirmed.clone(), |t| t.id.as_str());
                Some(Snapshot::Tags(sorted(tags)))
            });
        self.execute(tx, self.remote.create_tag(req)).await
    }

    /// Rename or recolour a tag, including every chip on cached cards.
    pub async fn update_tag(&self, mut req: UpdateTag) -> Result<Tag, EngineError> {
        validate::id(&req.id, "tag id")?;
        let max = self.config.max_tag_label_length;
        req.label = req.label.try_map(|l| validate::title(&l, "tag label", max))?;
        req.color = req.color.try_map(|c| validate::color(c, "tag"))?;

        let patch = req.clone();
        let tx = Transaction::new("update_tag")
            .affects(CacheKey::Tags(req.board_id.clone()))
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |key, snap| {
                let apply = |tag: &mut Tag| {
                    patch.label.apply_to(&mut tag.label);
                    patch.color.apply_to(&mut tag.color);
                    tag.updated_at = Utc::now();
                };
                match key {
                    CacheKey::Tags(_) => {
                        let tags = replace_by_id(snap.tags()?, &patch.id, |t| t.id.as_str(), apply)?;
                        Some(Snapshot::Tags(sorted(tags)))
                    }
                    CacheKey::Cards(_) => {
                        let cards = map_card_tags(snap.cards()?, |chips| {
                            let mut touched = false;
                            for chip in chips.iter_mut().filter(|t| t.id == patch.id) {
                                apply(chip);
                                touched = true;
                            }
                            touched
                        })?;
                        Some(Snapshot::Cards(cards))
                    }
                    _ => None,
                }
            })
            .reconcile(|key, snap, confirmed: &Tag| match key {
                CacheKey::Tags(_) => {
                    let tags = upsert(snap.tags()?, confirmed.clone(), |t| t.id.as_str());
                    Some(Snapshot::Tags(sorted(tags)))
                }
                CacheKey::Cards(_) => {
                    let cards = map_card_tags(snap.cards()?, |chips| {
                        refresh_embedded(chips, confirmed)
                    })?;
                    Some(Snapshot::Cards(cards))
                }
                _ => None,
            });
        self.execute(tx, self.remote.update_tag(req)).await
    }

    /// Delete a tag and strip it from every cached card.
    pub async fn delete_tag(&self, id: &str, board_id: &str) -> Result<(), EngineError> {
        validate::id(id, "tag id")?;
        validate::id(board_id, "board id")?;

        let tag_id = id.to_string();
        let tx = Transaction::new("delete_tag")
            .affects(CacheKey::Tags(board_id.to_string()))
            .affects(CacheKey::Cards(board_id.to_string()))
            .speculate(move |key, snap| match key {
                CacheKey::Tags(_) => {
                    let tags: Vec<Tag> = snap
                        .tags()?
                        .iter()
                        .filter(|t| t.id != tag_id)
                        .cloned()
                        .collect();
                    Some(Snapshot::Tags(tags))
                }
                CacheKey::Cards(_) => {
                    let cards = map_card_tags(snap.cards()?, |chips| {
                        let before = chips.len();
                        chips.retain(|t| t.id != tag_id);
                        chips.len() != before
                    })?;
                    Some(Snapshot::Cards(cards))
                }
                _ => None,
            });
        self.execute(tx, self.remote.delete_tag(id, board_id)).await
    }

    /// Replace the tags on a card. The speculative chips come from the
    /// cached tags of the board; the service's list replaces them on
    /// success. Without cached tags the card is left untouched until then.
    pub async fn set_card_tags(&self, req: SetCardTags) -> Result<Vec<Tag>, EngineError> {
        validate::id(&req.card_id, "card id")?;
        validate::id(&req.board_id, "board id")?;

        let cached_tags = self
            .read(&CacheKey::Tags(req.board_id.clone()))
            .and_then(|s| s.tags().map(<[Tag]>::to_vec));
        let speculative = cached_tags.map(|cached| resolve_tags(&req.tag_ids, &cached));
        if speculative.is_none() {
            log::debug!(
                target: "modulo.tx",
                "set_card_tags: tags:{} not cached, card {} passes through",
                req.board_id,
                req.card_id
            );
        }

        let card_id = req.card_id.clone();
        let confirmed_card_id = req.card_id.clone();
        let tx = Transaction::new("set_card_tags")
            .affects(CacheKey::Cards(req.board_id.clone()))
            .speculate(move |_, snap| {
                let chips = speculative.clone()?;
                let cards = replace_by_id(snap.cards()?, &card_id, |c| c.id.as_str(), |card| {
                    card.tags = chips;
                    card.updated_at = Utc::now();
                })?;
                Some(Snapshot::Cards(cards))
            })
            .reconcile(move |_, snap, confirmed: &Vec<Tag>| {
                let cards = replace_by_id(snap.cards()?, &confirmed_card_id, |c| c.id.as_str(), |card| {
                    card.tags = confirmed.clone();
                })?;
                Some(Snapshot::Cards(cards))
            });
        self.execute(tx, self.remote.set_card_tags(req)).await
    }
}
