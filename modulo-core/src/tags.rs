/// Tag association resolution against the cached tag collection.
use std::collections::{HashMap, HashSet};

use crate::types::Tag;

/// Full tag objects for `ids`, in request order.
///
/// IDs missing from `cached` are dropped rather than replaced by
/// placeholders; duplicate and blank IDs collapse.
pub fn resolve_tags(ids: &[String], cached: &[Tag]) -> Vec<Tag> {
    let by_id: HashMap<&str, &Tag> = cached.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if id.is_empty() || !seen.insert(id) {
            continue;
        }
        match by_id.get(id) {
            Some(tag) => resolved.push((*tag).clone()),
            None => log::debug!(target: "modulo.tags", "dropping unknown tag {}", id),
        }
    }
    resolved
}

/// Replace every embedded copy of `updated` in `tags`.
pub fn refresh_embedded(tags: &mut [Tag], updated: &Tag) -> bool {
    let mut touched = false;
    for tag in tags.iter_mut().filter(|t| t.id == updated.id) {
        *tag = updated.clone();
        touched = true;
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tag;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unknown_ids_are_dropped_in_order() {
        let cached = vec![tag("b1", "t1", "bug"), tag("b1", "t3", "ux")];
        let resolved = resolve_tags(&ids(&["t1", "t2", "t3"]), &cached);
        let got: Vec<&str> = resolved.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(got, vec!["t1", "t3"]);
    }

    #[test]
    fn test_request_order_is_kept() {
        let cached = vec![tag("b1", "a", "A"), tag("b1", "b", "B")];
        let resolved = resolve_tags(&ids(&["b", "a"]), &cached);
        assert_eq!(resolved[0].label, "B");
        assert_eq!(resolved[1].label, "A");
    }

    #[test]
    fn test_duplicates_and_blanks_collapse() {
        let cached = vec![tag("b1", "a", "A")];
        let resolved = resolve_tags(&ids(&["a", " ", "a"]), &cached);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_empty_cache_resolves_nothing() {
        assert!(resolve_tags(&ids(&["a"]), &[]).is_empty());
    }

    #[test]
    fn test_refresh_embedded() {
        let mut chips = vec![tag("b1", "a", "old"), tag("b1", "b", "B")];
        let updated = tag("b1", "a", "new");
        assert!(refresh_embedded(&mut chips, &updated));
        assert_eq!(chips[0].label, "new");
        assert!(!refresh_embedded(&mut chips, &tag("b1", "zzz", "x")));
    }
}
