/// Dense position arithmetic for ordered sibling sets.
///
/// Every function here is pure: it takes the current sequence (ordered by
/// position) and returns a new one whose positions equal `index + base`.
/// Target indices are 0-based array indices and are clamped to the valid
/// range, so out-of-range input never fails.

/// Anything that lives in an ordered scope.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);
}

/// The kinds of parent scope, each with a fixed position base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Columns of a board.
    Columns,
    /// Cards of a column.
    Cards,
    /// Subtasks of a card.
    Subtasks,
}

impl Scope {
    pub const fn base(self) -> i64 {
        match self {
            Scope::Columns => 0,
            Scope::Cards => 0,
            Scope::Subtasks => 0,
        }
    }
}

/// Result of moving one item between two different scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossMove<T> {
    pub source: Vec<T>,
    pub destination: Vec<T>,
}

/// Clamp a requested insertion index into `[0, len]`.
pub fn clamp_index(target: i64, len: usize) -> usize {
    if target <= 0 {
        0
    } else {
        (target as usize).min(len)
    }
}

/// Stable sort by current position (ties keep their existing order).
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| item.position());
}

/// Assign `index + base` to every item, in place.
pub fn renumber<T: Positioned>(items: &mut [T], base: i64) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(index as i64 + base);
    }
}

/// Whether positions already form `base, base+1, ...` in order.
pub fn is_dense<T: Positioned>(items: &[T], base: i64) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position() == index as i64 + base)
}

/// Move `id` to `target` within one scope. `None` if `id` is not present.
pub fn reorder<T: Positioned + Clone>(
    items: &[T],
    id: &str,
    target: i64,
    base: i64,
) -> Option<Vec<T>> {
    let mut ordered = items.to_vec();
    sort_by_position(&mut ordered);
    let current = ordered.iter().position(|item| item.id() == id)?;
    let moving = ordered.remove(current);
    let index = clamp_index(target, ordered.len());
    ordered.insert(index, moving);
    renumber(&mut ordered, base);
    Some(ordered)
}

/// Move `id` out of `source` and into `destination` at `target`.
///
/// `reparent` patches the moving item's parent reference before it lands in
/// the destination. Callers whose source and destination are the same scope
/// must use [`reorder`] instead.
pub fn move_across<T, F>(
    source: &[T],
    destination: &[T],
    id: &str,
    target: i64,
    base: i64,
    reparent: F,
) -> Option<CrossMove<T>>
where
    T: Positioned + Clone,
    F: FnOnce(&mut T),
{
    let mut from = source.to_vec();
    sort_by_position(&mut from);
    let current = from.iter().position(|item| item.id() == id)?;
    let mut moving = from.remove(current);
    reparent(&mut moving);
    renumber(&mut from, base);

    let mut to = destination.to_vec();
    sort_by_position(&mut to);
    let index = clamp_index(target, to.len());
    to.insert(index, moving);
    renumber(&mut to, base);

    Some(CrossMove {
        source: from,
        destination: to,
    })
}

/// Insert a new item at `target` and renumber.
pub fn insert_at<T: Positioned + Clone>(items: &[T], item: T, target: i64, base: i64) -> Vec<T> {
    let mut ordered = items.to_vec();
    sort_by_position(&mut ordered);
    let index = clamp_index(target, ordered.len());
    ordered.insert(index, item);
    renumber(&mut ordered, base);
    ordered
}

/// Remove `id` and close the gap. `None` if `id` is not present.
pub fn remove<T: Positioned + Clone>(items: &[T], id: &str, base: i64) -> Option<Vec<T>> {
    let mut ordered = items.to_vec();
    sort_by_position(&mut ordered);
    let current = ordered.iter().position(|item| item.id() == id)?;
    ordered.remove(current);
    renumber(&mut ordered, base);
    Some(ordered)
}
