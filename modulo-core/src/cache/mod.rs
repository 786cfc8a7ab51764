pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Board, Card, Column, Note, Tag, Workspace};

pub use store::{CacheStore, RefreshTicket};

/// Identifies one cached collection: entity kind plus owning scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "boardId", rename_all = "camelCase")]
pub enum CacheKey {
    Workspaces,
    Boards,
    Columns(String),
    Cards(String),
    Tags(String),
    Notes(String),
}

impl CacheKey {
    /// The board this key is scoped to, if any.
    pub fn board_id(&self) -> Option<&str> {
        match self {
            CacheKey::Workspaces | CacheKey::Boards => None,
            CacheKey::Columns(b) | CacheKey::Cards(b) | CacheKey::Tags(b) | CacheKey::Notes(b) => {
                Some(b)
            }
        }
    }

    /// Every key owned by one board.
    pub fn board_scoped(board_id: &str) -> [CacheKey; 4] {
        [
            CacheKey::Columns(board_id.to_string()),
            CacheKey::Cards(board_id.to_string()),
            CacheKey::Tags(board_id.to_string()),
            CacheKey::Notes(board_id.to_string()),
        ]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Workspaces => write!(f, "workspaces"),
            CacheKey::Boards => write!(f, "boards"),
            CacheKey::Columns(b) => write!(f, "columns:{}", b),
            CacheKey::Cards(b) => write!(f, "cards:{}", b),
            CacheKey::Tags(b) => write!(f, "tags:{}", b),
            CacheKey::Notes(b) => write!(f, "notes:{}", b),
        }
    }
}

/// Last known value of one cached collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "camelCase")]
pub enum Snapshot {
    Workspaces(Vec<Workspace>),
    Boards(Vec<Board>),
    Columns(Vec<Column>),
    Cards(Vec<Card>),
    Tags(Vec<Tag>),
    Notes(Vec<Note>),
}

impl Snapshot {
    pub fn len(&self) -> usize {
        match self {
            Snapshot::Workspaces(v) => v.len(),
            Snapshot::Boards(v) => v.len(),
            Snapshot::Columns(v) => v.len(),
            Snapshot::Cards(v) => v.len(),
            Snapshot::Tags(v) => v.len(),
            Snapshot::Notes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn workspaces(&self) -> Option<&[Workspace]> {
        match self {
            Snapshot::Workspaces(v) => Some(v),
            _ => None,
        }
    }

    pub fn boards(&self) -> Option<&[Board]> {
        match self {
            Snapshot::Boards(v) => Some(v),
            _ => None,
        }
    }

    pub fn columns(&self) -> Option<&[Column]> {
        match self {
            Snapshot::Columns(v) => Some(v),
            _ => None,
        }
    }

    pub fn cards(&self) -> Option<&[Card]> {
        match self {
            Snapshot::Cards(v) => Some(v),
            _ => None,
        }
    }

    pub fn tags(&self) -> Option<&[Tag]> {
        match self {
            Snapshot::Tags(v) => Some(v),
            _ => None,
        }
    }

    pub fn notes(&self) -> Option<&[Note]> {
        match self {
            Snapshot::Notes(v) => Some(v),
            _ => None,
        }
    }
}

/// SHA-256 fingerprint of a serialized snapshot, used to skip redundant
/// notifications when a refresh brings back what is already cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    pub fn of(snapshot: &Snapshot) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        // Serializing plain data structs cannot fail; an empty digest input
        // only means the next replace always notifies.
        if let Ok(bytes) = serde_json::to_vec(snapshot) {
            hasher.update(&bytes);
        }
        Self(hex::encode(hasher.finalize()))
    }
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    Replaced { key: CacheKey },
    Invalidated { key: CacheKey },
    Evicted { key: CacheKey },
}

impl CacheEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            CacheEvent::Replaced { key }
            | CacheEvent::Invalidated { key }
            | CacheEvent::Evicted { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(CacheKey::Cards("board-42".into()).to_string(), "cards:board-42");
        assert_eq!(CacheKey::Boards.to_string(), "boards");
    }

    #[test]
    fn test_board_scoped_keys() {
        let keys = CacheKey::board_scoped("b1");
        assert!(keys.iter().all(|k| k.board_id() == Some("b1")));
        assert_eq!(CacheKey::Workspaces.board_id(), None);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = ContentFingerprint::of(&Snapshot::Tags(vec![]));
        let b = ContentFingerprint::of(&Snapshot::Tags(vec![]));
        assert_eq!(a, b);
        let c = ContentFingerprint::of(&Snapshot::Notes(vec![]));
        assert_ne!(a, c);
    }
}
