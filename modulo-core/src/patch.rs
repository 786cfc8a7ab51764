/// Field-level update intent.
///
/// A request field is either left alone or explicitly set. For nullable
/// fields the payload is itself an `Option`, so `Set(None)` clears the field
/// while `Unchanged` leaves it untouched. On the wire an absent key
/// deserializes to `Unchanged` (pair it with `#[serde(default)]`) and an
/// explicit `null` to `Set(None)`.
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unchanged,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Unchanged => Patch::Unchanged,
            Patch::Set(value) => Patch::Set(value),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Patch<U> {
        match self {
            Patch::Unchanged => Patch::Unchanged,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }

    /// Like [`Patch::map`] for fallible conversions (validation).
    pub fn try_map<U, E, F: FnOnce(T) -> Result<U, E>>(self, f: F) -> Result<Patch<U>, E> {
        match self {
            Patch::Unchanged => Ok(Patch::Unchanged),
            Patch::Set(value) => f(value).map(Patch::Set),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Unchanged => None,
            Patch::Set(value) => Some(value),
        }
    }
}

impl<T: Clone> Patch<T> {
    /// Overwrite `field` when set. Returns whether anything was written.
    pub fn apply_to(&self, field: &mut T) -> bool {
        match self {
            Patch::Unchanged => false,
            Patch::Set(value) => {
                *field = value.clone();
                true
            }
        }
    }
}

impl<T> From<T> for Patch<T> {
    fn from(value: T) -> Self {
        Patch::Set(value)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            // Only reachable without `skip_serializing_if`.
            Patch::Unchanged => s.serialize_none(),
            Patch::Set(value) => value.serialize(s),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        T::deserialize(d).map(Patch::Set)
    }
}
