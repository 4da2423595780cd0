use crate::core::{identifiers::ColumnRef, value::Value};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// Position within the key space of a batched table.
///
/// A scalar key compares as a one-element tuple, so both forms share one
/// lexicographic order.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Key {
    /// Single integer primary key.
    Scalar(i64),

    /// Composite cursor, e.g. `(partition_id, id)`.
    Tuple(Vec<i64>),
}

impl Key {
    pub fn components(&self) -> &[i64] {
        match self {
            Key::Scalar(v) => std::slice::from_ref(v),
            Key::Tuple(parts) => parts,
        }
    }

    pub fn arity(&self) -> usize {
        self.components().len()
    }

    pub fn as_scalar(&self) -> Option<i64> {
        match self {
            Key::Scalar(v) => Some(*v),
            Key::Tuple(parts) if parts.len() == 1 => Some(parts[0]),
            Key::Tuple(_) => None,
        }
    }

    /// Builds a key from column values; a single value yields a scalar.
    pub fn from_components(mut parts: Vec<i64>) -> Self {
        if parts.len() == 1 {
            Key::Scalar(parts.remove(0))
        } else {
            Key::Tuple(parts)
        }
    }

    /// Statement parameters for this key, one per column.
    pub fn to_values(&self) -> Vec<Value> {
        self.components().iter().map(|v| Value::Int(*v)).collect()
    }

    /// The smallest key strictly greater than `self` in integer tuple space.
    /// Returns `None` when every component is already `i64::MAX`.
    pub fn successor(&self) -> Option<Key> {
        let mut parts = self.components().to_vec();
        for idx in (0..parts.len()).rev() {
            if parts[idx] < i64::MAX {
                parts[idx] += 1;
                return Some(Key::from_components(parts));
            }
            parts[idx] = i64::MIN;
        }
        None
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.components() == other.components()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components().hash(state);
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Scalar(value)
    }
}

impl From<Vec<i64>> for Key {
    fn from(value: Vec<i64>) -> Self {
        Key::Tuple(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Scalar(v) => write!(f, "{v}"),
            Key::Tuple(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", rendered.join(", "))
            }
        }
    }
}

/// The column(s) the key is read from, in ordering priority.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyColumns {
    Single(ColumnRef),
    Composite(Vec<ColumnRef>),
}

impl KeyColumns {
    pub fn single(name: &str) -> Self {
        KeyColumns::Single(ColumnRef::new(name))
    }

    pub fn composite(names: &[&str]) -> Self {
        KeyColumns::Composite(names.iter().map(|n| ColumnRef::new(*n)).collect())
    }

    pub fn columns(&self) -> &[ColumnRef] {
        match self {
            KeyColumns::Single(col) => std::slice::from_ref(col),
            KeyColumns::Composite(cols) => cols,
        }
    }

    pub fn len(&self) -> usize {
        self.columns().len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns().is_empty()
    }

    pub fn is_composite(&self) -> bool {
        self.len() > 1
    }

    /// Comma separated, quoted and optionally alias-qualified column list.
    pub fn render(&self, alias: Option<&str>) -> String {
        self.columns()
            .iter()
            .map(|c| c.qualified(alias))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for KeyColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.columns().iter().map(|c| c.name()).collect();
        f.write_str(&names.join(", "))
    }
}

/// How a range is carved into sub-batches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CursorStrategy {
    /// Ask the store for the next `sub_batch_size` existing keys.
    #[default]
    Keyset,

    /// Slice integer key space into fixed-width windows without reading the table.
    Arithmetic,
}
