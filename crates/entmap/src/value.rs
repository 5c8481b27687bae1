//! Attribute values and primary keys.
//!
//! `Value` is the closed scalar surface carried between persistence records
//! and entity fields. `Key` is the primary-key subset of `Value` and is the
//! only shape the identity map will index by.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;
use ulid::Ulid;

///
/// KeyError
///

#[derive(Debug, ThisError)]
pub enum KeyError {
    #[error("value is not key-shaped: {value}")]
    NotKeyShaped { value: Value },
}

///
/// Value
///
/// Attribute value exchanged with the persistence collaborator.
/// Casting and coercion belong to the collaborator; the mapper moves
/// values verbatim.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float64(f64),
    Text(String),
    Ulid(#[serde(with = "ulid_repr")] Ulid),
    Blob(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Key view of this value, if it is key-shaped.
    #[must_use]
    pub fn as_key(&self) -> Option<Key> {
        Key::try_from_value(self.clone()).ok()
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Ulid(v) => write!(f, "{v}"),
            Self::Blob(v) => write!(f, "blob[{}]", v.len()),
            Self::List(v) => write!(f, "list[{}]", v.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Ulid> for Value {
    fn from(v: Ulid) -> Self {
        Self::Ulid(v)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Int(v) => Self::Int(v),
            Key::Uint(v) => Self::Uint(v),
            Key::Text(v) => Self::Text(v),
            Key::Ulid(v) => Self::Ulid(v),
        }
    }
}

///
/// Key
///
/// Primary-key subset of `Value`. Ordered and hashable so it can serve
/// as an index key in the identity map.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Key {
    Int(i64),
    Uint(u64),
    Text(String),
    Ulid(#[serde(with = "ulid_repr")] Ulid),
}

impl Key {
    pub fn try_from_value(value: Value) -> Result<Self, KeyError> {
        match value {
            Value::Int(v) => Ok(Self::Int(v)),
            Value::Uint(v) => Ok(Self::Uint(v)),
            Value::Text(v) => Ok(Self::Text(v)),
            Value::Ulid(v) => Ok(Self::Ulid(v)),
            other => Err(KeyError::NotKeyShaped { value: other }),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Ulid(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

// Stable u128 wire representation for ulids; the ulid crate's own serde
// support is feature-gated off in this workspace.
mod ulid_repr {
    use serde::{Deserialize, Deserializer, Serializer};
    use ulid::Ulid;

    pub(super) fn serialize<S: Serializer>(
        ulid: &Ulid,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128((*ulid).into())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Ulid, D::Error> {
        u128::deserialize(deserializer).map(Ulid::from)
    }
}

///
/// TESTS
///
