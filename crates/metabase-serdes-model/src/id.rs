//! Entity identities.
//!
//! Most exported objects carry their own `entity_id`. Objects that live
//! inside a database (tables, fields, segments, metrics) have none and are
//! addressed by the ordered ids of their `serdes/meta` chain instead:
//!
//! ```text
//! Database  serdes/meta: [Sample Database]                        -> Id("Sample Database")
//! Table     serdes/meta: [Sample Database, PUBLIC, ORDERS]        -> Path([..3])
//! Field     serdes/meta: [Sample Database, PUBLIC, ORDERS, TOTAL] -> Path([..4])
//! ```
//!
//! `Id("x")` and `Path(["x"])` are different identities. Chains go through
//! [`EntityId::from_chain`], which collapses one-element chains to a plain id;
//! reference values go through [`EntityId::from_value`], which keeps the shape
//! of the value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// A standalone id (`entity_id`, database name, ...).
    Id(String),
    /// An ancestor chain, outermost first.
    Path(Vec<String>),
}

impl EntityId {
    pub fn id(id: impl Into<String>) -> Self {
        EntityId::Id(id.into())
    }

    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EntityId::Path(segments.into_iter().map(Into::into).collect())
    }

    /// Identity of an entity whose `serdes/meta` chain has these ids.
    pub fn from_chain(mut ids: Vec<String>) -> Option<Self> {
        match ids.len() {
            0 => None,
            1 => ids.pop().map(EntityId::Id),
            _ => Some(EntityId::Path(ids)),
        }
    }

    /// Interpret a reference slot of a document.
    ///
    /// Scalars become `Id`, sequences become `Path`. Null segments inside a
    /// sequence are dropped: the exporter writes `[db, null, table]` for
    /// schema-less databases while the table's own chain has no schema level.
    /// Anything else (maps, nested sequences, booleans, null) is not an id.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(EntityId::Id(s.clone())),
            Value::Number(n) => Some(EntityId::Id(n.to_string())),
            Value::Array(items) => {
                let mut segments = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Null => continue,
                        Value::String(s) => segments.push(s.clone()),
                        Value::Number(n) => segments.push(n.to_string()),
                        _ => return None,
                    }
                }
                if segments.is_empty() {
                    None
                } else {
                    Some(EntityId::Path(segments))
                }
            }
            _ => None,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, EntityId::Path(_))
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            EntityId::Id(id) => Some(id),
            EntityId::Path(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&[String]> {
        match self {
            EntityId::Id(_) => None,
            EntityId::Path(segments) => Some(segments),
        }
    }

    /// Identities of every enclosing scope, outermost first.
    ///
    /// `Path([db, schema, table])` yields `Id(db)` and `Path([db, schema])`.
    pub fn ancestors(&self) -> Vec<EntityId> {
        match self {
            EntityId::Id(_) => Vec::new(),
            EntityId::Path(segments) => (1..segments.len())
                .filter_map(|len| EntityId::from_chain(segments[..len].to_vec()))
                .collect(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Id(id) => write!(f, "`{id}`"),
            EntityId::Path(segments) => {
                f.write_str("[")?;
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "`{segment}`")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Id(value.to_string())
    }
}
