//! Exported entity models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The model of an exported entity, taken from the last element of its
/// `serdes/meta` chain.
///
/// Anything outside the known set is `Unknown`; it is still indexed so other
/// documents can resolve references to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Action,
    Card,
    Collection,
    Dashboard,
    Database,
    Field,
    Metric,
    NativeQuerySnippet,
    Segment,
    Table,
    Timeline,
    Unknown,
}

impl EntityKind {
    pub const KNOWN: [EntityKind; 11] = [
        EntityKind::Action,
        EntityKind::Card,
        EntityKind::Collection,
        EntityKind::Dashboard,
        EntityKind::Database,
        EntityKind::Field,
        EntityKind::Metric,
        EntityKind::NativeQuerySnippet,
        EntityKind::Segment,
        EntityKind::Table,
        EntityKind::Timeline,
    ];

    /// Classify a `serdes/meta` model name. Matching is exact, as written by
    /// the exporter.
    pub fn from_model(model: &str) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|kind| kind.as_str() == model)
            .unwrap_or(EntityKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Action => "Action",
            EntityKind::Card => "Card",
            EntityKind::Collection => "Collection",
            EntityKind::Dashboard => "Dashboard",
            EntityKind::Database => "Database",
            EntityKind::Field => "Field",
            EntityKind::Metric => "Metric",
            EntityKind::NativeQuerySnippet => "NativeQuerySnippet",
            EntityKind::Segment => "Segment",
            EntityKind::Table => "Table",
            EntityKind::Timeline => "Timeline",
            EntityKind::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EntityKind::Unknown)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_round_trip_through_their_names() {
        for kind in EntityKind::KNOWN {
            assert_eq!(EntityKind::from_model(kind.as_str()), kind);
        }
    }

    #[test]
    fn unrecognized_models_are_unknown() {
        assert_eq!(EntityKind::from_model("Schema"), EntityKind::Unknown);
        assert_eq!(EntityKind::from_model("card"), EntityKind::Unknown);
        assert_eq!(EntityKind::from_model(""), EntityKind::Unknown);
        assert!(!EntityKind::Unknown.is_known());
    }
}
