//! Metadata extraction: classify a parsed document and derive its identity.
//!
//! Every exported document carries a `serdes/meta` chain describing the
//! scopes it is nested in, outermost first:
//!
//! ```yaml
//! serdes/meta:
//! - model: Database
//!   id: Sample Database
//! - model: Schema
//!   id: PUBLIC
//! - model: Table
//!   id: ORDERS
//! ```
//!
//! The last level names the document's own model. A one-level chain gives a
//! plain id; a longer chain gives the whole chain as a path id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use metabase_serdes_model::digest::synthesized_entity_id;
use metabase_serdes_model::{Diagnostic, EntityId, EntityKind, SERDES_META_KEY};

use crate::config::GraphConfig;

/// One level of a `serdes/meta` chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLevel {
    pub model: Option<String>,
    pub id: Option<String>,
}

/// Attributes kept on every indexed record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAttributes {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub archived: bool,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl EntityAttributes {
    pub fn from_document(document: &Value) -> Self {
        let text = |key: &str| document.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            name: text("name"),
            display_name: text("display_name"),
            archived: document
                .get("archived")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            entity_type: text("entity_type"),
            entity_id: text("entity_id"),
        }
    }
}

/// Classification and identity of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub kind: EntityKind,
    /// The model name as written, also when it is not a known kind.
    pub model: Option<String>,
    pub id: EntityId,
    pub chain: Vec<ChainLevel>,
    pub attributes: EntityAttributes,
    /// The id was synthesized from the member path.
    pub synthesized_id: bool,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The member matched `skip_file_names`.
    Configured,
    Directory,
    NotYaml,
    /// Neither a file nor a directory.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOutcome {
    Entity(EntityMetadata),
    Skip(SkipReason),
}

/// Read the `serdes/meta` chain of a document. Missing or malformed chains
/// come back empty.
pub fn read_chain(document: &Value) -> Vec<ChainLevel> {
    let Some(levels) = document.get(SERDES_META_KEY).and_then(Value::as_array) else {
        return Vec::new();
    };

    levels
        .iter()
        .map(|level| ChainLevel {
            model: level.get("model").and_then(Value::as_str).map(str::to_string),
            id: match level.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        })
        .collect()
}

/// Identity of a chain, if every level has an id.
pub fn chain_identity(chain: &[ChainLevel]) -> Option<EntityId> {
    let ids = chain
        .iter()
        .map(|level| level.id.clone())
        .collect::<Option<Vec<_>>>()?;
    EntityId::from_chain(ids)
}

/// Classify one parsed document found at `path`.
pub fn extract_metadata(path: &str, document: &Value, config: &GraphConfig) -> MetadataOutcome {
    if config.is_skipped(path) {
        tracing::debug!(path, "skipping configured member");
        return MetadataOutcome::Skip(SkipReason::Configured);
    }

    let chain = read_chain(document);
    let mut diagnostics = Vec::new();

    let model = chain.last().and_then(|level| level.model.clone());
    let kind = model
        .as_deref()
        .map(EntityKind::from_model)
        .unwrap_or(EntityKind::Unknown);

    if !kind.is_known() {
        tracing::warn!(path, model = ?model, "found object of unknown type");
        diagnostics.push(Diagnostic::UnknownEntityKind {
            path: path.to_string(),
            model: model.clone(),
        });
    }

    let (id, synthesized_id) = match chain_identity(&chain) {
        Some(id) => (id, false),
        None => {
            let synthesized = synthesized_entity_id(path);
            tracing::warn!(
                path,
                id = %synthesized,
                "object has no serdes/meta id; using an id generated from its path"
            );
            diagnostics.push(Diagnostic::MissingIdentity {
                path: path.to_string(),
                synthesized: synthesized.clone(),
            });
            (EntityId::Id(synthesized), true)
        }
    };

    let attributes = EntityAttributes::from_document(document);

    if !synthesized_id {
        let meta_id = chain.last().and_then(|level| level.id.as_deref());
        if let (Some(entity_id), Some(meta_id)) = (attributes.entity_id.as_deref(), meta_id) {
            if entity_id != meta_id {
                tracing::warn!(path, entity_id, meta_id, "entity_id differs from serdes/meta id");
                diagnostics.push(Diagnostic::IdentityMismatch {
                    path: path.to_string(),
                    entity_id: entity_id.to_string(),
                    meta_id: meta_id.to_string(),
                });
            }
        }
    }

    MetadataOutcome::Entity(EntityMetadata {
        kind,
        model,
        id,
        chain,
        attributes,
        synthesized_id,
        diagnostics,
    })
}
