//! The entity index: one record per identity, found by plain id or by path.
//!
//! ```text
//! by_id:   AHashMap<String, usize>       ─┐
//!                                          ├─► records: Vec<EntityRecord>
//! by_path: AHashMap<Vec<String>, usize>  ─┘
//! ```
//!
//! Records live in a `Vec` in creation order, so every listing is
//! deterministic; the maps only answer lookups. A reference to an id that has
//! no document yet creates a placeholder record. Placeholders still
//! unregistered when the build ends are settled by [`EntityIndex::reconcile`].

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use metabase_serdes_model::{Diagnostic, EntityId, EntityKind};

use crate::config::GraphConfig;
use crate::metadata::{ChainLevel, EntityAttributes};
use crate::references::Reference;

/// How an id resolves against a built index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Backed by a document in the export.
    Registered,
    /// Referenced, not in the export, and not expected to be.
    External,
    /// Referenced, not in the export, and expected to be.
    Dangling,
    /// Never seen.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Model name as declared, kept for unknown kinds.
    pub model: Option<String>,
    /// Member path of the document; `None` while the record is a placeholder.
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<ChainLevel>,
    pub attributes: EntityAttributes,
    pub synthesized_id: bool,
    /// Placeholder settled as living outside the export.
    pub external: bool,
    pub outgoing: Vec<Reference>,
    pub incoming: Vec<Reference>,
}

impl EntityRecord {
    fn placeholder(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            model: None,
            source_path: None,
            chain: Vec::new(),
            attributes: EntityAttributes::default(),
            synthesized_id: false,
            external: false,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.source_path.is_some()
    }

    pub fn resolution(&self) -> Resolution {
        if self.is_registered() {
            Resolution::Registered
        } else if self.external {
            Resolution::External
        } else {
            Resolution::Dangling
        }
    }
}

/// What a document contributes when it is registered.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: EntityId,
    pub kind: EntityKind,
    pub model: Option<String>,
    pub source_path: String,
    pub chain: Vec<ChainLevel>,
    pub attributes: EntityAttributes,
    pub synthesized_id: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    records: Vec<EntityRecord>,
    by_id: AHashMap<String, usize>,
    by_path: AHashMap<Vec<String>, usize>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &EntityId) -> Option<usize> {
        match id {
            EntityId::Id(id) => self.by_id.get(id).copied(),
            EntityId::Path(path) => self.by_path.get(path).copied(),
        }
    }

    fn insert(&mut self, record: EntityRecord) -> usize {
        let slot = self.records.len();
        match &record.id {
            EntityId::Id(id) => {
                self.by_id.insert(id.clone(), slot);
            }
            EntityId::Path(path) => {
                self.by_path.insert(path.clone(), slot);
            }
        }
        self.records.push(record);
        slot
    }

    fn slot_or_placeholder(&mut self, id: &EntityId, kind: Option<EntityKind>) -> usize {
        match self.slot(id) {
            Some(slot) => slot,
            None => self.insert(EntityRecord::placeholder(
                id.clone(),
                kind.unwrap_or(EntityKind::Unknown),
            )),
        }
    }

    /// Register the document of an entity.
    ///
    /// Filling a placeholder or registering the same path again succeeds.
    /// Another path under the same id is a conflict: the record keeps its
    /// first registration and the conflict comes back as the error.
    pub fn register(&mut self, registration: Registration) -> Result<&EntityRecord, Diagnostic> {
        let slot = self.slot_or_placeholder(&registration.id, Some(registration.kind));
        let record = &mut self.records[slot];

        match record.source_path.as_deref() {
            Some(existing) if existing == registration.source_path => {}
            Some(existing) => {
                return Err(Diagnostic::DuplicateEntityId {
                    id: registration.id,
                    first_path: existing.to_string(),
                    first_kind: record.kind,
                    second_path: registration.source_path,
                    second_kind: registration.kind,
                });
            }
            None => {
                record.kind = registration.kind;
                record.model = registration.model;
                record.source_path = Some(registration.source_path);
                record.chain = registration.chain;
                record.attributes = registration.attributes;
                record.synthesized_id = registration.synthesized_id;
                record.external = false;
            }
        }

        Ok(&self.records[slot])
    }

    /// Record `reference` as inbound on its target, creating a placeholder
    /// target if needed, and as outbound on its source when the source is
    /// registered from the same document.
    pub fn record_reference(&mut self, reference: Reference) {
        let target = self.slot_or_placeholder(&reference.target, reference.target_kind);

        if let Some(source) = self.slot(&reference.source_id) {
            let record = &mut self.records[source];
            if record.source_path.as_deref() == Some(reference.source_path.as_str()) {
                record.outgoing.push(reference.clone());
            }
        }

        self.records[target].incoming.push(reference);
    }

    /// Settle every placeholder as external or dangling.
    ///
    /// A placeholder is external when it is configured as such or when no
    /// reference to it expects a document of its own. Otherwise each
    /// reference expecting a document is reported as dangling.
    pub fn reconcile(&mut self, config: &GraphConfig) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for record in self.records.iter_mut().filter(|r| !r.is_registered()) {
            record.external = config.is_external(&record.id)
                || record.incoming.iter().all(|r| !r.scope.expects_document());
            if record.external {
                continue;
            }

            for reference in record.incoming.iter().filter(|r| r.scope.expects_document()) {
                tracing::warn!(
                    target_id = %record.id,
                    source = %reference.source_path,
                    label = %reference.label,
                    "reference to an entity missing from the export"
                );
                diagnostics.push(Diagnostic::DanglingReference {
                    target: record.id.clone(),
                    source_id: reference.source_id.clone(),
                    source_path: reference.source_path.clone(),
                    label: reference.label.clone(),
                });
            }
        }

        diagnostics
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Any record under `id`, placeholders included.
    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.slot(id).map(|slot| &self.records[slot])
    }

    /// The record under `id` if a document backs it.
    pub fn get_registered(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.get(id).filter(|r| r.is_registered())
    }

    pub fn get_by_id(&self, id: &str) -> Option<&EntityRecord> {
        self.by_id.get(id).map(|&slot| &self.records[slot])
    }

    pub fn get_by_path(&self, path: &[String]) -> Option<&EntityRecord> {
        self.by_path.get(path).map(|&slot| &self.records[slot])
    }

    pub fn resolve(&self, id: &EntityId) -> Resolution {
        self.get(id)
            .map(EntityRecord::resolution)
            .unwrap_or(Resolution::Absent)
    }

    pub fn incoming(&self, id: &EntityId) -> &[Reference] {
        self.get(id).map(|r| r.incoming.as_slice()).unwrap_or(&[])
    }

    pub fn outgoing(&self, id: &EntityId) -> &[Reference] {
        self.get(id).map(|r| r.outgoing.as_slice()).unwrap_or(&[])
    }

    /// Every record, placeholders included, in creation order.
    pub fn records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter()
    }

    pub fn registered(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter().filter(|r| r.is_registered())
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter().filter(|r| !r.is_registered())
    }

    /// Number of records, placeholders included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
