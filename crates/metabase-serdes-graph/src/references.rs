//! Reference extraction.
//!
//! One rule per [`EntityKind`], looked up through [`rule_for`]. A rule walks
//! the raw document of that kind and pushes every cross-entity reference it
//! finds into a [`Collector`], labelled with the path expression of the slot
//! it was read from:
//!
//! ```text
//! Dashboard ─► collection_id
//!          ─► dashboard.dashcards[i].card_id
//!          ─► dashboard.dashcards[i].parameter_mappings[j].action_id
//! Card      ─► dataset_query.query.source-table        (scalar: Card, path: Table)
//!          ─► dataset_query.query.joins[i].condition[j][1]
//! Field     ─► table_id, serdes/meta[i].id              (implied ancestors)
//! ```
//!
//! The same rules run over change-request payloads, so anything a payload
//! would reference is checked exactly like the exported documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use metabase_serdes_model::{Diagnostic, EntityId, EntityKind};

use crate::config::GraphConfig;
use crate::metadata::ChainLevel;

/// Where the target of a reference is expected to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    /// A document of its own somewhere in the export.
    Archive,
    /// A metadata-chain level that never gets a document (schemas).
    ImpliedAncestor,
    /// An object nested inside the source document (dashcards).
    Embedded,
}

impl TargetScope {
    pub fn expects_document(self) -> bool {
        matches!(self, TargetScope::Archive)
    }
}

/// A directed edge from one entity's document to another entity's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub target: EntityId,
    /// Kind the rule expects at the target, when the slot fixes it.
    pub target_kind: Option<EntityKind>,
    pub scope: TargetScope,
    /// Path expression of the slot inside the source document.
    pub label: String,
    pub source_id: EntityId,
    pub source_kind: EntityKind,
    pub source_path: String,
}

/// The entity a document belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSource<'a> {
    pub id: &'a EntityId,
    pub kind: EntityKind,
    pub path: &'a str,
    pub chain: &'a [ChainLevel],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedReferences {
    pub references: Vec<Reference>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Collector<'a> {
    source: ReferenceSource<'a>,
    config: &'a GraphConfig,
    out: ExtractedReferences,
}

impl<'a> Collector<'a> {
    pub fn new(source: ReferenceSource<'a>, config: &'a GraphConfig) -> Self {
        Self {
            source,
            config,
            out: ExtractedReferences::default(),
        }
    }

    pub fn finish(self) -> ExtractedReferences {
        self.out
    }

    fn push(
        &mut self,
        target: EntityId,
        target_kind: Option<EntityKind>,
        scope: TargetScope,
        label: String,
    ) {
        self.out.references.push(Reference {
            target,
            target_kind,
            scope,
            label,
            source_id: self.source.id.clone(),
            source_kind: self.source.kind,
            source_path: self.source.path.to_string(),
        });
    }

    fn null_reference(&mut self, label: String) {
        tracing::warn!(path = self.source.path, label = %label, "reference slot is null");
        self.out.diagnostics.push(Diagnostic::NullReference {
            path: self.source.path.to_string(),
            label,
        });
    }

    /// A slot that may be absent or null.
    fn optional_id(&mut self, value: Option<&Value>, kind: EntityKind, label: impl Into<String>) {
        if let Some(target) = value.and_then(EntityId::from_value) {
            self.push(target, Some(kind), TargetScope::Archive, label.into());
        }
    }

    /// A slot that may be absent but must not be null when present.
    fn required_id(&mut self, value: Option<&Value>, kind: EntityKind, label: impl Into<String>) {
        match value {
            None => {}
            Some(Value::Null) => self.null_reference(label.into()),
            Some(value) => self.optional_id(Some(value), kind, label),
        }
    }

    /// `source-table`: a path is a Table, a scalar is a saved question.
    fn source_table(&mut self, value: &Value, label: String) {
        let kind = if value.is_array() {
            EntityKind::Table
        } else {
            EntityKind::Card
        };
        self.required_id(Some(value), kind, label);
    }

    /// `["field", <path>, <options>]` clauses. Only path-shaped operands are
    /// entity references; a string operand names a column of a nested query.
    fn field_clause(&mut self, clause: &Value, label: &str) -> bool {
        let Some(items) = clause.as_array() else {
            return false;
        };
        if items.first().and_then(Value::as_str) != Some("field") {
            return false;
        }
        if let Some(path @ Value::Array(_)) = items.get(1) {
            self.optional_id(Some(path), EntityKind::Field, format!("{label}[1]"));
        }
        true
    }

    /// Implied parent references from the source's own metadata chain.
    fn ancestors(&mut self) {
        let chain = self.source.chain;
        for depth in 1..chain.len() {
            let prefix = chain[..depth]
                .iter()
                .map(|level| level.id.clone())
                .collect::<Option<Vec<_>>>();
            let Some(target) = prefix.and_then(EntityId::from_chain) else {
                continue;
            };
            let model = chain[depth - 1].model.as_deref();
            let scope = match model {
                Some(model) if self.config.is_implicit_scope(model) => TargetScope::ImpliedAncestor,
                _ => TargetScope::Archive,
            };
            let kind = model.map(EntityKind::from_model).filter(|k| k.is_known());
            self.push(target, kind, scope, format!("serdes/meta[{}].id", depth - 1));
        }
    }
}

pub type ExtractionRule = fn(&mut Collector<'_>, &Value);

/// The extraction rule of a kind.
pub fn rule_for(kind: EntityKind) -> ExtractionRule {
    match kind {
        EntityKind::Action => action_references,
        EntityKind::Card => card_references,
        EntityKind::Collection => collection_references,
        EntityKind::Dashboard => dashboard_references,
        EntityKind::Field => field_references,
        EntityKind::Metric | EntityKind::Segment => table_measure_references,
        EntityKind::Table => table_references,
        EntityKind::Timeline => timeline_references,
        EntityKind::Database | EntityKind::NativeQuerySnippet | EntityKind::Unknown => no_references,
    }
}

/// Every outgoing reference of `document`, read as an entity of `source.kind`.
pub fn extract_references(
    source: ReferenceSource<'_>,
    document: &Value,
    config: &GraphConfig,
) -> ExtractedReferences {
    let mut collector = Collector::new(source, config);
    rule_for(source.kind)(&mut collector, document);
    collector.finish()
}

// ============================================================================
// Rules
// ============================================================================

fn no_references(_: &mut Collector<'_>, _: &Value) {}

fn collection_references(c: &mut Collector<'_>, doc: &Value) {
    c.optional_id(doc.get("parent_id"), EntityKind::Collection, "parent_id");
}

fn timeline_references(c: &mut Collector<'_>, doc: &Value) {
    c.optional_id(doc.get("collection_id"), EntityKind::Collection, "collection_id");
}

fn action_references(c: &mut Collector<'_>, doc: &Value) {
    c.required_id(doc.get("model_id"), EntityKind::Card, "model_id");
}

fn field_references(c: &mut Collector<'_>, doc: &Value) {
    c.optional_id(doc.get("table_id"), EntityKind::Table, "table_id");
    c.ancestors();
    c.optional_id(doc.get("fk_target_field_id"), EntityKind::Field, "fk_target_field_id");
    c.optional_id(doc.get("parent_id"), EntityKind::Field, "parent_id");
}

fn table_references(c: &mut Collector<'_>, doc: &Value) {
    c.optional_id(doc.get("db_id"), EntityKind::Database, "db_id");
    c.ancestors();
}

fn table_measure_references(c: &mut Collector<'_>, doc: &Value) {
    match doc.get("table_id") {
        Some(table) if !table.is_null() => {
            c.optional_id(Some(table), EntityKind::Table, "table_id");
        }
        _ => {
            if let Some(source) = doc.pointer("/definition/source-table") {
                c.source_table(source, "definition.source-table".to_string());
            }
        }
    }
}

fn dashboard_references(c: &mut Collector<'_>, doc: &Value) {
    c.optional_id(doc.get("collection_id"), EntityKind::Collection, "collection_id");

    let Some(dashcards) = doc.get("dashcards").and_then(Value::as_array) else {
        return;
    };

    for (i, dashcard) in dashcards.iter().enumerate() {
        let base = format!("dashboard.dashcards[{i}]");

        if let Some(own) = dashcard.get("entity_id").and_then(EntityId::from_value) {
            c.push(own, None, TargetScope::Embedded, format!("{base}.entity_id"));
        }

        let is_virtual = dashcard
            .pointer("/visualization_settings/virtual_card")
            .is_some();
        if !is_virtual {
            // Absent is fine (action buttons carry no card); null is not.
            c.required_id(dashcard.get("card_id"), EntityKind::Card, format!("{base}.card_id"));
        }

        c.optional_id(dashcard.get("action_id"), EntityKind::Action, format!("{base}.action_id"));

        if let Some(series) = dashcard.get("series").and_then(Value::as_array) {
            for (k, entry) in series.iter().enumerate() {
                c.required_id(
                    entry.get("card_id"),
                    EntityKind::Card,
                    format!("{base}.series[{k}].card_id"),
                );
            }
        }

        if let Some(mappings) = dashcard.get("parameter_mappings").and_then(Value::as_array) {
            for (j, mapping) in mappings.iter().enumerate() {
                c.optional_id(
                    mapping.get("card_id"),
                    EntityKind::Card,
                    format!("{base}.parameter_mappings[{j}].card_id"),
                );
                c.optional_id(
                    mapping.get("action_id"),
                    EntityKind::Action,
                    format!("{base}.parameter_mappings[{j}].action_id"),
                );
            }
        }
    }
}

fn card_references(c: &mut Collector<'_>, doc: &Value) {
    c.optional_id(doc.get("collection_id"), EntityKind::Collection, "collection_id");
    c.required_id(doc.get("database_id"), EntityKind::Database, "database_id");
    c.optional_id(doc.get("table_id"), EntityKind::Table, "table_id");

    if let Some(dataset_query) = doc.get("dataset_query") {
        c.optional_id(
            dataset_query.get("database"),
            EntityKind::Database,
            "dataset_query.database",
        );
        if let Some(query) = dataset_query.get("query") {
            scan_query(c, query, "dataset_query.query");
        }
        if let Some(tags) = dataset_query
            .pointer("/native/template-tags")
            .and_then(Value::as_object)
        {
            for (name, tag) in tags {
                let base = format!("dataset_query.native.template-tags.{name}");
                c.optional_id(tag.get("card-id"), EntityKind::Card, format!("{base}.card-id"));
                c.optional_id(
                    tag.get("snippet-id"),
                    EntityKind::NativeQuerySnippet,
                    format!("{base}.snippet-id"),
                );
            }
        }
    }

    if let Some(columns) = doc.get("result_metadata").and_then(Value::as_array) {
        for (i, column) in columns.iter().enumerate() {
            if let Some(id @ Value::Array(_)) = column.get("id") {
                c.optional_id(Some(id), EntityKind::Field, format!("result_metadata[{i}].id"));
            }
            if let Some(field_ref) = column.get("field_ref") {
                c.field_clause(field_ref, &format!("result_metadata[{i}].field_ref"));
            }
        }
    }
}

/// One MBQL query map; recurses into `source-query`.
fn scan_query(c: &mut Collector<'_>, query: &Value, label: &str) {
    if let Some(source) = query.get("source-table") {
        c.source_table(source, format!("{label}.source-table"));
    }

    if let Some(joins) = query.get("joins").and_then(Value::as_array) {
        for (i, join) in joins.iter().enumerate() {
            let base = format!("{label}.joins[{i}]");
            if let Some(source) = join.get("source-table") {
                c.source_table(source, format!("{base}.source-table"));
            }
            if let Some(source_query) = join.get("source-query") {
                scan_query(c, source_query, &format!("{base}.source-query"));
            }
            if let Some(condition) = join.get("condition") {
                scan_condition(c, condition, &format!("{base}.condition"));
            }
        }
    }

    if let Some(source_query) = query.get("source-query") {
        scan_query(c, source_query, &format!("{label}.source-query"));
    }
}

/// Field clauses inside a join condition, through `and`/`or`/`not` nesting.
fn scan_condition(c: &mut Collector<'_>, clause: &Value, label: &str) {
    if c.field_clause(clause, label) {
        return;
    }
    let Some(items) = clause.as_array() else {
        return;
    };
    for (j, operand) in items.iter().enumerate().skip(1) {
        if operand.is_array() {
            scan_condition(c, operand, &format!("{label}[{j}]"));
        }
    }
}
