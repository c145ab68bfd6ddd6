//! Entity reference graph of a Metabase serialization export.
//!
//! ```text
//! ArchiveMember ──► metadata::extract_metadata ──► references::extract_references
//!      (rayon, one member per task, no shared state)
//!                              │
//!                              ▼  archive order
//!            EntityIndex::register / record_reference   (single writer)
//!                              │
//!                              ▼
//!                   EntityIndex::reconcile
//! ```
//!
//! Per-member work runs in parallel; everything that touches the index runs
//! on the calling thread in archive order, so duplicate conflicts and
//! reference lists come out the same on every run.
//!
//! ## Module Organization
//!
//! - `config`: build options
//! - `metadata`: kind and identity of one document
//! - `references`: per-kind reference rules
//! - `index`: the entity index

pub mod config;
pub mod index;
pub mod metadata;
pub mod references;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use metabase_serdes_model::{
    ArchiveMember, Diagnostic, DiagnosticSummary, EntityId, MemberDocument, MemberKind,
};

pub use config::GraphConfig;
pub use index::{EntityIndex, EntityRecord, Registration, Resolution};
pub use metadata::{
    extract_metadata, ChainLevel, EntityAttributes, EntityMetadata, MetadataOutcome, SkipReason,
};
pub use references::{
    extract_references, rule_for, ExtractedReferences, ExtractionRule, Reference,
    ReferenceSource, TargetScope,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build aborted at `{path}`: {message}")]
    Aborted { path: String, message: String },
}

/// A member left out of the index because it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMember {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub members: usize,
    pub directories: usize,
    pub skipped: usize,
    pub parse_failures: usize,
    pub entities: usize,
    pub duplicates: usize,
    pub references: usize,
    pub external: usize,
    pub dangling: usize,
}

/// Result of analysing one member, before anything touches the index.
#[derive(Debug)]
enum MemberAnalysis {
    Skipped {
        path: String,
        reason: SkipReason,
    },
    Failed {
        path: String,
        message: String,
    },
    Entity {
        path: String,
        metadata: EntityMetadata,
        extracted: ExtractedReferences,
    },
}

fn analyze_member(member: &ArchiveMember, config: &GraphConfig) -> Result<MemberAnalysis, BuildError> {
    let path = member.path.clone();
    let skipped = |reason: SkipReason| -> Result<MemberAnalysis, BuildError> {
        Ok(MemberAnalysis::Skipped {
            path: member.path.clone(),
            reason,
        })
    };

    match member.kind {
        MemberKind::Directory => return skipped(SkipReason::Directory),
        MemberKind::Other => return skipped(SkipReason::Other),
        MemberKind::File => {}
    }
    if !config.is_yaml(member) {
        return skipped(SkipReason::NotYaml);
    }

    // A blank document still gets a record: an identity synthesized from
    // its path, so two blank documents never collide.
    let blank = Value::Object(Map::new());
    let document: &Value = match &member.document {
        MemberDocument::Parsed(document) => document,
        MemberDocument::Empty => &blank,
        MemberDocument::NotParsed => return skipped(SkipReason::NotYaml),
        MemberDocument::ParseError(message) => {
            if config.fail_fast {
                return Err(BuildError::Aborted {
                    path,
                    message: message.clone(),
                });
            }
            return Ok(MemberAnalysis::Failed {
                path,
                message: message.clone(),
            });
        }
    };

    let metadata = match extract_metadata(&path, document, config) {
        MetadataOutcome::Entity(metadata) => metadata,
        MetadataOutcome::Skip(reason) => return skipped(reason),
    };

    let source = ReferenceSource {
        id: &metadata.id,
        kind: metadata.kind,
        path: &path,
        chain: &metadata.chain,
    };
    let extracted = extract_references(source, document, config);

    Ok(MemberAnalysis::Entity {
        path,
        metadata,
        extracted,
    })
}

/// The built graph: index plus everything reported while building it.
#[derive(Debug, Clone)]
pub struct ExportGraph {
    pub index: EntityIndex,
    pub diagnostics: Vec<Diagnostic>,
    pub skipped: Vec<SkippedMember>,
    pub stats: BuildStats,
    /// Configuration the graph was built with.
    pub config: GraphConfig,
}

impl ExportGraph {
    /// Build the graph from members in archive order.
    ///
    /// Per-member problems become diagnostics. With `fail_fast` set, the first
    /// unparseable member aborts the build and no index is returned.
    pub fn build(members: &[ArchiveMember], config: &GraphConfig) -> Result<Self, BuildError> {
        let analyses: Vec<MemberAnalysis> = if config.parallel {
            members
                .par_iter()
                .map(|member| analyze_member(member, config))
                .collect::<Result<_, _>>()?
        } else {
            members
                .iter()
                .map(|member| analyze_member(member, config))
                .collect::<Result<_, _>>()?
        };

        let mut graph = ExportGraph {
            index: EntityIndex::new(),
            diagnostics: Vec::new(),
            skipped: Vec::new(),
            stats: BuildStats {
                members: members.len(),
                ..BuildStats::default()
            },
            config: config.clone(),
        };

        for analysis in analyses {
            graph.merge(analysis);
        }

        let dangling = graph.index.reconcile(config);
        graph.stats.dangling = dangling.len();
        graph.stats.external = graph.index.placeholders().filter(|r| r.external).count();
        graph.diagnostics.extend(dangling);

        let summary = DiagnosticSummary::of(&graph.diagnostics);
        tracing::info!(
            members = graph.stats.members,
            entities = graph.stats.entities,
            references = graph.stats.references,
            skipped = graph.stats.skipped,
            parse_failures = graph.stats.parse_failures,
            dangling = graph.stats.dangling,
            errors = summary.error_count,
            warnings = summary.warning_count,
            "built entity reference graph"
        );
        if !graph.skipped.is_empty() {
            tracing::warn!(count = graph.skipped.len(), "members skipped for parse errors");
            for skipped in &graph.skipped {
                tracing::warn!(path = %skipped.path, error = %skipped.message, "skipped member");
            }
        }

        Ok(graph)
    }

    fn merge(&mut self, analysis: MemberAnalysis) {
        match analysis {
            MemberAnalysis::Skipped { path, reason } => {
                tracing::debug!(path = %path, reason = ?reason, "member not indexed");
                if reason == SkipReason::Directory {
                    self.stats.directories += 1;
                } else {
                    self.stats.skipped += 1;
                }
            }
            MemberAnalysis::Failed { path, message } => {
                tracing::warn!(path = %path, error = %message, "could not parse member");
                self.stats.parse_failures += 1;
                self.diagnostics.push(Diagnostic::ParseFailure {
                    path: path.clone(),
                    message: message.clone(),
                });
                self.skipped.push(SkippedMember { path, message });
            }
            MemberAnalysis::Entity {
                path,
                metadata,
                extracted,
            } => {
                self.diagnostics.extend(metadata.diagnostics);
                let registration = Registration {
                    id: metadata.id,
                    kind: metadata.kind,
                    model: metadata.model,
                    source_path: path,
                    chain: metadata.chain,
                    attributes: metadata.attributes,
                    synthesized_id: metadata.synthesized_id,
                };

                match self.index.register(registration) {
                    Ok(record) => {
                        tracing::debug!(id = %record.id, kind = %record.kind, "registered entity");
                        self.stats.entities += 1;
                    }
                    Err(conflict) => {
                        tracing::warn!(%conflict, "duplicate entity id");
                        self.stats.duplicates += 1;
                        self.diagnostics.push(conflict);
                        return;
                    }
                }

                self.diagnostics.extend(extracted.diagnostics);
                self.stats.references += extracted.references.len();
                for reference in extracted.references {
                    self.index.record_reference(reference);
                }
            }
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.index.get_registered(id)
    }

    /// Like [`EntityIndex::resolve`], with configured external ids counted
    /// as external even when nothing in the export references them.
    pub fn resolve(&self, id: &EntityId) -> Resolution {
        match self.index.resolve(id) {
            Resolution::Absent if self.config.is_external(id) => Resolution::External,
            resolution => resolution,
        }
    }

    pub fn incoming(&self, id: &EntityId) -> &[Reference] {
        self.index.incoming(id)
    }

    pub fn outgoing(&self, id: &EntityId) -> &[Reference] {
        self.index.outgoing(id)
    }

    pub fn summary(&self) -> DiagnosticSummary {
        DiagnosticSummary::of(&self.diagnostics)
    }
}
