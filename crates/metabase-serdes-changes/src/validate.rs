//! Referential validation of change requests against a built graph.
//!
//! Each request is checked on its own target, then every id its payload
//! references (found with the same per-kind rules used on the export) and
//! every declared dependency must resolve:
//!
//! ```text
//! dependency ─► deleted by another request?      ─► reject
//!            ─► archived and policy = exclude?   ─► reject
//!            ─► created by a viable request?     ─► Created
//!            ─► registered in the export?        ─► Export
//!            ─► known to live outside?           ─► External
//!            ─► otherwise                        ─► reject
//! ```
//!
//! Creates may depend on each other, so the set of viable creates is the
//! largest set whose dependencies all resolve (cycles among creates survive
//! here and are rejected by the precedence sort).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use metabase_serdes_graph::metadata::read_chain;
use metabase_serdes_graph::{extract_references, ExportGraph, ReferenceSource, Resolution, TargetScope};
use metabase_serdes_model::{Diagnostic, EntityId, EntityKind};

use crate::config::PlanConfig;
use crate::request::{ChangeOperation, ChangeRequest, ChangeState};

/// How a dependency was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum DependencySource {
    /// A document in the export.
    Export,
    /// Known to live outside the export.
    External,
    /// Created by another request of the same plan.
    Created { request: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub id: EntityId,
    /// Payload slot or `depends_on[k]`.
    pub label: String,
    pub source: DependencySource,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedChange {
    pub index: usize,
    pub request: ChangeRequest,
    /// Kind the payload was read as.
    pub kind: EntityKind,
    /// Identity brought into existence by a create.
    pub creates: Option<EntityId>,
    pub resolved_dependencies: Vec<ResolvedDependency>,
    pub state: ChangeState,
}

impl ValidatedChange {
    /// The entity this change acts on, existing or created.
    pub fn subject(&self) -> Option<&EntityId> {
        self.request.target.as_ref().or(self.creates.as_ref())
    }

    pub fn depends_on_creation(&self) -> bool {
        self.resolved_dependencies
            .iter()
            .any(|d| matches!(d.source, DependencySource::Created { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedChange {
    pub index: usize,
    pub request: ChangeRequest,
    pub state: ChangeState,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub validated: Vec<ValidatedChange>,
    pub rejected: Vec<RejectedChange>,
    /// Non-fatal findings (null slots in payloads).
    pub warnings: Vec<Diagnostic>,
}

/// A dependency as found, before resolution.
#[derive(Debug, Clone)]
struct Dependency {
    id: EntityId,
    label: String,
}

struct Candidate {
    kind: EntityKind,
    creates: Option<EntityId>,
    dependencies: Vec<Dependency>,
}

pub struct Validator<'a> {
    graph: &'a ExportGraph,
    config: &'a PlanConfig,
    requests: &'a [ChangeRequest],
    deleted_by: BTreeMap<&'a EntityId, usize>,
    archived_by: BTreeMap<&'a EntityId, usize>,
    created_by: BTreeMap<EntityId, usize>,
}

impl<'a> Validator<'a> {
    pub fn new(graph: &'a ExportGraph, requests: &'a [ChangeRequest], config: &'a PlanConfig) -> Self {
        let mut deleted_by = BTreeMap::new();
        let mut archived_by = BTreeMap::new();
        for (i, request) in requests.iter().enumerate() {
            let Some(target) = request.target.as_ref() else {
                continue;
            };
            match request.operation {
                ChangeOperation::Delete => {
                    deleted_by.entry(target).or_insert(i);
                }
                ChangeOperation::Archive => {
                    archived_by.entry(target).or_insert(i);
                }
                _ => {}
            }
        }

        Self {
            graph,
            config,
            requests,
            deleted_by,
            archived_by,
            created_by: BTreeMap::new(),
        }
    }

    pub fn validate(mut self) -> Validation {
        let mut validation = Validation::default();
        let mut candidates: BTreeMap<usize, Candidate> = BTreeMap::new();

        for (i, request) in self.requests.iter().enumerate() {
            if let Some(problem) = self.target_problem(i, request) {
                tracing::warn!(request = i, %problem, "change rejected");
                validation.rejected.push(rejected(i, request, vec![problem]));
                continue;
            }
            let (candidate, warnings) = self.candidate(i, request);
            validation.warnings.extend(warnings);
            candidates.insert(i, candidate);
        }

        // Two creates of the same id: the first one keeps it.
        for (&i, candidate) in &candidates {
            if let Some(id) = &candidate.creates {
                self.created_by.entry(id.clone()).or_insert(i);
            }
        }
        let duplicate_creates: Vec<usize> = candidates
            .iter()
            .filter(|&(&i, c)| {
                c.creates
                    .as_ref()
                    .is_some_and(|id| self.created_by.get(id) != Some(&i))
            })
            .map(|(&i, _)| i)
            .collect();
        for i in duplicate_creates {
            if let Some(candidate) = candidates.remove(&i) {
                let first = candidate
                    .creates
                    .as_ref()
                    .and_then(|id| self.created_by.get(id))
                    .copied()
                    .unwrap_or(i);
                let problem = self.invalid(i, format!("creates an id also created by change #{first}"));
                validation.rejected.push(rejected(i, &self.requests[i], vec![problem]));
            }
        }

        self.settle_creates(&candidates);

        for (i, candidate) in candidates {
            let request = &self.requests[i];
            let mut problems = Vec::new();
            let mut resolved = Vec::new();

            for dependency in &candidate.dependencies {
                match self.resolve(i, request, &dependency.id) {
                    Ok(source) => resolved.push(ResolvedDependency {
                        id: dependency.id.clone(),
                        label: dependency.label.clone(),
                        source,
                    }),
                    Err(reason) => problems.push(Diagnostic::MissingChangeDependency {
                        request: i,
                        dependency: dependency.id.clone(),
                        label: dependency.label.clone(),
                        reason,
                    }),
                }
            }

            if problems.is_empty() && self.config.reject_dangling_closure {
                problems.extend(self.dangling_closure(i, request, &resolved));
            }

            if problems.is_empty() {
                tracing::debug!(request = i, operation = %request.operation, "change validated");
                validation.validated.push(ValidatedChange {
                    index: i,
                    request: request.clone(),
                    kind: candidate.kind,
                    creates: candidate.creates,
                    resolved_dependencies: resolved,
                    state: ChangeState::Validated,
                });
            } else {
                for problem in &problems {
                    tracing::warn!(request = i, %problem, "change rejected");
                }
                validation.rejected.push(rejected(i, request, problems));
            }
        }

        validation.rejected.sort_by_key(|r| r.index);
        validation
    }

    fn invalid(&self, i: usize, reason: String) -> Diagnostic {
        Diagnostic::InvalidChangeTarget {
            request: i,
            operation: self.requests[i].operation.to_string(),
            reason,
        }
    }

    fn target_problem(&self, i: usize, request: &ChangeRequest) -> Option<Diagnostic> {
        let operation = request.operation;

        let Some(target) = request.target.as_ref() else {
            if operation.needs_target() {
                return Some(self.invalid(i, format!("{operation} requires a target")));
            }
            let created = request.created_id()?;
            if self.graph.resolve(&created) == Resolution::Registered {
                return Some(self.invalid(i, format!("creates {created}, which already exists in the export")));
            }
            return None;
        };

        if !operation.needs_target() {
            return Some(self.invalid(i, format!("create must not name a target, got {target}")));
        }

        let Some(record) = self.graph.get(target) else {
            return Some(Diagnostic::MissingChangeTarget {
                request: i,
                operation: operation.to_string(),
                target: target.clone(),
            });
        };

        if record.synthesized_id {
            return Some(self.invalid(
                i,
                format!("target {target} has an id synthesized from its path and cannot be changed"),
            ));
        }

        match self.deleted_by.get(target) {
            Some(&j) if j != i && (operation != ChangeOperation::Delete || j < i) => {
                Some(self.invalid(i, format!("target {target} is deleted by change #{j}")))
            }
            _ => None,
        }
    }

    /// Kind the payload is read as: declared, else from the payload's own
    /// chain, else the target's.
    fn proposed_kind(&self, request: &ChangeRequest) -> EntityKind {
        request
            .kind
            .or_else(|| request.payload_kind())
            .or_else(|| {
                request
                    .target
                    .as_ref()
                    .and_then(|t| self.graph.get(t))
                    .map(|record| record.kind)
            })
            .unwrap_or(EntityKind::Unknown)
    }

    fn candidate(&self, i: usize, request: &ChangeRequest) -> (Candidate, Vec<Diagnostic>) {
        let kind = self.proposed_kind(request);
        let creates = request.created_id();
        let subject = request
            .target
            .clone()
            .or_else(|| creates.clone())
            .unwrap_or_else(|| EntityId::id(format!("change #{i}")));
        let path = format!("change #{i}");
        let chain = read_chain(&request.payload);

        let source = ReferenceSource {
            id: &subject,
            kind,
            path: &path,
            chain: &chain,
        };
        let extracted = extract_references(source, &request.payload, &self.graph.config);

        let mut dependencies: Vec<Dependency> = Vec::new();
        let mut seen = BTreeSet::new();
        seen.insert(subject.clone());

        for reference in extracted.references {
            if reference.scope != TargetScope::Archive {
                continue;
            }
            if seen.insert(reference.target.clone()) {
                dependencies.push(Dependency {
                    id: reference.target,
                    label: reference.label,
                });
            }
        }
        for (k, id) in request.depends_on.iter().enumerate() {
            if seen.insert(id.clone()) {
                dependencies.push(Dependency {
                    id: id.clone(),
                    label: format!("depends_on[{k}]"),
                });
            }
        }

        (
            Candidate {
                kind,
                creates,
                dependencies,
            },
            extracted.diagnostics,
        )
    }

    /// Drop creates whose dependencies cannot resolve until nothing changes.
    fn settle_creates(&mut self, candidates: &BTreeMap<usize, Candidate>) {
        loop {
            let failing: Vec<EntityId> = self
                .created_by
                .iter()
                .filter(|(_, &i)| {
                    candidates.get(&i).is_some_and(|candidate| {
                        candidate
                            .dependencies
                            .iter()
                            .any(|d| self.resolve(i, &self.requests[i], &d.id).is_err())
                    })
                })
                .map(|(id, _)| id.clone())
                .collect();
            if failing.is_empty() {
                return;
            }
            for id in failing {
                self.created_by.remove(&id);
            }
        }
    }

    fn resolve(&self, i: usize, request: &ChangeRequest, id: &EntityId) -> Result<DependencySource, String> {
        let destructive = request.operation.is_destructive();

        if let Some(&j) = self.deleted_by.get(id) {
            if j != i {
                return Err(format!("is deleted by change #{j}"));
            }
        }
        if let Some(&j) = self.archived_by.get(id) {
            if j != i && !destructive && self.config.excludes_archived() {
                return Err(format!("is archived by change #{j}"));
            }
        }
        if let Some(&j) = self.created_by.get(id) {
            if j != i {
                return Ok(DependencySource::Created { request: j });
            }
        }

        match self.graph.resolve(id) {
            Resolution::Registered => {
                let archived = self
                    .graph
                    .get(id)
                    .is_some_and(|record| record.attributes.archived);
                if archived && !destructive && self.config.excludes_archived() {
                    Err("is archived".to_string())
                } else {
                    Ok(DependencySource::Export)
                }
            }
            Resolution::External => Ok(DependencySource::External),
            Resolution::Dangling | Resolution::Absent => Err("is not in the export".to_string()),
        }
    }

    /// Dangling references of what the request reads.
    ///
    /// Every dependency from the export is checked. The target is checked
    /// for move and archive, which keep its document's references as they
    /// are; update and replace may rewrite them, delete removes them.
    fn dangling_closure(
        &self,
        i: usize,
        request: &ChangeRequest,
        resolved: &[ResolvedDependency],
    ) -> Vec<Diagnostic> {
        let mut entities: Vec<&EntityId> = resolved
            .iter()
            .filter(|d| d.source == DependencySource::Export)
            .map(|d| &d.id)
            .collect();
        if matches!(request.operation, ChangeOperation::Move | ChangeOperation::Archive) {
            entities.extend(request.target.as_ref());
        }

        let mut problems = Vec::new();
        for entity in entities {
            for reference in self.graph.outgoing(entity) {
                if self.graph.resolve(&reference.target) == Resolution::Dangling {
                    problems.push(Diagnostic::DanglingDependency {
                        request: i,
                        entity: entity.clone(),
                        target: reference.target.clone(),
                        source_path: reference.source_path.clone(),
                        label: reference.label.clone(),
                    });
                }
            }
        }
        problems
    }
}

fn rejected(i: usize, request: &ChangeRequest, diagnostics: Vec<Diagnostic>) -> RejectedChange {
    RejectedChange {
        index: i,
        request: request.clone(),
        state: ChangeState::Rejected,
        diagnostics,
    }
}

/// Validate `requests` against `graph`.
pub fn validate_changes(graph: &ExportGraph, requests: &[ChangeRequest], config: &PlanConfig) -> Validation {
    Validator::new(graph, requests, config).validate()
}
