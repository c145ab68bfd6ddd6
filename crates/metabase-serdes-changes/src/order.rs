//! Precedence ordering of validated changes.
//!
//! Changes are bucketed by [`PrecedenceClass`] and ordered inside a bucket by
//! Kahn's algorithm over their dependency edges, ties going to input order.
//! Two kinds of edges exist:
//!
//! - **hard** edges come from what a request declared or its payload
//!   references, and from entities created in the plan. The change acting on
//!   the referenced entity always goes first. They apply across classes; one
//!   that points from a later class back to an earlier class cannot be
//!   honoured and rejects the plan.
//! - **soft** edges come from references already present in the export
//!   between two targets of the same class. Between two destructive changes
//!   the referencing entity goes first (delete a dashboard before the card it
//!   shows); otherwise the referenced entity goes first.

use std::collections::{BTreeMap, BTreeSet};

use metabase_serdes_graph::ExportGraph;
use metabase_serdes_model::EntityId;

use crate::request::{ChangeOperation, PrecedenceClass};
use crate::validate::{DependencySource, ValidatedChange};

/// Class of a validated change. Edits that link to something created in the
/// same plan move into the create-and-link class.
pub fn precedence_class(change: &ValidatedChange) -> PrecedenceClass {
    let promotable = matches!(
        change.request.operation,
        ChangeOperation::Update | ChangeOperation::Move | ChangeOperation::Replace
    );
    if promotable && change.depends_on_creation() {
        PrecedenceClass::CreateAndLink
    } else {
        change.request.operation.class()
    }
}

/// Dependency edges between validated changes, by position in the slice.
#[derive(Debug, Clone, Default)]
pub struct PrecedenceGraph {
    classes: Vec<PrecedenceClass>,
    /// `(before, after)`
    edges: BTreeSet<(usize, usize)>,
    /// Hard edges running against class order.
    conflicts: BTreeSet<(usize, usize)>,
}

impl PrecedenceGraph {
    pub fn build(graph: &ExportGraph, changes: &[ValidatedChange]) -> Self {
        let classes: Vec<PrecedenceClass> = changes.iter().map(precedence_class).collect();

        let mut by_subject: BTreeMap<&EntityId, Vec<usize>> = BTreeMap::new();
        let mut by_request: BTreeMap<usize, usize> = BTreeMap::new();
        for (pos, change) in changes.iter().enumerate() {
            by_request.insert(change.index, pos);
            if let Some(subject) = change.subject() {
                by_subject.entry(subject).or_default().push(pos);
            }
        }

        let mut out = Self {
            classes,
            ..Self::default()
        };

        for (v, change) in changes.iter().enumerate() {
            let destructive = change.request.operation.is_destructive();

            for dependency in &change.resolved_dependencies {
                if let DependencySource::Created { request } = dependency.source {
                    if let Some(&u) = by_request.get(&request) {
                        out.hard(u, v);
                    }
                    continue;
                }
                for &u in by_subject.get(&dependency.id).into_iter().flatten() {
                    if u != v {
                        out.hard(u, v);
                    }
                }
            }

            let Some(target) = change.request.target.as_ref() else {
                continue;
            };
            for reference in graph.outgoing(target) {
                for &u in by_subject.get(&reference.target).into_iter().flatten() {
                    if u == v || out.classes[u] != out.classes[v] {
                        continue;
                    }
                    if destructive {
                        out.edges.insert((v, u));
                    } else {
                        out.edges.insert((u, v));
                    }
                }
            }
        }

        out
    }

    fn hard(&mut self, before: usize, after: usize) {
        if self.classes[before] > self.classes[after] {
            self.conflicts.insert((before, after));
        } else {
            self.edges.insert((before, after));
        }
    }

    pub fn class(&self, pos: usize) -> PrecedenceClass {
        self.classes[pos]
    }

    /// Positions that must run before `pos`.
    pub fn predecessors(&self, pos: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |&&(_, after)| after == pos)
            .map(|&(before, _)| before)
    }

    /// Positions in application order, or the positions that cannot be
    /// ordered (class conflicts first, otherwise the members of a cycle).
    pub fn sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        if !self.conflicts.is_empty() {
            let stuck: BTreeSet<usize> = self
                .conflicts
                .iter()
                .flat_map(|&(a, b)| [a, b])
                .collect();
            return Err(stuck.into_iter().collect());
        }

        let n = self.classes.len();
        let mut in_degree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(before, after) in &self.edges {
            in_degree[after] += 1;
            successors[before].push(after);
        }

        let mut ready: BTreeSet<(PrecedenceClass, usize)> = (0..n)
            .filter(|&pos| in_degree[pos] == 0)
            .map(|pos| (self.classes[pos], pos))
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some((_, pos)) = ready.pop_first() {
            order.push(pos);
            for &next in &successors[pos] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert((self.classes[next], next));
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err((0..n).filter(|&pos| in_degree[pos] > 0).collect())
        }
    }
}
