//! The change plan handed to whatever applies the changes.

use serde::Serialize;

use metabase_serdes_graph::ExportGraph;
use metabase_serdes_model::{Diagnostic, DiagnosticSummary, EntityId, EntityKind};

use crate::config::PlanConfig;
use crate::order::PrecedenceGraph;
use crate::request::{ChangeRequest, ChangeState, PrecedenceClass};
use crate::validate::{validate_changes, RejectedChange, ResolvedDependency};

/// One validated change at its place in the plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    pub step: usize,
    /// Position of the request in the change list.
    pub index: usize,
    pub request: ChangeRequest,
    pub class: PrecedenceClass,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creates: Option<EntityId>,
    pub resolved_dependencies: Vec<ResolvedDependency>,
    /// Requests (by list position) that must be applied first.
    pub after: Vec<usize>,
    pub state: ChangeState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangePlan {
    pub steps: Vec<PlannedChange>,
    pub rejected: Vec<RejectedChange>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ChangePlan {
    pub fn summary(&self) -> DiagnosticSummary {
        DiagnosticSummary::of(&self.diagnostics)
    }

    /// Whether every request made it into the plan.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Step of the request at list position `index`.
    pub fn step_of(&self, index: usize) -> Option<usize> {
        self.steps.iter().find(|s| s.index == index).map(|s| s.step)
    }
}

/// The whole plan was refused.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("change plan rejected: {}", render(.diagnostics))]
pub struct PlanRejection {
    /// Requests (by list position) that could not be ordered.
    pub requests: Vec<usize>,
    pub rejected: Vec<RejectedChange>,
    pub diagnostics: Vec<Diagnostic>,
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate `requests` against `graph` and order what passes.
///
/// Requests failing validation are listed as rejected and left out of the
/// plan. A dependency cycle, or an edge the precedence classes cannot
/// honour, rejects the plan as a whole.
pub fn plan_changes(
    graph: &ExportGraph,
    requests: &[ChangeRequest],
    config: &PlanConfig,
) -> Result<ChangePlan, PlanRejection> {
    let validation = validate_changes(graph, requests, config);

    let mut diagnostics = validation.warnings;
    for rejected in &validation.rejected {
        diagnostics.extend(rejected.diagnostics.iter().cloned());
    }

    let precedence = PrecedenceGraph::build(graph, &validation.validated);
    let order = match precedence.sort() {
        Ok(order) => order,
        Err(stuck) => {
            let requests: Vec<usize> = stuck
                .iter()
                .map(|&pos| validation.validated[pos].index)
                .collect();
            let cycle = Diagnostic::CircularChangeDependency {
                requests: requests.clone(),
            };
            tracing::error!(%cycle, "change plan rejected");
            diagnostics.push(cycle);
            return Err(PlanRejection {
                requests,
                rejected: validation.rejected,
                diagnostics,
            });
        }
    };

    let steps: Vec<PlannedChange> = order
        .iter()
        .enumerate()
        .map(|(step, &pos)| {
            let change = &validation.validated[pos];
            let mut after: Vec<usize> = precedence
                .predecessors(pos)
                .map(|p| validation.validated[p].index)
                .collect();
            after.sort_unstable();
            PlannedChange {
                step,
                index: change.index,
                request: change.request.clone(),
                class: precedence.class(pos),
                kind: change.kind,
                creates: change.creates.clone(),
                resolved_dependencies: change.resolved_dependencies.clone(),
                after,
                state: ChangeState::Ordered,
            }
        })
        .collect();

    tracing::info!(
        requests = requests.len(),
        planned = steps.len(),
        rejected = validation.rejected.len(),
        "planned changes"
    );

    Ok(ChangePlan {
        steps,
        rejected: validation.rejected,
        diagnostics,
    })
}
