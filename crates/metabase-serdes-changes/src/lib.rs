//! Change requests against a Metabase serialization export.
//!
//! ```text
//! change list (YAML) ──► Vec<ChangeRequest>
//!                              │
//!                              ▼
//!        validate::Validator  (targets, payload references, depends_on)
//!                              │ validated          rejected ──► diagnostics
//!                              ▼
//!        order::PrecedenceGraph (class buckets + Kahn, input-order ties)
//!                              │
//!                              ▼
//!                          ChangePlan ──► applied elsewhere
//! ```
//!
//! Precedence classes run in the order delete, archive, update, move,
//! replace, create-and-link. The graph is only read here.

pub mod config;
pub mod order;
pub mod plan;
pub mod request;
pub mod validate;


use std::path::{Path, PathBuf};

pub use config::{ArchivedPolicy, PlanConfig};
pub use order::{precedence_class, PrecedenceGraph};
pub use plan::{plan_changes, ChangePlan, PlanRejection, PlannedChange};
pub use request::{ChangeOperation, ChangeRequest, ChangeState, PrecedenceClass};
pub use validate::{
    validate_changes, DependencySource, RejectedChange, ResolvedDependency, ValidatedChange,
    Validation, Validator,
};

#[derive(Debug, thiserror::Error)]
pub enum ChangeListError {
    #[error("failed to read change list `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid change list: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Parse a change list: a YAML (or JSON) sequence of change requests.
pub fn parse_change_list(text: &str) -> Result<Vec<ChangeRequest>, ChangeListError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_yaml::from_str(text)?)
}

pub fn load_change_list(path: &Path) -> Result<Vec<ChangeRequest>, ChangeListError> {
    let text = std::fs::read_to_string(path).map_err(|source| ChangeListError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let requests = parse_change_list(&text)?;
    tracing::info!(path = %path.display(), requests = requests.len(), "loaded change list");
    Ok(requests)
}
