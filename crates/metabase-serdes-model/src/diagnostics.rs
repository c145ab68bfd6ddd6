//! Diagnostics raised while indexing an export or planning changes.
//!
//! Nothing here aborts on its own. Per-member and per-reference problems are
//! collected and the build carries on; the caller decides what an error
//! means for the process.
//!
//! | code                         | severity | raised by             |
//! |------------------------------|----------|-----------------------|
//! | `parse_failure`              | warning  | graph build           |
//! | `unknown_entity_kind`        | warning  | metadata extraction   |
//! | `missing_identity`           | warning  | metadata extraction   |
//! | `identity_mismatch`          | warning  | metadata extraction   |
//! | `null_reference`             | warning  | reference extraction  |
//! | `duplicate_entity_id`        | error    | entity index          |
//! | `dangling_reference`         | warning  | entity index          |
//! | `missing_change_target`      | error    | change validation     |
//! | `invalid_change_target`      | error    | change validation     |
//! | `missing_change_dependency`  | error    | change validation     |
//! | `dangling_dependency`        | error    | change validation     |
//! | `circular_change_dependency` | error    | precedence sorting    |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{EntityId, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("could not parse `{path}`, member skipped: {message}")]
    ParseFailure { path: String, message: String },

    #[error("`{path}` declares model {}; indexed as Unknown", display_model(.model))]
    UnknownEntityKind { path: String, model: Option<String> },

    #[error("`{path}` has no usable serdes/meta id; synthesized `{synthesized}` (not targetable by changes)")]
    MissingIdentity { path: String, synthesized: String },

    #[error("`{path}`: entity_id `{entity_id}` differs from serdes/meta id `{meta_id}`")]
    IdentityMismatch {
        path: String,
        entity_id: String,
        meta_id: String,
    },

    #[error("`{path}`: `{label}` is null where an id is expected")]
    NullReference { path: String, label: String },

    #[error("duplicate entity id {id}: `{first_path}` ({first_kind}) and `{second_path}` ({second_kind}); keeping `{first_path}`")]
    DuplicateEntityId {
        id: EntityId,
        first_path: String,
        first_kind: EntityKind,
        second_path: String,
        second_kind: EntityKind,
    },

    #[error("{target} referenced by `{source_path}` at `{label}` is not in the export")]
    DanglingReference {
        target: EntityId,
        source_id: EntityId,
        source_path: String,
        label: String,
    },

    #[error("change #{request} ({operation}): target {target} is not in the export")]
    MissingChangeTarget {
        request: usize,
        operation: String,
        target: EntityId,
    },

    #[error("change #{request} ({operation}): {reason}")]
    InvalidChangeTarget {
        request: usize,
        operation: String,
        reason: String,
    },

    #[error("change #{request}: dependency {dependency} at `{label}` {reason}")]
    MissingChangeDependency {
        request: usize,
        dependency: EntityId,
        label: String,
        reason: String,
    },

    #[error("change #{request}: {entity} still references {target} at `{label}` (`{source_path}`), which is not in the export")]
    DanglingDependency {
        request: usize,
        entity: EntityId,
        target: EntityId,
        source_path: String,
        label: String,
    },

    #[error("circular change dependency between changes {}; plan rejected", display_requests(.requests))]
    CircularChangeDependency { requests: Vec<usize> },
}

fn display_model(model: &Option<String>) -> String {
    match model {
        Some(model) => format!("`{model}`"),
        None => "nothing".to_string(),
    }
}

fn display_requests(requests: &[usize]) -> String {
    requests
        .iter()
        .map(|r| format!("#{r}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::ParseFailure { .. }
            | Diagnostic::UnknownEntityKind { .. }
            | Diagnostic::MissingIdentity { .. }
            | Diagnostic::IdentityMismatch { .. }
            | Diagnostic::NullReference { .. }
            | Diagnostic::DanglingReference { .. } => Severity::Warning,
            Diagnostic::DuplicateEntityId { .. }
            | Diagnostic::MissingChangeTarget { .. }
            | Diagnostic::InvalidChangeTarget { .. }
            | Diagnostic::MissingChangeDependency { .. }
            | Diagnostic::DanglingDependency { .. }
            | Diagnostic::CircularChangeDependency { .. } => Severity::Error,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Diagnostic::ParseFailure { .. } => "parse_failure",
            Diagnostic::UnknownEntityKind { .. } => "unknown_entity_kind",
            Diagnostic::MissingIdentity { .. } => "missing_identity",
            Diagnostic::IdentityMismatch { .. } => "identity_mismatch",
            Diagnostic::NullReference { .. } => "null_reference",
            Diagnostic::DuplicateEntityId { .. } => "duplicate_entity_id",
            Diagnostic::DanglingReference { .. } => "dangling_reference",
            Diagnostic::MissingChangeTarget { .. } => "missing_change_target",
            Diagnostic::InvalidChangeTarget { .. } => "invalid_change_target",
            Diagnostic::MissingChangeDependency { .. } => "missing_change_dependency",
            Diagnostic::DanglingDependency { .. } => "dangling_dependency",
            Diagnostic::CircularChangeDependency { .. } => "circular_change_dependency",
        }
    }

    /// Archive paths the diagnostic points at.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Diagnostic::ParseFailure { path, .. }
            | Diagnostic::UnknownEntityKind { path, .. }
            | Diagnostic::MissingIdentity { path, .. }
            | Diagnostic::IdentityMismatch { path, .. }
            | Diagnostic::NullReference { path, .. } => vec![path.as_str()],
            Diagnostic::DuplicateEntityId {
                first_path,
                second_path,
                ..
            } => vec![first_path.as_str(), second_path.as_str()],
            Diagnostic::DanglingReference { source_path, .. }
            | Diagnostic::DanglingDependency { source_path, .. } => vec![source_path.as_str()],
            Diagnostic::MissingChangeTarget { .. }
            | Diagnostic::InvalidChangeTarget { .. }
            | Diagnostic::MissingChangeDependency { .. }
            | Diagnostic::CircularChangeDependency { .. } => Vec::new(),
        }
    }

    /// Relationship label, for diagnostics tied to a reference.
    pub fn label(&self) -> Option<&str> {
        match self {
            Diagnostic::NullReference { label, .. }
            | Diagnostic::DanglingReference { label, .. }
            | Diagnostic::MissingChangeDependency { label, .. }
            | Diagnostic::DanglingDependency { label, .. } => Some(label.as_str()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

/// Count of diagnostics per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub error_count: usize,
    pub warning_count: usize,
}

impl DiagnosticSummary {
    pub fn of<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> Self {
        let mut summary = Self::default();
        for d in diagnostics {
            match d.severity() {
                Severity::Error => summary.error_count += 1,
                Severity::Warning => summary.warning_count += 1,
            }
        }
        summary
    }
}
