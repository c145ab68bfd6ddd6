//! Planning policy.

use serde::{Deserialize, Serialize};

/// Whether archived entities can satisfy a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivedPolicy {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub archived_policy: ArchivedPolicy,
    /// Reject requests whose dependencies still reference something missing
    /// from the export.
    pub reject_dangling_closure: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            archived_policy: ArchivedPolicy::Include,
            reject_dangling_closure: true,
        }
    }
}

impl PlanConfig {
    pub fn excludes_archived(&self) -> bool {
        self.archived_policy == ArchivedPolicy::Exclude
    }
}
