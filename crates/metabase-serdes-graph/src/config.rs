//! Graph build configuration.

use serde::{Deserialize, Serialize};

use metabase_serdes_model::{ArchiveMember, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Member file names that are never indexed (the instance-wide settings
    /// document has no identity and references nothing).
    pub skip_file_names: Vec<String>,
    /// Extensions treated as exported YAML documents.
    pub yaml_extensions: Vec<String>,
    /// `serdes/meta` models that only exist as a scope level and never get a
    /// document of their own. Ancestor references to them are external.
    pub implicit_scope_models: Vec<String>,
    /// Ids known to live outside the archive.
    pub external_ids: Vec<EntityId>,
    /// Abort the whole build on the first unparseable member.
    pub fail_fast: bool,
    /// Run per-member extraction on the rayon pool.
    pub parallel: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            skip_file_names: vec!["settings.yaml".to_string(), "settings.yml".to_string()],
            yaml_extensions: vec!["yaml".to_string(), "yml".to_string()],
            implicit_scope_models: vec!["Schema".to_string()],
            external_ids: Vec::new(),
            fail_fast: false,
            parallel: true,
        }
    }
}

impl GraphConfig {
    /// Whether the member at `path` is excluded by file name.
    pub fn is_skipped(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.skip_file_names.iter().any(|skip| skip == name)
    }

    pub fn is_yaml(&self, member: &ArchiveMember) -> bool {
        member
            .extension()
            .map(|ext| self.yaml_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    pub fn is_implicit_scope(&self, model: &str) -> bool {
        self.implicit_scope_models.iter().any(|m| m == model)
    }

    pub fn is_external(&self, id: &EntityId) -> bool {
        self.external_ids.contains(id)
    }
}
