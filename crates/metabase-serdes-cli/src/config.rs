//! `--config` file: reader, graph and planning settings in one YAML document.
//!
//! ```yaml
//! read:
//!   parallel: true
//! graph:
//!   external_ids: [instance-analytics]
//!   fail_fast: false
//! plan:
//!   archived_policy: exclude
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use metabase_serdes_changes::{ArchivedPolicy, PlanConfig};
use metabase_serdes_graph::GraphConfig;
use metabase_serdes_ingest::ReadOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub read: ReadOptions,
    pub graph: GraphConfig,
    pub plan: PlanConfig,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("invalid config `{}`", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Command-line flags win over the file.
    pub fn with_exclude_archived(mut self, exclude: bool) -> Self {
        if exclude {
            self.plan.archived_policy = ArchivedPolicy::Exclude;
        }
        self
    }
}
