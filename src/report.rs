use crate::error::{ChainError, Result};
use crate::executor::ExecutionStats;
use crate::graph::BuildGraph;
use crate::propagate::VersionChange;
use crate::status::NodeStatus;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub version: String,
    pub base_ref: String,
    pub status: NodeStatus,
    pub tags: Vec<String>,
}

/// Machine-readable outcome of one `build` run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub dry_run: bool,
    pub stats: ExecutionStats,
    pub version_changes: Vec<VersionChange>,
    pub nodes: Vec<NodeReport>,
}

impl RunReport {
    pub fn new(
        graph: &BuildGraph,
        stats: ExecutionStats,
        version_changes: Vec<VersionChange>,
        dry_run: bool,
    ) -> Self {
        let mut nodes: Vec<NodeReport> = graph
            .nodes
            .iter()
            .map(|n| NodeReport {
                name: n.name.clone(),
                version: n.version.clone(),
                base_ref: n.base_ref.clone(),
                status: n.state.status(),
                tags: n.tags.clone(),
            })
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            dry_run,
            stats,
            version_changes,
            nodes,
        }
    }

    /// Nodes that ended in `failure`
    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| n.status == NodeStatus::Failure)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ChainError::Other(anyhow::anyhow!("cannot serialize report: {}", e)))?;
        std::fs::write(path, json).map_err(|source| ChainError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }
}
