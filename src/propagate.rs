use crate::config::RunConfig;
use crate::docker::{rewrite_base_line, split_reference};
use crate::error::{ChainError, Result};
use crate::graph::{BuildGraph, NodeId};
use crate::version::bump;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// One version marker change made (or planned, in dry-run) by a propagation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub image: String,
    pub from: String,
    pub to: String,
    /// New base reference written into the recipe, for dependents only
    pub base_ref: Option<String>,
}

/// Bumps versions from the roots downwards and re-points every dependent's
/// `FROM` line at its parent's new tag.
///
/// The in-memory graph is always updated so later passes see consistent
/// edges; files are only touched outside dry-run.
pub struct VersionPropagator<'a> {
    config: &'a RunConfig,
}

impl<'a> VersionPropagator<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub fn propagate(&self, graph: &mut BuildGraph, roots: &[NodeId]) -> Result<Vec<VersionChange>> {
        let mut visited = HashSet::new();
        let mut changes = Vec::new();
        self.propagate_level(graph, roots, None, &mut visited, &mut changes)?;
        Ok(changes)
    }

    /// `parent_version` is `None` for the requested frontier, whose own
    /// `FROM` lines are left alone.
    fn propagate_level(
        &self,
        graph: &mut BuildGraph,
        frontier: &[NodeId],
        parent_version: Option<&str>,
        visited: &mut HashSet<NodeId>,
        changes: &mut Vec<VersionChange>,
    ) -> Result<()> {
        for &id in frontier {
            if !visited.insert(id) {
                tracing::warn!(
                    "{} already visited, ignoring circular base reference",
                    graph.node(id).name
                );
                continue;
            }

            // dependents are matched on the ref as it was before this bump
            let previous_ref = graph.qualified_ref(id);
            let dependents: Vec<NodeId> = graph
                .nodes_based_on(&previous_ref)
                .into_iter()
                .filter(|&d| d != id)
                .collect();

            let change = self.bump_node(graph, id, parent_version)?;
            let new_version = change.to.clone();
            changes.push(change);

            if !dependents.is_empty() {
                self.propagate_level(graph, &dependents, Some(&new_version), visited, changes)?;
            }
        }
        Ok(())
    }

    fn bump_node(
        &self,
        graph: &mut BuildGraph,
        id: NodeId,
        parent_version: Option<&str>,
    ) -> Result<VersionChange> {
        let dry_run = self.config.dry_run;
        let node = graph.node_mut(id);

        let tags = bump(&node.version, self.config.bump);
        let new_version = tags[0].clone();
        let version_path = node.version_path();
        if dry_run {
            tracing::info!("Would write '{}' to {}", new_version, version_path.display());
        } else if !new_version.is_empty() {
            write_file(&version_path, format!("{}\n", new_version))?;
        }

        let mut change = VersionChange {
            image: node.name.clone(),
            from: std::mem::replace(&mut node.version, new_version.clone()),
            to: new_version,
            base_ref: None,
        };
        node.tags = tags;

        if let Some(parent_version) = parent_version {
            let recipe_path = node.recipe_path();
            let invalid = || ChainError::InvalidBaseRef {
                recipe: recipe_path.clone(),
                reference: node.base_ref.clone(),
            };
            let (image, _) = split_reference(&node.base_ref).ok_or_else(invalid)?;
            let new_ref = format!("{}:{}", image, parent_version);

            let line_idx = node.base_ref_line.ok_or_else(invalid)?;
            let new_line = node
                .recipe_lines
                .get(line_idx)
                .and_then(|line| rewrite_base_line(line, &new_ref))
                .ok_or_else(invalid)?;

            if dry_run {
                tracing::info!(
                    "Would update {} FROM line to '{}'",
                    recipe_path.display(),
                    new_line.trim_end()
                );
            }
            node.recipe_lines[line_idx] = new_line;
            node.base_ref = new_ref.clone();
            if !dry_run {
                write_file(&recipe_path, node.recipe_lines.join("\n"))?;
            }
            change.base_ref = Some(new_ref);
        }

        tracing::info!("{}: {} -> {}", change.image, change.from, change.to);
        Ok(change)
    }
}

fn write_file(path: &Path, content: String) -> Result<()> {
    std::fs::write(path, content).map_err(|source| ChainError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}
