//! Root set resolution: which requested images start a run.

use crate::changes::{filter_changed, ChangeSource};
use crate::config::RunConfig;
use crate::constants::RECIPE_FILE;
use crate::error::Result;
use crate::graph::{BuildGraph, NodeId};
use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

/// Image names for the requested seed directories. A directory without a
/// recipe is dropped with a warning.
pub fn seed_names(seed_dirs: &[PathBuf]) -> Vec<String> {
    let mut names = Vec::new();
    for dir in seed_dirs {
        if !dir.join(RECIPE_FILE).is_file() {
            tracing::warn!("No {} in {}, ignoring", RECIPE_FILE, dir.display());
            continue;
        }
        // `.` or `..` only name an image once resolved
        let resolved = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        match image_name(&resolved) {
            Some(name) => names.push(name),
            None => tracing::warn!("Cannot derive an image name from {}", dir.display()),
        }
    }
    names
}

/// Last normal path segment, so `images/app/` and `images/./app` agree.
fn image_name(dir: &Path) -> Option<String> {
    dir.components().rev().find_map(|c| match c {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    })
}

/// Reduce seeds to the roots of the run: unknown names are dropped, duplicates
/// collapse, and a seed reachable from another seed is removed. The result
/// does not depend on input order for acyclic graphs; within a cycle the
/// first seed listed wins.
pub fn resolve_roots(graph: &BuildGraph, seeds: &[String]) -> Vec<NodeId> {
    let mut candidates: Vec<NodeId> = Vec::new();
    for seed in seeds {
        match graph.lookup(seed) {
            Some(id) if !candidates.contains(&id) => candidates.push(id),
            Some(_) => {}
            None => tracing::warn!("{} is not an image under {}", seed, graph.base_dir.display()),
        }
    }

    let descendants: HashMap<NodeId, BTreeSet<NodeId>> = candidates
        .iter()
        .map(|&id| (id, graph.descendants(id)))
        .collect();

    let mut roots: Vec<NodeId> = Vec::new();
    for &seed in &candidates {
        if roots.iter().any(|r| descendants[r].contains(&seed)) {
            tracing::debug!("{} is built as a dependent of another seed", graph.node(seed).name);
            continue;
        }
        roots.retain(|r| !descendants[&seed].contains(r));
        roots.push(seed);
    }
    roots
}

/// Seeds plus optional change filtering, producing the run's root set.
pub struct RootResolver<'a> {
    graph: &'a BuildGraph,
    config: &'a RunConfig,
    changes: &'a dyn ChangeSource,
}

impl<'a> RootResolver<'a> {
    pub fn new(graph: &'a BuildGraph, config: &'a RunConfig, changes: &'a dyn ChangeSource) -> Self {
        Self {
            graph,
            config,
            changes,
        }
    }

    pub async fn resolve(&self, seed_dirs: &[PathBuf]) -> Result<Vec<NodeId>> {
        let mut seeds = seed_names(seed_dirs);

        if let Some(since) = &self.config.since {
            if self.config.dry_run {
                tracing::info!("Dry run still reads changes with git diff {}", since);
            }
            let changed = self.changes.changed_files(since).await?;
            tracing::debug!("{} files changed since {}", changed.len(), since);
            seeds = filter_changed(seeds, &changed, &self.config.change_match);
        }

        let roots = resolve_roots(self.graph, &seeds);
        tracing::info!(
            "Root images: {}",
            roots
                .iter()
                .map(|&id| self.graph.node(id).name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(roots)
    }
}
