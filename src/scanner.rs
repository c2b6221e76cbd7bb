use crate::docker::parse_recipe;
use crate::error::{ChainError, Result};
use crate::graph::{BuildGraph, ImageNode};
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Build the image graph from the immediate subdirectories of `base_dir`.
/// Directories without a recipe are not images and are skipped.
pub fn scan_images(base_dir: &Path, registry: &str) -> Result<BuildGraph> {
    let mut graph = BuildGraph::new(registry, base_dir);

    let walker = WalkDir::new(base_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed"));
                return Err(ChainError::ScanFailed {
                    path: base_dir.to_path_buf(),
                    source,
                });
            }
            Err(err) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", base_dir.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(node) = read_image(entry.path(), &name)? {
            tracing::debug!(image = %name, base = %node.base_ref, version = %node.version, "Found image");
            graph.insert(node);
        }
    }

    Ok(graph)
}

/// Read one image directory. `Ok(None)` when it holds no recipe.
pub fn read_image(dir: &Path, name: &str) -> Result<Option<ImageNode>> {
    let mut node = ImageNode::new(name, dir.to_path_buf());

    let content = match std::fs::read_to_string(node.recipe_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            tracing::warn!("Skipping {}: cannot read recipe: {}", dir.display(), err);
            return Ok(None);
        }
    };
    let recipe = parse_recipe(&content);
    node.base_ref = recipe.base_ref;
    node.base_ref_line = recipe.base_line;
    node.recipe_lines = recipe.lines;

    node.version = match std::fs::read_to_string(node.version_path()) {
        Ok(content) => content.lines().next().unwrap_or("").trim().to_string(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    Ok(Some(node))
}
