//! "Changed since" filtering of requested seeds.

use crate::error::{ChainError, Result};
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;

/// How a changed file path is attributed to an image directory.
///
/// Paths are relative to the image base directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ChangeMatch {
    /// The first path segment names the image, at any depth below it.
    #[default]
    TopLevel,
    /// A glob with `{name}` standing for the image. `*` stops at `/`,
    /// `**` crosses directories: `{name}/**/*` behaves like `top-level`,
    /// `{name}/*` only counts files directly in the image directory.
    Glob { pattern: String },
}

impl ChangeMatch {
    pub fn validate(&self) -> Result<()> {
        if let ChangeMatch::Glob { pattern } = self {
            Pattern::new(&pattern.replace("{name}", "image"))
                .map_err(|e| ChainError::Config(format!("bad change_match pattern '{}': {}", pattern, e)))?;
        }
        Ok(())
    }

    pub fn matches(&self, image: &str, path: &Path) -> bool {
        match self {
            ChangeMatch::TopLevel => matches!(
                path.components().find(|c| !matches!(c, Component::CurDir)),
                Some(Component::Normal(first)) if first == image
            ),
            ChangeMatch::Glob { pattern } => {
                let options = MatchOptions {
                    require_literal_separator: true,
                    ..MatchOptions::new()
                };
                match Pattern::new(&pattern.replace("{name}", &Pattern::escape(image))) {
                    Ok(p) => p.matches_path_with(path, options),
                    Err(e) => {
                        tracing::warn!("Ignoring invalid change pattern {}: {}", pattern, e);
                        false
                    }
                }
            }
        }
    }
}

/// Supplies the files changed between a revision and the working tree.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn changed_files(&self, since: &str) -> Result<Vec<PathBuf>>;
}

/// `git diff --name-only --relative <since>` run inside the base directory
pub struct GitDiff {
    workdir: PathBuf,
}

impl GitDiff {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ChangeSource for GitDiff {
    async fn changed_files(&self, since: &str) -> Result<Vec<PathBuf>> {
        let output = Command::new("git")
            .args(["diff", "--name-only", "--relative", since])
            .current_dir(&self.workdir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ChainError::ChangeDetection(format!("cannot run git: {}", e)))?;

        if !output.status.success() {
            return Err(ChainError::ChangeDetection(format!(
                "git diff {} failed: {}",
                since,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

/// Keep only the seeds with at least one changed file attributed to them.
pub fn filter_changed(seeds: Vec<String>, changed: &[PathBuf], rule: &ChangeMatch) -> Vec<String> {
    seeds
        .into_iter()
        .filter(|seed| {
            let hit = changed.iter().any(|path| rule.matches(seed, path));
            if !hit {
                tracing::info!("{} has no changes, skipping", seed);
            }
            hit
        })
        .collect()
}
