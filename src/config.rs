//! Run configuration.
//!
//! Everything a run needs is collected once into an immutable [`RunConfig`]
//! that is handed to each component. Sources, highest precedence first:
//! command-line flags, environment (resolved by clap), `conf.yaml` in the
//! image base directory, built-in defaults.

use crate::changes::ChangeMatch;
use crate::constants::{CONFIG_FILE, FALLBACK_MAX_CONCURRENCY};
use crate::error::{ChainError, Result};
use crate::version::BumpComponent;
use serde::Deserialize;
use std::path::Path;

/// Contents of `conf.yaml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub registry: Option<String>,
    pub no_cache: Option<bool>,
    pub pull: Option<bool>,
    pub push: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub change_match: Option<ChangeMatch>,
}

impl FileConfig {
    /// `Ok(None)` when the base directory has no config file.
    pub fn load(base_dir: &Path) -> Result<Option<Self>> {
        let path = base_dir.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No conf file at {}", path.display());
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let config = Self::parse(&content)
            .map_err(|e| ChainError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Using config file: {}", path.display());
        Ok(Some(config))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

/// Values supplied on the command line (or via clap's env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub registry: Option<String>,
    pub bump: BumpComponent,
    pub since: Option<String>,
    pub dry_run: bool,
    pub no_cache: bool,
    pub no_pull: bool,
    pub no_push: bool,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Prefix of every qualified image reference
    pub registry: String,
    pub bump: BumpComponent,
    /// Only seeds changed since this revision are built
    pub since: Option<String>,
    pub dry_run: bool,
    pub no_cache: bool,
    pub pull: bool,
    pub push: bool,
    /// Upper bound on concurrently running node tasks
    pub max_concurrency: usize,
    pub change_match: ChangeMatch,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            registry: String::new(),
            bump: BumpComponent::None,
            since: None,
            dry_run: false,
            no_cache: false,
            pull: true,
            push: true,
            max_concurrency: default_concurrency(),
            change_match: ChangeMatch::default(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_MAX_CONCURRENCY)
}

impl RunConfig {
    /// Merge the config file under the command-line values.
    pub fn resolve(file: Option<FileConfig>, overrides: ConfigOverrides) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = RunConfig::default();

        let max_concurrency = overrides
            .max_concurrency
            .or(file.max_concurrency)
            .unwrap_or(defaults.max_concurrency);
        if max_concurrency == 0 {
            return Err(ChainError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let registry = overrides
            .registry
            .or(file.registry)
            .unwrap_or(defaults.registry);
        if registry.is_empty() {
            tracing::warn!("No registry configured, images are tagged without a registry prefix");
        }

        let change_match = file.change_match.unwrap_or_default();
        change_match.validate()?;

        Ok(Self {
            registry,
            bump: overrides.bump,
            since: overrides.since,
            dry_run: overrides.dry_run,
            no_cache: overrides.no_cache || file.no_cache.unwrap_or(defaults.no_cache),
            pull: !overrides.no_pull && file.pull.unwrap_or(defaults.pull),
            push: !overrides.no_push && file.push.unwrap_or(defaults.push),
            max_concurrency,
            change_match,
        })
    }
}
