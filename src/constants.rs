// Centralized constants for chainbuild to avoid magic strings and numbers

/// Build recipe expected in every image directory
pub const RECIPE_FILE: &str = "Dockerfile";

/// Single-line semantic version marker next to the recipe
pub const VERSION_FILE: &str = "VERSION";

/// Optional project configuration in the image base directory
pub const CONFIG_FILE: &str = "conf.yaml";

/// Default output of the `graph` subcommand
pub const GRAPH_FILE: &str = "Dependency_Graph.dot";

/// Keyword of the base image declaration
pub const BASE_KEYWORD: &str = "FROM";

/// Tag appended to every build on top of the bumped version tags
pub const LATEST_TAG: &str = "latest";

/// Interval at which presentation layers poll node status (250 ms)
pub const STATUS_POLL_INTERVAL_MS: u64 = 250;

/// Worker pool size used when neither flag nor config sets one
pub const FALLBACK_MAX_CONCURRENCY: usize = 4;

/// Default log filter for the crate
pub const DEFAULT_LOG_FILTER: &str = "chainbuild=info";
