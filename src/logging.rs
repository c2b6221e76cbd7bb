use std::io;
/// Structured logging setup for chainbuild
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::constants::DEFAULT_LOG_FILTER;

/// Picks the filter: `RUST_LOG` wins, then the verbosity flag.
pub fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("chainbuild=debug")
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    })
}

/// Initialize structured logging with optional JSON output
pub fn init_logging(json_output: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::default().with(default_filter(verbose));

    if json_output {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init()?;
    }

    Ok(())
}

/// Logs a node status change
#[macro_export]
macro_rules! log_node_transition {
    ($name:expr, $from:expr, $to:expr) => {
        tracing::debug!(node = %$name, from = %$from, to = %$to, "Node status changed");
    };
}

/// Logs a failed node together with its captured output
#[macro_export]
macro_rules! log_node_failure {
    ($name:expr, $error:expr, $log:expr) => {
        tracing::error!(
            node = %$name,
            error = %$error,
            "Build of {} failed, captured output follows:\n{}",
            $name,
            $log
        );
    };
}
