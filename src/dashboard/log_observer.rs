use crate::dashboard::metrics::{BuildEvent, BuildObserver};
use crate::graph::{BuildGraph, NodeId};
use crate::status::NodeState;
use std::collections::HashMap;
use std::sync::Arc;

/// Non-interactive presentation: every event becomes a log line and a failed
/// node's captured output is dumped to the main log right away.
pub struct LogObserver {
    states: HashMap<NodeId, Arc<NodeState>>,
}

impl LogObserver {
    pub fn new(graph: &BuildGraph) -> Self {
        Self {
            states: graph
                .nodes
                .iter()
                .map(|n| (n.id, n.state.clone()))
                .collect(),
        }
    }
}

impl BuildObserver for LogObserver {
    fn on_event(&self, event: BuildEvent) {
        match event {
            BuildEvent::BuildStarted { roots } => {
                tracing::info!("Building from {}", roots.join(", "));
            }
            BuildEvent::NodeStarted { name, .. } => tracing::info!("Building {}", name),
            BuildEvent::NodePushing { name, tags, .. } => {
                tracing::info!("Pushing {} ({} tags)", name, tags)
            }
            BuildEvent::NodeCompleted {
                name, duration_ms, ..
            } => tracing::info!("{} succeeded in {}ms", name, duration_ms),
            BuildEvent::NodeFailed {
                node_id,
                name,
                error,
            } => {
                let log = self
                    .states
                    .get(&node_id)
                    .map(|s| s.log_text())
                    .unwrap_or_default();
                crate::log_node_failure!(name, error, log);
            }
            BuildEvent::SubtreePruned { name, skipped, .. } => {
                tracing::warn!("Skipping dependents of {}: {}", name, skipped.join(", "));
            }
            BuildEvent::BuildCompleted {
                total_duration_ms,
                succeeded,
                failed,
            } => tracing::info!(
                succeeded,
                failed,
                duration_ms = total_duration_ms,
                "Build finished"
            ),
        }
    }
}
