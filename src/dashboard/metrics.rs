use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildEvent {
    BuildStarted {
        roots: Vec<String>,
    },
    NodeStarted {
        node_id: NodeId,
        name: String,
    },
    NodePushing {
        node_id: NodeId,
        name: String,
        tags: usize,
    },
    NodeCompleted {
        node_id: NodeId,
        name: String,
        duration_ms: u64,
    },
    NodeFailed {
        node_id: NodeId,
        name: String,
        error: String,
    },
    /// Dependents of a failed node that will not be scheduled
    SubtreePruned {
        node_id: NodeId,
        name: String,
        skipped: Vec<String>,
    },
    BuildCompleted {
        total_duration_ms: u64,
        succeeded: usize,
        failed: usize,
    },
}

pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: BuildEvent);
}
