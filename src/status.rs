//! Per-node status state machine and captured output.
//!
//! A [`NodeState`] is the only thing observers look at. It is written solely
//! by the scheduler task that owns the node and may be polled at any time.

use crate::error::{ChainError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Building,
    Pushing,
    Success,
    Failure,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Failure)
    }

    /// Allowed edges: pending -> building -> [pushing ->] success,
    /// with failure reachable from building and pushing.
    pub fn can_advance_to(self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (Pending, Building)
                | (Building, Pushing)
                | (Building, Success)
                | (Building, Failure)
                | (Pushing, Success)
                | (Pushing, Failure)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Building => "building",
            NodeStatus::Pushing => "pushing",
            NodeStatus::Success => "success",
            NodeStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// Status plus append-only log of one image
#[derive(Debug)]
pub struct NodeState {
    name: String,
    status: Mutex<NodeStatus>,
    log: Mutex<Vec<u8>>,
}

impl NodeState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Mutex::new(NodeStatus::Pending),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.lock()
    }

    /// Moves the node forward, refusing anything the state machine forbids.
    pub fn advance(&self, next: NodeStatus) -> Result<NodeStatus> {
        let mut status = self.status.lock();
        let from = *status;
        if !from.can_advance_to(next) {
            return Err(ChainError::InvalidTransition {
                node: self.name.clone(),
                from,
                to: next,
            });
        }
        *status = next;
        crate::log_node_transition!(self.name, from, next);
        Ok(from)
    }

    pub fn append_log(&self, bytes: &[u8]) {
        self.log.lock().extend_from_slice(bytes);
    }

    pub fn append_line(&self, line: &str) {
        let mut log = self.log.lock();
        log.extend_from_slice(line.as_bytes());
        log.push(b'\n');
    }

    /// Snapshot of the captured output so far
    pub fn log_text(&self) -> String {
        String::from_utf8_lossy(&self.log.lock()).into_owned()
    }

    pub fn log_len(&self) -> usize {
        self.log.lock().len()
    }
}
