/// chainbuild error types and classification
use crate::status::NodeStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for chainbuild operations
#[derive(Debug, Error)]
pub enum ChainError {
    /// The image base directory could not be listed
    #[error("cannot read image directory {}: {source}", path.display())]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A base declaration that cannot be split into `image:tag`
    #[error("can't parse base image reference '{reference}' in {}", recipe.display())]
    InvalidBaseRef { recipe: PathBuf, reference: String },
    /// A version marker or recipe could not be persisted
    #[error("couldn't write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An external tool ran but reported failure
    #[error("{command} exited with {status}")]
    CommandFailed { command: String, status: String },
    /// An external tool could not be started at all
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// Attempt to move a node's status backwards or out of a terminal state
    #[error("invalid status transition for {node}: {from} -> {to}")]
    InvalidTransition {
        node: String,
        from: NodeStatus,
        to: NodeStatus,
    },
    /// The diff collaborator failed
    #[error("change detection failed: {0}")]
    ChangeDetection(String),
    /// Configuration file or flag problems
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Wrapped anyhow error for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// How far an error is allowed to travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stops the whole invocation
    Fatal,
    /// Marks one node as failed and prunes its subtree
    NodeFailure,
}

impl ChainError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::CommandFailed { .. } | ChainError::SpawnFailed { .. } => {
                ErrorClass::NodeFailure
            }
            ChainError::ScanFailed { .. }
            | ChainError::InvalidBaseRef { .. }
            | ChainError::WriteFailed { .. }
            | ChainError::InvalidTransition { .. }
            | ChainError::ChangeDetection(_)
            | ChainError::Config(_)
            | ChainError::Io(_)
            | ChainError::Other(_) => ErrorClass::Fatal,
        }
    }
}
