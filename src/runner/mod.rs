use crate::error::Result;
use crate::status::NodeState;
use async_trait::async_trait;
use std::path::PathBuf;

/// Everything needed to build one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub image: String,
    pub context: PathBuf,
    /// Fully qualified tags, `registry/name:tag`
    pub tags: Vec<String>,
    pub no_cache: bool,
    pub pull: bool,
}

/// External build and push collaborator. Output goes to the node's log.
#[async_trait]
pub trait ImageRunner: Send + Sync {
    async fn build(&self, request: &BuildRequest, log: &NodeState) -> Result<()>;
    async fn push(&self, tag: &str, log: &NodeState) -> Result<()>;
}

pub mod docker;

pub use docker::DockerCli;
