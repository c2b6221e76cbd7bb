use crate::error::{ChainError, Result};
use crate::runner::{BuildRequest, ImageRunner};
use crate::status::NodeState;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Runs the `docker` command line client
pub struct DockerCli {
    pub program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        if request.pull {
            args.push("--pull".to_string());
        }
        if request.no_cache {
            args.push("--no-cache".to_string());
        }
        for tag in &request.tags {
            args.push("-t".to_string());
            args.push(tag.clone());
        }
        args.push(request.context.to_string_lossy().into_owned());
        args
    }

    /// Run to completion, streaming stdout and stderr into `log` line by line.
    async fn run_logged(&self, args: &[String], log: &NodeState) -> Result<()> {
        let command = format!("{} {}", self.program, args.join(" "));
        log.append_line(&format!("$ {}", command));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ChainError::SpawnFailed {
                command: command.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, _) = tokio::join!(child.wait(), pump(stdout, log), pump(stderr, log));
        let status = status?;

        if status.success() {
            Ok(())
        } else {
            Err(ChainError::CommandFailed {
                command,
                status: status.to_string(),
            })
        }
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, log: &NodeState) {
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.append_line(&line);
    }
}

#[async_trait]
impl ImageRunner for DockerCli {
    async fn build(&self, request: &BuildRequest, log: &NodeState) -> Result<()> {
        self.run_logged(&Self::build_args(request), log).await
    }

    async fn push(&self, tag: &str, log: &NodeState) -> Result<()> {
        self.run_logged(&["push".to_string(), tag.to_string()], log).await
    }
}
