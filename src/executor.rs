use crate::config::RunConfig;
use crate::constants::LATEST_TAG;
use crate::dashboard::{BuildEvent, BuildObserver};
use crate::error::{ChainError, ErrorClass, Result};
use crate::graph::{BuildGraph, NodeId};
use crate::runner::{BuildRequest, ImageRunner};
use crate::status::{NodeState, NodeStatus};
use crate::version::{bump, BumpComponent};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Builds and pushes images parent-first on a bounded pool of tasks.
///
/// A node becomes ready only once its parent has reached `success`; a failed
/// node's subtree is never scheduled while siblings carry on.
pub struct BuildExecutor<R: ImageRunner + 'static> {
    runner: Arc<R>,
    config: Arc<RunConfig>,
    execution_stats: ExecutionStats,
    observer: Option<Arc<dyn BuildObserver>>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExecutionStats {
    /// Roots plus everything reachable from them
    pub total_nodes: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Reachable nodes left `pending` because an ancestor failed
    pub unreached: usize,
    pub pushed_tags: usize,
    /// Highest number of node tasks in flight at once
    pub max_in_flight: usize,
    pub total_execution_time_ms: u64,
}

/// Owned snapshot of what one node task needs
struct NodeJob {
    node_id: NodeId,
    name: String,
    request: BuildRequest,
    state: Arc<NodeState>,
}

struct NodeOutcome {
    node_id: NodeId,
    result: Result<usize>,
    duration_ms: u64,
}

impl<R: ImageRunner + 'static> BuildExecutor<R> {
    pub fn new(runner: Arc<R>, config: RunConfig) -> Self {
        Self {
            runner,
            config: Arc::new(config),
            execution_stats: ExecutionStats::default(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(ref obs) = self.observer {
            obs.on_event(event);
        }
    }

    /// Build every root and, recursively, the dependents of each success.
    /// Returns once no task is left in flight.
    pub async fn execute(&mut self, graph: &BuildGraph, roots: &[NodeId]) -> Result<ExecutionStats> {
        let start_time = Instant::now();
        self.execution_stats = ExecutionStats::default();

        // refs do not change while building, one index serves the whole pass
        let index = graph.ref_index();
        let mut reachable: BTreeSet<NodeId> = roots.iter().copied().collect();
        for &root in roots {
            reachable.extend(graph.descendants(root));
        }
        self.execution_stats.total_nodes = reachable.len();

        self.emit(BuildEvent::BuildStarted {
            roots: roots.iter().map(|&id| graph.node(id).name.clone()).collect(),
        });

        let max_in_flight = self.config.max_concurrency.max(1);
        let mut ready: VecDeque<NodeId> = VecDeque::new();
        let mut scheduled: HashSet<NodeId> = HashSet::new();
        // parents that still have to succeed before a node may start
        let mut waiting_on: HashMap<NodeId, usize> = HashMap::new();
        for &root in roots {
            if scheduled.insert(root) {
                ready.push_back(root);
            }
        }

        let mut tasks: JoinSet<NodeOutcome> = JoinSet::new();

        loop {
            while tasks.len() < max_in_flight {
                let Some(id) = ready.pop_front() else { break };
                let job = self.job_for(graph, id);
                let runner = self.runner.clone();
                let config = self.config.clone();
                let observer = self.observer.clone();
                tasks.spawn(async move {
                    let node_id = job.node_id;
                    let state = job.state.clone();
                    // inner task so a panicking runner still reports its node
                    match tokio::spawn(Self::run_node(runner, config, observer, job)).await {
                        Ok(outcome) => outcome,
                        Err(join_err) => {
                            if !state.status().is_terminal() {
                                let _ = state.advance(NodeStatus::Failure);
                            }
                            NodeOutcome {
                                node_id,
                                result: Err(ChainError::Other(anyhow::anyhow!(
                                    "build task aborted: {}",
                                    join_err
                                ))),
                                duration_ms: 0,
                            }
                        }
                    }
                });
                self.execution_stats.max_in_flight =
                    self.execution_stats.max_in_flight.max(tasks.len());
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let outcome = joined.map_err(|e| ChainError::Other(anyhow::anyhow!("build task lost: {}", e)))?;

            let node = graph.node(outcome.node_id);
            match outcome.result {
                Ok(pushed) => {
                    self.execution_stats.succeeded += 1;
                    self.execution_stats.pushed_tags += pushed;
                    self.emit(BuildEvent::NodeCompleted {
                        node_id: node.id,
                        name: node.name.clone(),
                        duration_ms: outcome.duration_ms,
                    });

                    for child in index.dependents(graph, node.id) {
                        if scheduled.contains(&child) {
                            tracing::warn!(
                                "{} was already scheduled, ignoring circular base reference from {}",
                                graph.node(child).name,
                                node.name
                            );
                            continue;
                        }
                        let remaining = waiting_on.entry(child).or_insert(1);
                        *remaining -= 1;
                        if *remaining == 0 {
                            scheduled.insert(child);
                            ready.push_back(child);
                        }
                    }
                }
                Err(err) => {
                    self.execution_stats.failed += 1;
                    if err.class() == ErrorClass::Fatal {
                        tracing::error!("Unexpected error building {}: {}", node.name, err);
                    }
                    self.emit(BuildEvent::NodeFailed {
                        node_id: node.id,
                        name: node.name.clone(),
                        error: err.to_string(),
                    });

                    let skipped: Vec<String> = graph
                        .descendants(node.id)
                        .into_iter()
                        .filter(|id| !scheduled.contains(id))
                        .map(|id| graph.node(id).name.clone())
                        .collect();
                    if !skipped.is_empty() {
                        self.emit(BuildEvent::SubtreePruned {
                            node_id: node.id,
                            name: node.name.clone(),
                            skipped,
                        });
                    }
                }
            }
        }

        self.execution_stats.unreached = reachable
            .iter()
            .filter(|&&id| graph.node(id).state.status() == NodeStatus::Pending)
            .count();
        self.execution_stats.total_execution_time_ms = start_time.elapsed().as_millis() as u64;

        self.emit(BuildEvent::BuildCompleted {
            total_duration_ms: self.execution_stats.total_execution_time_ms,
            succeeded: self.execution_stats.succeeded,
            failed: self.execution_stats.failed,
        });

        Ok(self.execution_stats.clone())
    }

    fn job_for(&self, graph: &BuildGraph, id: NodeId) -> NodeJob {
        let node = graph.node(id);
        let image = node.image(&graph.registry);
        let mut versions = if node.tags.is_empty() {
            bump(&node.version, BumpComponent::None)
        } else {
            node.tags.clone()
        };
        versions.push(LATEST_TAG.to_string());

        NodeJob {
            node_id: id,
            name: node.name.clone(),
            request: BuildRequest {
                tags: versions
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{}:{}", image, v))
                    .collect(),
                image,
                context: node.dir.clone(),
                no_cache: self.config.no_cache,
                pull: self.config.pull,
            },
            state: node.state.clone(),
        }
    }

    async fn run_node(
        runner: Arc<R>,
        config: Arc<RunConfig>,
        observer: Option<Arc<dyn BuildObserver>>,
        job: NodeJob,
    ) -> NodeOutcome {
        let start_time = Instant::now();
        let node_id = job.node_id;
        let result = Self::build_and_push(runner.as_ref(), &config, observer.as_deref(), &job).await;

        if result.is_err() && !job.state.status().is_terminal() {
            let _ = job.state.advance(NodeStatus::Failure);
        }
        if let Err(ref e) = result {
            job.state.append_line(&format!("{} {}", stamp(), e));
        }

        NodeOutcome {
            node_id,
            result,
            duration_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    /// Returns the number of tags pushed.
    async fn build_and_push(
        runner: &R,
        config: &RunConfig,
        observer: Option<&dyn BuildObserver>,
        job: &NodeJob,
    ) -> Result<usize> {
        let state = &job.state;
        state.advance(NodeStatus::Building)?;
        if let Some(obs) = observer {
            obs.on_event(BuildEvent::NodeStarted {
                node_id: job.node_id,
                name: job.name.clone(),
            });
        }

        if config.dry_run {
            let line = format!(
                "Would build {} with tags {:?}",
                job.request.context.display(),
                job.request.tags
            );
            tracing::info!("{}", line);
            state.append_line(&line);
        } else {
            state.append_line(&format!("{} Building {}", stamp(), job.request.image));
            runner.build(&job.request, state).await?;
        }

        let mut pushed = 0;
        if config.push {
            state.advance(NodeStatus::Pushing)?;
            if let Some(obs) = observer {
                obs.on_event(BuildEvent::NodePushing {
                    node_id: job.node_id,
                    name: job.name.clone(),
                    tags: job.request.tags.len(),
                });
            }
            for tag in &job.request.tags {
                if config.dry_run {
                    let line = format!("Would push {}", tag);
                    tracing::info!("{}", line);
                    state.append_line(&line);
                } else {
                    runner.push(tag, state).await?;
                }
                pushed += 1;
            }
        }

        state.advance(NodeStatus::Success)?;
        Ok(pushed)
    }

    /// Print execution summary
    pub fn print_execution_summary(&self) {
        let stats = &self.execution_stats;
        println!("\n📊 Build Summary:");
        println!("  Images in scope: {}", stats.total_nodes);
        println!("  Succeeded: {}", stats.succeeded);
        println!("  Failed: {}", stats.failed);
        println!("  Not built: {}", stats.unreached);
        println!("  Tags pushed: {}", stats.pushed_tags);
        println!("  Peak parallel builds: {}", stats.max_in_flight);
        println!("  Total time: {}ms", stats.total_execution_time_ms);
    }
}

fn stamp() -> String {
    chrono::Local::now().format("[%H:%M:%S]").to_string()
}
