/// Ordering, isolation and concurrency properties of the build scheduler
#[cfg(test)]
mod scheduler_tests {
    use async_trait::async_trait;
    use chainbuild::config::RunConfig;
    use chainbuild::dashboard::{BuildEvent, BuildObserver};
    use chainbuild::error::{ChainError, Result};
    use chainbuild::executor::BuildExecutor;
    use chainbuild::graph::{BuildGraph, ImageNode};
    use chainbuild::runner::{BuildRequest, ImageRunner};
    use chainbuild::status::{NodeState, NodeStatus};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Build(String),
        Push(String),
    }

    /// Records every call in arrival order; can be told to fail chosen images.
    #[derive(Default)]
    struct MockRunner {
        calls: Mutex<Vec<Call>>,
        fail_build: HashSet<String>,
        fail_push: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockRunner {
        fn failing_build(images: &[&str]) -> Self {
            Self {
                fail_build: images.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn position(&self, call: &Call) -> Option<usize> {
            self.calls().iter().position(|c| c == call)
        }

        fn last_push_of(&self, image: &str) -> Option<usize> {
            let prefix = format!("{}:", image);
            self.calls()
                .iter()
                .rposition(|c| matches!(c, Call::Push(tag) if tag.starts_with(&prefix)))
        }
    }

    #[async_trait]
    impl ImageRunner for MockRunner {
        async fn build(&self, request: &BuildRequest, log: &NodeState) -> Result<()> {
            self.calls.lock().push(Call::Build(request.image.clone()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            log.append_line(&format!("Step 1/1 : building {}", request.image));
            if self.fail_build.contains(&request.image) {
                return Err(ChainError::CommandFailed {
                    command: format!("docker build {}", request.image),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }

        async fn push(&self, tag: &str, _log: &NodeState) -> Result<()> {
            self.calls.lock().push(Call::Push(tag.to_string()));
            let image = tag.rsplit_once(':').map(|(i, _)| i).unwrap_or(tag);
            if self.fail_push.contains(image) {
                return Err(ChainError::CommandFailed {
                    command: format!("docker push {}", tag),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<BuildEvent>>,
    }

    impl BuildObserver for RecordingObserver {
        fn on_event(&self, event: BuildEvent) {
            self.events.lock().push(event);
        }
    }

    /// `(name, base_ref)` pairs, every image at version 1.0.0 under `reg`
    fn graph(images: &[(&str, &str)]) -> BuildGraph {
        let mut graph = BuildGraph::new("reg", "/images");
        for (name, base) in images {
            let mut node = ImageNode::new(*name, PathBuf::from("/images").join(name));
            node.base_ref = base.to_string();
            node.base_ref_line = Some(0);
            node.recipe_lines = vec![format!("FROM {}", base)];
            node.version = "1.0.0".to_string();
            graph.insert(node);
        }
        graph
    }

    fn config(max_concurrency: usize) -> RunConfig {
        RunConfig {
            registry: "reg".to_string(),
            max_concurrency,
            ..Default::default()
        }
    }

    fn status(graph: &BuildGraph, name: &str) -> NodeStatus {
        graph.node(graph.lookup(name).unwrap()).state.status()
    }

    fn fan_out() -> BuildGraph {
        graph(&[
            ("base", "debian:12"),
            ("a", "reg/base:1.0.0"),
            ("b", "reg/base:1.0.0"),
            ("a1", "reg/a:1.0.0"),
            ("b1", "reg/b:1.0.0"),
        ])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parent_pushed_before_child_builds() {
        let graph = fan_out();
        let runner = Arc::new(MockRunner::default());
        let mut executor = BuildExecutor::new(runner.clone(), config(4));

        let stats = executor.execute(&graph, &[0]).await.unwrap();
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.failed, 0);

        for (parent, child) in [("base", "a"), ("base", "b"), ("a", "a1"), ("b", "b1")] {
            let parent_done = runner.last_push_of(&format!("reg/{}", parent)).unwrap();
            let child_start = runner.position(&Call::Build(format!("reg/{}", child))).unwrap();
            assert!(
                parent_done < child_start,
                "{} started before {} finished",
                child,
                parent
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_push_follows_build_with_all_tags() {
        let graph = graph(&[("base", "debian:12")]);
        let runner = Arc::new(MockRunner::default());
        let mut executor = BuildExecutor::new(runner.clone(), config(2));
        let stats = executor.execute(&graph, &[0]).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                Call::Build("reg/base".into()),
                Call::Push("reg/base:1.0.0".into()),
                Call::Push("reg/base:1.0".into()),
                Call::Push("reg/base:1".into()),
                Call::Push("reg/base:latest".into()),
            ]
        );
        assert_eq!(stats.pushed_tags, 4);
        assert_eq!(status(&graph, "base"), NodeStatus::Success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_branch_does_not_stop_sibling() {
        let graph = fan_out();
        let runner = Arc::new(MockRunner::failing_build(&["reg/a"]));
        let observer = Arc::new(RecordingObserver::default());
        let mut executor =
            BuildExecutor::new(runner.clone(), config(4)).with_observer(observer.clone());

        let stats = executor.execute(&graph, &[0]).await.unwrap();

        assert_eq!(status(&graph, "base"), NodeStatus::Success);
        assert_eq!(status(&graph, "a"), NodeStatus::Failure);
        assert_eq!(status(&graph, "a1"), NodeStatus::Pending);
        assert_eq!(status(&graph, "b"), NodeStatus::Success);
        assert_eq!(status(&graph, "b1"), NodeStatus::Success);
        assert_eq!((stats.succeeded, stats.failed, stats.unreached), (3, 1, 1));

        // failed build is never pushed, its child never built
        assert!(runner.last_push_of("reg/a").is_none());
        assert!(runner.position(&Call::Build("reg/a1".into())).is_none());

        let events = observer.events.lock().clone();
        assert!(events.iter().any(|e| matches!(
            e,
            BuildEvent::SubtreePruned { name, skipped, .. } if name == "a" && skipped == &vec!["a1".to_string()]
        )));
        assert!(graph.node(graph.lookup("a").unwrap()).state.log_text().contains("building reg/a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_push_failure_marks_node_failed() {
        let graph = graph(&[("base", "debian:12"), ("app", "reg/base:1.0.0")]);
        let runner = Arc::new(MockRunner {
            fail_push: ["reg/base".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let mut executor = BuildExecutor::new(runner.clone(), config(2));
        let stats = executor.execute(&graph, &[0]).await.unwrap();

        assert_eq!(status(&graph, "base"), NodeStatus::Failure);
        assert_eq!(status(&graph, "app"), NodeStatus::Pending);
        assert_eq!(stats.failed, 1);
        // the first push failed, remaining tags were not attempted
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_limit() {
        let mut images = vec![("base".to_string(), "debian:12".to_string())];
        for i in 0..8 {
            images.push((format!("leaf{}", i), "reg/base:1.0.0".to_string()));
        }
        let pairs: Vec<(&str, &str)> = images.iter().map(|(n, b)| (n.as_str(), b.as_str())).collect();
        let graph = graph(&pairs);

        let runner = Arc::new(MockRunner {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let mut executor = BuildExecutor::new(runner.clone(), config(2));
        let stats = executor.execute(&graph, &[0]).await.unwrap();

        assert_eq!(stats.succeeded, 9);
        assert!(stats.max_in_flight <= 2);
        assert!(runner.max_in_flight.load(Ordering::SeqCst) <= 2);
        // leaves do overlap once the base is done
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dry_run_advances_status_without_runner() {
        let graph = fan_out();
        let runner = Arc::new(MockRunner::default());
        let mut cfg = config(4);
        cfg.dry_run = true;
        let mut executor = BuildExecutor::new(runner.clone(), cfg);
        let stats = executor.execute(&graph, &[0]).await.unwrap();

        assert!(runner.calls().is_empty());
        assert_eq!(stats.succeeded, 5);
        for node in &graph.nodes {
            assert_eq!(node.state.status(), NodeStatus::Success);
        }
        let log = graph.node(0).state.log_text();
        assert!(log.contains("Would build"));
        assert!(log.contains("Would push reg/base:latest"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_push_skips_pushing() {
        let graph = graph(&[("base", "debian:12"), ("app", "reg/base:1.0.0")]);
        let runner = Arc::new(MockRunner::default());
        let mut cfg = config(2);
        cfg.push = false;
        let mut executor = BuildExecutor::new(runner.clone(), cfg);
        executor.execute(&graph, &[0]).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![Call::Build("reg/base".into()), Call::Build("reg/app".into())]
        );
        assert_eq!(status(&graph, "app"), NodeStatus::Success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_self_reference_is_built_once() {
        // base image names itself, must not loop
        let graph = graph(&[("loop", "reg/loop:1.0.0")]);
        let runner = Arc::new(MockRunner::default());
        let mut cfg = config(2);
        cfg.push = false;
        let mut executor = BuildExecutor::new(runner.clone(), cfg);
        let stats = executor.execute(&graph, &[0]).await.unwrap();

        assert_eq!(stats.succeeded, 1);
        assert_eq!(runner.calls(), vec![Call::Build("reg/loop".into())]);
    }

    #[tokio::test]
    async fn test_events_bracket_the_run() {
        let graph = graph(&[("base", "debian:12")]);
        let observer = Arc::new(RecordingObserver::default());
        let mut executor = BuildExecutor::new(Arc::new(MockRunner::default()), config(1))
            .with_observer(observer.clone());
        executor.execute(&graph, &[0]).await.unwrap();

        let events = observer.events.lock().clone();
        assert!(matches!(events.first(), Some(BuildEvent::BuildStarted { roots }) if roots == &vec!["base".to_string()]));
        assert!(matches!(
            events.last(),
            Some(BuildEvent::BuildCompleted { succeeded: 1, failed: 0, .. })
        ));
        assert!(events.iter().any(|e| matches!(e, BuildEvent::NodePushing { tags: 4, .. })));
    }
}
