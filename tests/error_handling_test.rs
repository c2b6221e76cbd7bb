/// Fatal versus node-local failures
#[cfg(test)]
mod error_handling_tests {
    use chainbuild::config::{ConfigOverrides, FileConfig, RunConfig};
    use chainbuild::error::{ChainError, ErrorClass};
    use chainbuild::executor::BuildExecutor;
    use chainbuild::propagate::VersionPropagator;
    use chainbuild::runner::DockerCli;
    use chainbuild::scanner::scan_images;
    use chainbuild::status::NodeStatus;
    use chainbuild::version::BumpComponent;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_image(root: &std::path::Path, name: &str, recipe: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Dockerfile"), recipe).unwrap();
        fs::write(dir.join("VERSION"), "1.0.0\n").unwrap();
    }

    #[test]
    fn test_unreadable_base_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = scan_images(&tmp.path().join("missing"), "reg").unwrap_err();
        assert!(matches!(err, ChainError::ScanFailed { .. }));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_registry_port_makes_base_ref_ambiguous() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "base", "FROM debian:12\n");
        write_image(tmp.path(), "app", "FROM localhost:5000/base:1.0.0\n");

        let config = RunConfig {
            registry: "localhost:5000".to_string(),
            bump: BumpComponent::Patch,
            ..Default::default()
        };
        let mut graph = scan_images(tmp.path(), &config.registry).unwrap();
        let base = graph.lookup("base").unwrap();
        let err = VersionPropagator::new(&config)
            .propagate(&mut graph, &[base])
            .unwrap_err();

        match &err {
            ChainError::InvalidBaseRef { reference, .. } => {
                assert_eq!(reference, "localhost:5000/base:1.0.0")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_malformed_config_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("conf.yaml"), "registry: [unclosed\n").unwrap();
        let err = FileConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn test_unknown_config_key_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("conf.yaml"), "registy: typo.example\n").unwrap();
        assert!(FileConfig::load(tmp.path()).is_err());
    }

    #[test]
    fn test_missing_config_file_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(FileConfig::load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_bad_change_pattern_rejected() {
        let file = FileConfig::parse("change_match:\n  mode: glob\n  pattern: \"{name}/[\"\n").unwrap();
        let err = RunConfig::resolve(Some(file), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let overrides = ConfigOverrides {
            max_concurrency: Some(0),
            ..Default::default()
        };
        assert!(RunConfig::resolve(None, overrides).is_err());
    }

    #[tokio::test]
    async fn test_missing_docker_binary_fails_only_that_subtree() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "base", "FROM debian:12\n");
        write_image(tmp.path(), "app", "FROM reg/base:1.0.0\n");
        write_image(tmp.path(), "tool", "FROM alpine:3\n");

        let graph = scan_images(tmp.path(), "reg").unwrap();
        let config = RunConfig {
            registry: "reg".to_string(),
            push: false,
            max_concurrency: 2,
            ..Default::default()
        };
        let runner = Arc::new(DockerCli::new("/nonexistent/chainbuild-docker"));
        let mut executor = BuildExecutor::new(runner, config);
        let roots = vec![graph.lookup("base").unwrap(), graph.lookup("tool").unwrap()];

        // node failures are contained, the run itself completes
        let stats = executor.execute(&graph, &roots).await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.unreached, 1);

        let base = graph.node(graph.lookup("base").unwrap());
        assert_eq!(base.state.status(), NodeStatus::Failure);
        assert!(base.state.log_text().contains("failed to spawn"));
        let app = graph.node(graph.lookup("app").unwrap());
        assert_eq!(app.state.status(), NodeStatus::Pending);
    }
}
