use anyhow::{bail, Context, Result};
use chainbuild::changes::GitDiff;
use chainbuild::config::{ConfigOverrides, FileConfig, RunConfig};
use chainbuild::constants::GRAPH_FILE;
use chainbuild::dashboard::{BuildObserver, LogObserver, ProgressPoller};
use chainbuild::executor::BuildExecutor;
use chainbuild::graph::{BuildGraph, NodeId};
use chainbuild::logging::init_logging;
use chainbuild::propagate::{VersionChange, VersionPropagator};
use chainbuild::report::RunReport;
use chainbuild::roots::RootResolver;
use chainbuild::runner::DockerCli;
use chainbuild::scanner::scan_images;
use chainbuild::version::BumpComponent;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "chainbuild", version, about = "Build and publish a tree of dependent container images")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bump versions, then build and push the affected images
    Build(BuildArgs),
    /// Bump versions and rewrite base references without building
    Bump(SeedArgs),
    /// Write the dependency diagram in dot format
    Graph {
        /// Directory holding one subdirectory per image
        base_dir: PathBuf,
        /// Output file, defaults to Dependency_Graph.dot in the base directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// Image directories to start from; they must share a parent directory
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Version component to bump on every affected image
    #[arg(short, long, value_enum, default_value_t = BumpComponent::None)]
    bump: BumpComponent,

    /// Only keep seeds with changes since this git revision
    #[arg(long)]
    since: Option<String>,

    /// Report what would happen without writing files or invoking docker
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Registry prefix for image references
    #[arg(long, env = "CHAINBUILD_REGISTRY")]
    registry: Option<String>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    seeds: SeedArgs,

    #[arg(long)]
    no_push: bool,

    #[arg(long)]
    no_cache: bool,

    /// Do not pass --pull to docker build
    #[arg(long)]
    no_pull: bool,

    /// Maximum number of images built at once
    #[arg(short, long, env = "CHAINBUILD_JOBS")]
    jobs: Option<usize>,

    /// Show live per-image status instead of plain log lines
    #[arg(long)]
    progress: bool,

    /// Write a JSON report of the run
    #[arg(long)]
    report: Option<PathBuf>,
}

impl SeedArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            registry: self.registry.clone(),
            bump: self.bump,
            since: self.since.clone(),
            dry_run: self.dry_run,
            ..Default::default()
        }
    }

    /// Parent of the first seed; every seed is looked up under it.
    fn base_dir(&self) -> Result<PathBuf> {
        let first = self.images.first().context("no image directory given")?;
        let first = first
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", first.display()))?;
        let base = first
            .parent()
            .with_context(|| format!("{} has no parent directory", first.display()))?
            .to_path_buf();
        for image in &self.images[1..] {
            if let Ok(dir) = image.canonicalize() {
                if dir.parent() != Some(base.as_path()) {
                    tracing::warn!("{} is not under {}, ignoring", image.display(), base.display());
                }
            }
        }
        Ok(base)
    }
}

struct Prepared {
    graph: BuildGraph,
    config: RunConfig,
    changes: Vec<VersionChange>,
    roots: Vec<NodeId>,
}

fn load_config(base_dir: &Path, overrides: ConfigOverrides) -> Result<RunConfig> {
    let file = FileConfig::load(base_dir)?;
    Ok(RunConfig::resolve(file, overrides)?)
}

/// Scan, pick roots and propagate versions: the part shared by build and bump.
async fn prepare(seeds: &SeedArgs, overrides: ConfigOverrides) -> Result<Prepared> {
    let base_dir = seeds.base_dir()?;
    let config = load_config(&base_dir, overrides)?;

    println!("📂 Scanning {}...", base_dir.display());
    let mut graph = scan_images(&base_dir, &config.registry)?;
    println!("   {} images found", graph.len());

    let git = GitDiff::new(&base_dir);
    let roots = RootResolver::new(&graph, &config, &git).resolve(&seeds.images).await?;

    println!("🔄 Propagating versions ({})...", config.bump);
    let changes = VersionPropagator::new(&config).propagate(&mut graph, &roots)?;
    for change in &changes {
        println!("   {}: {} -> {}", change.image, change.from, change.to);
    }

    Ok(Prepared {
        graph,
        config,
        changes,
        roots,
    })
}

async fn run_build(args: BuildArgs) -> Result<()> {
    let mut overrides = args.seeds.overrides();
    overrides.no_cache = args.no_cache;
    overrides.no_pull = args.no_pull;
    overrides.no_push = args.no_push;
    overrides.max_concurrency = args.jobs;

    let Prepared {
        graph,
        config,
        changes,
        roots,
    } = prepare(&args.seeds, overrides).await?;
    if roots.is_empty() {
        println!("✅ Nothing to build");
        return Ok(());
    }

    let dry_run = config.dry_run;
    let observer: Arc<dyn BuildObserver> = Arc::new(LogObserver::new(&graph));
    let poller = args
        .progress
        .then(|| ProgressPoller::spawn(graph.nodes.iter().map(|n| n.state.clone()).collect()));

    println!("⚡ Building with up to {} parallel jobs...", config.max_concurrency);
    let mut executor = BuildExecutor::new(Arc::new(DockerCli::default()), config).with_observer(observer);
    let result = executor.execute(&graph, &roots).await;
    if let Some(poller) = poller {
        poller.finish().await;
    }
    let stats = result?;
    executor.print_execution_summary();

    let report = RunReport::new(&graph, stats, changes, dry_run);
    if let Some(path) = &args.report {
        report.write_to(path)?;
        println!("📝 Report written to {}", path.display());
    }

    let failed: Vec<&str> = report.failed().map(|n| n.name.as_str()).collect();
    if !failed.is_empty() {
        bail!("{} image(s) failed: {}", failed.len(), failed.join(", "));
    }
    println!("✅ Build completed successfully");
    Ok(())
}

async fn run_bump(args: SeedArgs) -> Result<()> {
    if args.bump == BumpComponent::None {
        bail!("bump needs a component other than none");
    }
    let prepared = prepare(&args, args.overrides()).await?;
    if prepared.config.dry_run {
        println!("✅ Dry run, {} version(s) would change", prepared.changes.len());
    } else {
        println!("✅ {} version(s) updated", prepared.changes.len());
    }
    Ok(())
}

fn run_graph(base_dir: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(base_dir, ConfigOverrides::default())?;
    let graph = scan_images(base_dir, &config.registry)?;
    let output = output.unwrap_or_else(|| base_dir.join(GRAPH_FILE));
    std::fs::write(&output, graph.to_dot())
        .with_context(|| format!("cannot write {}", output.display()))?;
    println!("📊 Dependency graph written to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.json_logs, cli.verbose) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match cli.command {
        Command::Build(args) => run_build(args).await,
        Command::Bump(args) => run_bump(args).await,
        Command::Graph { base_dir, output } => run_graph(&base_dir, output),
    }
}
