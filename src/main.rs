//! Harvester main entry point
//!
//! This is the command-line interface for the harvest pipeline.

use anyhow::Context;
use clap::Parser;
use harvester::builtin::{default_registry, EngagementAnalyzer};
use harvester::config::{load_config_with_hash, Config};
use harvester::fetch::{FetchController, HttpSurfaceFactory};
use harvester::identity::{HttpProbe, IdentityManager};
use harvester::output::{
    generate_markdown_report, print_pool_stats, print_run_summary, print_stored_stats, print_validation,
};
use harvester::pipeline::{Collaborators, PipelineOrchestrator, PipelineRun};
use harvester::queue::{parse_link_file, CrawlQueue};
use harvester::storage::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Harvester: a resilient content crawl-and-pipeline core
///
/// Harvester fetches social media content through a pool of rotating
/// identities, scores it with pluggable analyzers, keeps what clears the
/// threshold and refreshes cached aggregate views.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(version)]
#[command(about = "A resilient content crawl-and-pipeline core", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and targets without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "check_identities", "schedule"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "check_identities", "schedule"])]
    stats: bool,

    /// Probe every configured identity and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "schedule"])]
    check_identities: bool,

    /// Keep running the pipeline on the configured interval until interrupted
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "check_identities"])]
    schedule: bool,
}

/// Long-lived parts shared by every mode that touches the network
struct Runtime {
    identities: Arc<IdentityManager>,
    controller: Arc<FetchController>,
}

impl Runtime {
    fn build(config: &Config) -> anyhow::Result<Self> {
        let probe = Arc::new(HttpProbe::from_config(&config.identity));
        let identities = Arc::new(IdentityManager::from_config(&config.identity, probe)?);
        let controller = Arc::new(FetchController::from_config(&config.fetch, Arc::clone(&identities))?);

        Ok(Self { identities, controller })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.stats {
        return handle_stats(&config);
    }

    let runtime = Runtime::build(&config)?;

    if cli.dry_run {
        handle_dry_run(&config, &runtime)
    } else if cli.check_identities {
        handle_check_identities(&runtime).await
    } else if cli.schedule {
        handle_schedule(config, config_hash, runtime).await
    } else {
        handle_run(config, config_hash, runtime).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvester=info,warn"),
            1 => EnvFilter::new("harvester=debug,info"),
            2 => EnvFilter::new("harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_orchestrator(config: &Config, runtime: &Runtime, store: Arc<SqliteStore>) -> PipelineOrchestrator {
    let parts = Collaborators {
        adapters: Arc::new(default_registry()),
        controller: Arc::clone(&runtime.controller),
        surfaces: Arc::new(HttpSurfaceFactory),
        analyzers: vec![Arc::new(EngagementAnalyzer::new())],
        store: store.clone(),
        cache: store,
    };

    PipelineOrchestrator::from_config(config, parts)
}

/// Handles the --dry-run mode: validates every source's targets
fn handle_dry_run(config: &Config, runtime: &Runtime) -> anyhow::Result<()> {
    println!("=== Harvester Dry Run ===\n");

    println!("Fetch:");
    println!("  Max retries: {}", config.fetch.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms jitter",
        config.fetch.base_delay_ms, config.fetch.jitter_ms
    );
    println!("  Navigation timeout: {}ms", config.fetch.navigation_timeout_ms);
    println!("  Proxy required: {}", config.fetch.require_proxy);
    println!("  Blocked resources: {}", config.fetch.blocked_resources.join(", "));

    println!("\nQueue:");
    println!("  Batch size: {}", config.queue.batch_size);
    println!("  Inter-batch delay: {}ms", config.queue.inter_batch_delay_ms);

    println!("\nPipeline:");
    println!("  Score threshold: {}", config.pipeline.score_threshold);
    println!("  Analyzer concurrency: {}", config.pipeline.analyzer_concurrency);
    match config.pipeline.schedule_interval_secs {
        Some(secs) => println!("  Schedule: every {}s", secs),
        None => println!("  Schedule: off"),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(report) = &config.output.report_path {
        println!("  Report: {}", report);
    }
    println!();

    print_pool_stats(&runtime.identities.stats());
    println!();

    let queue = CrawlQueue::new(
        Arc::new(default_registry()),
        Arc::clone(&runtime.controller),
        Arc::new(HttpSurfaceFactory),
        &config.queue,
    );

    let mut accepted = 0;
    for source in &config.pipeline.sources {
        let mut inputs = source.targets.clone();
        if let Some(path) = &source.target_file {
            match parse_link_file(Path::new(path)) {
                Ok(links) => inputs.extend(links),
                Err(e) => println!("Source {}: cannot read {}: {}", source.name, path, e),
            }
        }

        let report = queue.submit(&inputs);
        accepted += report.accepted_count();
        print_validation(&source.name, &report);
        queue.clear();
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would fetch {} targets from {} sources",
        accepted,
        config.pipeline.sources.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = SqliteStore::open(Path::new(&config.output.database_path))
        .with_context(|| format!("opening {}", config.output.database_path))?;
    let stats = store.stored_stats(10)?;

    print_stored_stats(&stats);

    Ok(())
}

/// Handles the --check-identities mode: probes every identity
async fn handle_check_identities(runtime: &Runtime) -> anyhow::Result<()> {
    println!("=== Identity Check ===\n");

    let report = runtime.identities.check_all().await;

    for id in &report.working {
        println!("  ✓ {}", id);
    }
    for id in &report.failed {
        println!("  ✗ {}", id);
    }
    println!("\n{} working, {} failed\n", report.working.len(), report.failed.len());

    print_pool_stats(&runtime.identities.stats());

    Ok(())
}

/// Handles a single pipeline run
async fn handle_run(config: Config, config_hash: String, runtime: Runtime) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::open(Path::new(&config.output.database_path))
            .with_context(|| format!("opening {}", config.output.database_path))?,
    );
    let orchestrator = Arc::new(build_orchestrator(&config, &runtime, Arc::clone(&store)));

    tracing::info!(
        "Starting run over {} sources",
        config.pipeline.sources.len()
    );

    let mut task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_full_pipeline().await }
    });

    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };

    let run = match finished {
        Some(joined) => joined??,
        None => {
            tracing::warn!("Interrupted, stopping at the next batch boundary");
            orchestrator.stop();
            task.await??
        }
    };

    finish_run(&config, &config_hash, &store, &run)
}

/// Handles the --schedule mode: runs on every interval until interrupted
async fn handle_schedule(config: Config, config_hash: String, runtime: Runtime) -> anyhow::Result<()> {
    let Some(secs) = config.pipeline.schedule_interval_secs else {
        anyhow::bail!("--schedule needs pipeline.schedule-interval-secs in the configuration");
    };

    let store = Arc::new(
        SqliteStore::open(Path::new(&config.output.database_path))
            .with_context(|| format!("opening {}", config.output.database_path))?,
    );
    let orchestrator = Arc::new(build_orchestrator(&config, &runtime, Arc::clone(&store)));

    tracing::info!("Scheduling runs every {}s", secs);
    let mut handle = orchestrator.start_schedule(Duration::from_secs(secs));

    loop {
        tokio::select! {
            next = handle.next_run() => {
                let Some(run) = next else {
                    break;
                };
                if let Err(e) = finish_run(&config, &config_hash, &store, &run) {
                    tracing::error!("Failed to record run {}: {:#}", run.id, e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping schedule");
                orchestrator.stop();
                break;
            }
        }
    }

    // The interrupted run still gets recorded
    for run in handle.shutdown().await {
        if let Err(e) = finish_run(&config, &config_hash, &store, &run) {
            tracing::error!("Failed to record run {}: {:#}", run.id, e);
        }
    }
    Ok(())
}

/// Records, prints and reports a finished run
fn finish_run(config: &Config, config_hash: &str, store: &SqliteStore, run: &PipelineRun) -> anyhow::Result<()> {
    store
        .record_run(run, config_hash)
        .with_context(|| format!("recording run {}", run.id))?;

    print_run_summary(run);

    if let Some(path) = &config.output.report_path {
        generate_markdown_report(run, config_hash, Path::new(path))?;
        println!("\n✓ Report written to: {}", path);
    }

    Ok(())
}
