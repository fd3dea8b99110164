//! Sumi-Cycle main entry point
//!
//! This is the command-line interface for the Sumi-Cycle crawl round scheduler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sumi_cycle::config::{load_config_with_hash, resolve_config, CrawlConfig, RawConfig};
use sumi_cycle::engine::{EngineRunner, Invocation, StageBuilder};
use sumi_cycle::mode::{ModeResolver, ResolvedRun};
use sumi_cycle::rounds::RoundScheduler;
use sumi_cycle::CycleError;
use tracing_subscriber::EnvFilter;

/// Sumi-Cycle: runs batch crawl rounds against an external crawl engine
///
/// Each round generates a segment, fetches and parses it, updates the crawl
/// and link databases, deduplicates and optionally indexes. Create a `.STOP`
/// file in the working directory to stop at the next round boundary.
#[derive(Parser, Debug)]
#[command(name = "sumi-cycle")]
#[command(version = "1.0.0")]
#[command(about = "Runs batch crawl rounds against an external crawl engine", long_about = None)]
struct Cli {
    /// Directory holding crawldb, linkdb, hostdb and segments
    #[arg(value_name = "CRAWL_DIR")]
    crawl_dir: Option<PathBuf>,

    /// Number of rounds to run, -1 to run until no URLs are left
    #[arg(value_name = "ROUNDS", allow_negative_numbers = true)]
    rounds: Option<i64>,

    /// TOML configuration file supplying defaults for every option
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Index each segment and clean the index afterwards
    #[arg(short, long)]
    index: bool,

    /// Engine property passed to index and clean (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    properties: Vec<String>,

    /// Time to wait before retrying when there are no URLs to fetch
    /// (e.g. 30s, 10m, 1d; -1 disables waiting)
    #[arg(short, long, value_name = "DURATION", allow_hyphen_values = true)]
    wait: Option<String>,

    /// Directory of seed URL lists injected before the first round
    #[arg(short, long, value_name = "DIR")]
    seed_dir: Option<PathBuf>,

    /// Directory of sitemap URL lists processed before the first round
    #[arg(long, value_name = "DIR")]
    sitemap_dir: Option<PathBuf>,

    /// Number of fetcher slaves [default: 1, forced to 1 in local mode]
    #[arg(long, value_name = "N")]
    num_slaves: Option<u32>,

    /// Number of reduce tasks per job [default: 2]
    #[arg(long, value_name = "N")]
    num_tasks: Option<u32>,

    /// Number of URLs to fetch per round [default: 50000]
    #[arg(long, value_name = "N")]
    size_fetchlist: Option<u64>,

    /// Fetch time limit in minutes, -1 for none [default: 180]
    #[arg(long, value_name = "MINUTES", allow_negative_numbers = true)]
    time_limit_fetch: Option<i64>,

    /// Number of fetcher and sitemap threads [default: 50]
    #[arg(long, value_name = "N")]
    num_threads: Option<u32>,

    /// Discover sitemaps from hosts in the HostDB: never, always or once [default: never]
    #[arg(long, value_name = "POLICY")]
    sitemaps_from_hostdb: Option<String>,

    /// Dedup grouping: none, host or domain [default: none]
    #[arg(long, value_name = "GROUP")]
    dedup_group: Option<String>,

    /// Crawl engine installation directory [default: parent of this binary's directory]
    #[arg(long, value_name = "DIR")]
    engine_home: Option<PathBuf>,

    /// Crawl engine launcher [default: <engine-home>/bin/crawl-engine]
    #[arg(long, value_name = "PATH")]
    launcher: Option<PathBuf>,

    /// Distributed filesystem client used in distributed mode [default: hadoop]
    #[arg(long, value_name = "BIN")]
    fs_client: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show the resolved configuration and stage plan without running anything
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Extracts the configuration values given on the command line
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            crawl_root: self.crawl_dir.clone(),
            rounds: self.rounds,
            index: self.index.then_some(true),
            properties: (!self.properties.is_empty()).then(|| self.properties.clone()),
            wait: self.wait.clone(),
            seed_dir: self.seed_dir.clone(),
            sitemap_dir: self.sitemap_dir.clone(),
            num_slaves: self.num_slaves,
            num_tasks: self.num_tasks,
            size_fetchlist: self.size_fetchlist,
            time_limit_fetch: self.time_limit_fetch,
            num_threads: self.num_threads,
            sitemaps_from_hostdb: self.sitemaps_from_hostdb.clone(),
            dedup_group: self.dedup_group.clone(),
            engine_home: self.engine_home.clone(),
            launcher: self.launcher.clone(),
            fs_client: self.fs_client.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let resolved = match load_and_resolve(&cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("{}", e);
            return exit_code(e.exit_code());
        }
    };

    if cli.dry_run {
        return match handle_dry_run(&resolved) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("Dry run failed: {:#}", e);
                exit_code(1)
            }
        };
    }

    match handle_crawl(&resolved).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            exit_code(e.exit_code())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_cycle=info,warn"),
            1 => EnvFilter::new("sumi_cycle=debug,info"),
            2 => EnvFilter::new("sumi_cycle=trace,debug"),
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

/// Merges the config file and command line, validates, and resolves the mode
fn load_and_resolve(cli: &Cli) -> Result<ResolvedRun, CycleError> {
    let file_config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (raw, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            raw
        }
        None => RawConfig::default(),
    };

    let raw = cli.raw_config().merge(file_config);
    let config = resolve_config(raw, &default_engine_home())?;

    Ok(ModeResolver::resolve(config)?)
}

/// The directory above the one holding this binary, e.g. `/opt/engine` for
/// `/opt/engine/bin/sumi-cycle`
fn default_engine_home() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Handles the --dry-run mode: shows the resolved setup and the first round's stages
fn handle_dry_run(resolved: &ResolvedRun) -> anyhow::Result<()> {
    use std::io::Write;

    let config = &resolved.config;
    let stages = StageBuilder::new(config);
    let launcher = config.engine.launcher.display();
    let mut out = std::io::stdout().lock();

    writeln!(out, "=== Sumi-Cycle Dry Run ===\n")?;

    writeln!(out, "Execution:")?;
    writeln!(out, "  Mode: {}", resolved.mode)?;
    writeln!(out, "  Engine home: {}", config.engine.home.display())?;
    writeln!(out, "  Launcher: {}", launcher)?;

    writeln!(out, "\nCrawl:")?;
    writeln!(out, "  Root: {}", config.crawl_root.display())?;
    match config.rounds {
        Some(limit) => writeln!(out, "  Rounds: {}", limit)?,
        None => writeln!(out, "  Rounds: unbounded")?,
    }
    match config.wait {
        Some(seconds) => writeln!(out, "  Wait when no URLs: {}s", seconds)?,
        None => writeln!(out, "  Wait when no URLs: disabled")?,
    }
    writeln!(out, "  Slaves: {}", config.num_slaves)?;
    writeln!(out, "  Reduce tasks: {}", config.num_tasks)?;
    writeln!(out, "  Fetch list size: {}", config.size_fetchlist)?;
    writeln!(out, "  Fetch time limit: {} min", config.time_limit_fetch)?;
    writeln!(out, "  Threads: {}", config.num_threads)?;
    writeln!(out, "  Sitemaps from HostDB: {}", config.sitemaps_from_hostdb)?;
    writeln!(out, "  Dedup group: {}", config.dedup_group)?;
    writeln!(out, "  Index: {}", config.index)?;

    writeln!(out, "\nSetup:")?;
    if let Some(seed_dir) = &config.seed_dir {
        writeln!(out, "  {} {}", launcher, stages.inject(seed_dir))?;
    }
    if let Some(sitemap_dir) = &config.sitemap_dir {
        writeln!(out, "  {} {}", launcher, stages.sitemap(sitemap_dir))?;
    }

    writeln!(out, "\nRound 1:")?;
    for (invocation, condition) in first_round_plan(config, &stages) {
        match condition {
            Some(condition) => writeln!(out, "  {} {} {}", launcher, invocation, condition)?,
            None => writeln!(out, "  {} {}", launcher, invocation)?,
        }
    }

    writeln!(out, "\n✓ Configuration is valid")
        .context("failed to write dry run output")?;

    Ok(())
}

const IF_CRAWLDB: &str = "(if crawldb exists)";
const IF_HOSTDB: &str = "(if hostdb exists)";

/// The stages of the first round, each with the condition it runs under
fn first_round_plan(
    config: &CrawlConfig,
    stages: &StageBuilder<'_>,
) -> Vec<(Invocation, Option<&'static str>)> {
    let segment = "<segment>";
    let mut plan = Vec::new();
    if config.sitemaps_from_hostdb.applies_to_round(1) {
        plan.push((stages.update_hostdb(), Some(IF_CRAWLDB)));
        plan.push((stages.sitemap_from_hostdb(), Some(IF_HOSTDB)));
    }
    plan.push((stages.generate(), None));
    plan.push((stages.fetch(segment), None));
    plan.push((stages.parse(segment), None));
    plan.push((stages.update_db(segment), None));
    plan.push((stages.invert_links(segment), None));
    plan.push((stages.dedup(), None));
    if config.index {
        plan.push((stages.index(segment), None));
        plan.push((stages.clean(), None));
    }
    plan.push((stages.update_hostdb(), Some(IF_CRAWLDB)));
    plan
}

/// Handles the main crawl operation, returning the process exit code
async fn handle_crawl(resolved: &ResolvedRun) -> Result<i32, CycleError> {
    let config = &resolved.config;
    let runner = EngineRunner::new(&config.engine.launcher);

    tracing::info!(
        "Crawling {} with {} in {} mode",
        config.crawl_root.display(),
        runner.launcher().display(),
        resolved.mode
    );

    let mut scheduler = RoundScheduler::new(config, &runner, resolved.fs.as_ref());
    let termination = scheduler.run().await?;

    tracing::info!(
        "Crawl finished ({}) after {} round(s)",
        termination,
        scheduler.state().history().len()
    );
    Ok(termination.exit_code())
}

/// Maps an exit code onto the process exit status
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
