//! Round scheduler - the crawl pipeline's main control loop
//!
//! This module sequences the engine stages of every round:
//! - One-time seed injection and sitemap processing
//! - Stop sentinel and round limit checks at each round boundary
//! - Optional sitemap discovery from the host database
//! - generate → fetch → parse → updatedb → invertlinks → dedup → index/clean
//! - Backoff and retry when generate finds nothing to fetch

use crate::config::CrawlConfig;
use crate::engine::{CommandRunner, Invocation, StageBuilder};
use crate::mode::CrawlFs;
use crate::rounds::state::{RoundPhase, RoundState, Termination};
use crate::CycleError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the stop sentinel, looked up in the working directory
pub const STOP_FILE: &str = ".STOP";

/// Exit code generate uses to report that no segment could be created
pub const GENERATE_NO_URLS: i32 = 1;

/// Outcome of a generate call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generated {
    Segment,
    NoUrls,
}

/// Drives the crawl engine through repeated rounds
///
/// Stages run strictly one after another. A stage failure ends the run
/// with [`CycleError::StageFailed`]; the scheduler never retries a stage
/// itself, except for generate when it reports that nothing is due.
pub struct RoundScheduler<'a> {
    config: &'a CrawlConfig,
    runner: &'a dyn CommandRunner,
    fs: &'a dyn CrawlFs,
    stages: StageBuilder<'a>,
    stop_file: PathBuf,
    state: RoundState,
}

impl<'a> RoundScheduler<'a> {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - The resolved run configuration
    /// * `runner` - Runner used for every engine subcommand
    /// * `fs` - Filesystem strategy for the resolved execution mode
    pub fn new(
        config: &'a CrawlConfig,
        runner: &'a dyn CommandRunner,
        fs: &'a dyn CrawlFs,
    ) -> Self {
        Self {
            config,
            runner,
            fs,
            stages: StageBuilder::new(config),
            stop_file: PathBuf::from(STOP_FILE),
            state: RoundState::new(),
        }
    }

    /// Uses a different stop sentinel path
    pub fn with_stop_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stop_file = path.into();
        self
    }

    pub fn stop_file(&self) -> &Path {
        &self.stop_file
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Runs setup and then rounds until a termination condition is met
    ///
    /// # Returns
    ///
    /// * `Ok(Termination)` - The run ended gracefully
    /// * `Err(CycleError)` - A stage failed or the filesystem could not be queried
    pub async fn run(&mut self) -> Result<Termination, CycleError> {
        self.bootstrap().await?;

        loop {
            self.state.begin_round();

            if let Some(termination) = self.check_termination() {
                self.state.enter(RoundPhase::Terminated);
                tracing::info!(
                    "Stopping after {} round(s): {}",
                    self.state.history().len(),
                    termination
                );
                return Ok(termination);
            }

            tracing::info!(
                "{}: Iteration {} of {}",
                chrono::Local::now().format("%c"),
                self.state.round(),
                self.limit_label()
            );

            if self
                .config
                .sitemaps_from_hostdb
                .applies_to_round(self.state.round())
            {
                self.refresh_sitemaps_from_hostdb().await?;
            }

            match self.generate().await? {
                Generated::Segment => {}
                Generated::NoUrls => match self.config.wait {
                    Some(seconds) => {
                        self.state.enter(RoundPhase::Waiting);
                        tracing::warn!(
                            "Generate returned 1 (no new segments created). Waiting for {} seconds then trying again",
                            seconds
                        );
                        tokio::time::sleep(Duration::from_secs(seconds)).await;
                        continue;
                    }
                    None => {
                        self.state.enter(RoundPhase::Terminated);
                        tracing::info!(
                            "Generate returned 1 (no new segments created). Escaping loop: no more URLs to fetch now"
                        );
                        return Ok(Termination::NoMoreUrls);
                    }
                },
            }

            let segment = self.select_segment().await?;
            self.process_segment(&segment).await?;

            self.update_hostdb().await?;

            let summary = self.state.complete_round();
            tracing::info!(
                "Round {} finished: segment {} in {}s",
                summary.round,
                summary.segment,
                summary.duration().num_seconds()
            );
        }
    }

    /// Runs seed injection and sitemap processing once, before the first round
    async fn bootstrap(&mut self) -> Result<(), CycleError> {
        let config = self.config;

        if let Some(seed_dir) = &config.seed_dir {
            self.state.enter(RoundPhase::Injecting);
            tracing::info!("Injecting seed URLs");
            self.run_stage(self.stages.inject(seed_dir)).await?;
        }

        if let Some(sitemap_dir) = &config.sitemap_dir {
            self.state.enter(RoundPhase::SitemapBootstrap);
            tracing::info!("Processing sitemaps");
            self.run_stage(self.stages.sitemap(sitemap_dir)).await?;
        }

        Ok(())
    }

    /// Returns the reason to stop at the current round boundary, if any
    fn check_termination(&self) -> Option<Termination> {
        if self.stop_file.exists() {
            tracing::info!("{} file found - escaping loop", self.stop_file.display());
            return Some(Termination::StopRequested);
        }

        match self.config.rounds {
            Some(limit) if self.state.round() > limit => Some(Termination::RoundLimitReached),
            _ => None,
        }
    }

    fn limit_label(&self) -> String {
        match self.config.rounds {
            Some(limit) => limit.to_string(),
            None => "unbounded".to_string(),
        }
    }

    /// Bootstraps the host database in round 1, then discovers sitemaps from it
    async fn refresh_sitemaps_from_hostdb(&mut self) -> Result<(), CycleError> {
        if self.state.round() == 1 {
            self.update_hostdb().await?;
        }

        let hostdb = self.stages.layout().hostdb();
        if self.fs.dir_exists(&hostdb).await? {
            self.state.enter(RoundPhase::SitemapRefresh);
            tracing::info!("Processing sitemaps based on hosts in HostDB");
            self.run_stage(self.stages.sitemap_from_hostdb()).await?;
        }

        Ok(())
    }

    /// Refreshes the host database, a no-op until the crawl database exists
    async fn update_hostdb(&mut self) -> Result<(), CycleError> {
        let crawldb = self.stages.layout().crawldb();
        if !self.fs.dir_exists(&crawldb).await? {
            tracing::debug!(
                "No crawl database at {} yet, skipping HostDB update",
                crawldb.display()
            );
            return Ok(());
        }

        self.state.enter(RoundPhase::HostDbRefresh);
        tracing::info!("Updating HostDB");
        self.run_stage(self.stages.update_hostdb()).await
    }

    async fn generate(&mut self) -> Result<Generated, CycleError> {
        self.state.enter(RoundPhase::Generating);
        tracing::info!("Generating a new segment");

        let invocation = self.stages.generate();
        match self.runner.run(&invocation).await? {
            0 => Ok(Generated::Segment),
            GENERATE_NO_URLS => Ok(Generated::NoUrls),
            code => {
                tracing::error!("Error running: {} (exit code {})", invocation, code);
                Err(CycleError::StageFailed {
                    command: invocation.to_string(),
                    code,
                })
            }
        }
    }

    async fn select_segment(&mut self) -> Result<String, CycleError> {
        let segments = self.stages.layout().segments();
        let segment = self
            .fs
            .latest_segment(&segments)
            .await?
            .ok_or_else(|| CycleError::MissingSegment {
                root: segments.display().to_string(),
            })?;

        tracing::info!("Operating on segment: {}", segment);
        self.state.select_segment(segment.clone());
        Ok(segment)
    }

    /// Runs every per-segment stage for the current round
    async fn process_segment(&mut self, segment: &str) -> Result<(), CycleError> {
        self.state.enter(RoundPhase::Fetching);
        tracing::info!("Fetching: {}", segment);
        self.run_stage(self.stages.fetch(segment)).await?;

        self.state.enter(RoundPhase::Parsing);
        tracing::info!("Parsing: {}", segment);
        self.run_stage(self.stages.parse(segment)).await?;

        self.state.enter(RoundPhase::UpdatingCrawlDb);
        tracing::info!("CrawlDB update");
        self.run_stage(self.stages.update_db(segment)).await?;

        self.state.enter(RoundPhase::InvertingLinks);
        tracing::info!("Link inversion");
        self.run_stage(self.stages.invert_links(segment)).await?;

        self.state.enter(RoundPhase::Deduping);
        tracing::info!("Dedup on crawldb");
        self.run_stage(self.stages.dedup()).await?;

        if self.config.index {
            self.state.enter(RoundPhase::Indexing);
            tracing::info!("Indexing {} to index", segment);
            self.run_stage(self.stages.index(segment)).await?;

            self.state.enter(RoundPhase::Cleaning);
            tracing::info!("Cleaning up index if possible");
            self.run_stage(self.stages.clean()).await?;
        } else {
            tracing::info!("Skipping indexing ...");
        }

        Ok(())
    }

    async fn run_stage(&self, invocation: Invocation) -> Result<(), CycleError> {
        self.runner.run_checked(&invocation).await
    }
}
