//! Round state definitions for tracking scheduler progress
use chrono::{DateTime, Utc};
use std::fmt;

/// The pipeline step the scheduler is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundPhase {
    // ===== One-time setup =====
    /// Injecting seed URLs into the crawl database
    Injecting,

    /// Processing the configured sitemap lists
    SitemapBootstrap,

    // ===== Per-round pipeline =====
    /// Checking the stop sentinel and round limit
    RoundStart,

    /// Refreshing the host database from the crawl database
    HostDbRefresh,

    /// Discovering sitemaps from hosts in the host database
    SitemapRefresh,

    Generating,
    Fetching,
    Parsing,
    UpdatingCrawlDb,
    InvertingLinks,
    Deduping,
    Indexing,
    Cleaning,

    /// Sleeping before retrying generate
    Waiting,

    // ===== Terminal =====
    Terminated,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Injecting => "injecting",
            Self::SitemapBootstrap => "sitemap_bootstrap",
            Self::RoundStart => "round_start",
            Self::HostDbRefresh => "hostdb_refresh",
            Self::SitemapRefresh => "sitemap_refresh",
            Self::Generating => "generating",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::UpdatingCrawlDb => "updating_crawldb",
            Self::InvertingLinks => "inverting_links",
            Self::Deduping => "deduping",
            Self::Indexing => "indexing",
            Self::Cleaning => "cleaning",
            Self::Waiting => "waiting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the scheduler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The stop sentinel file was found at a round boundary
    StopRequested,

    /// The configured number of rounds has been completed
    RoundLimitReached,

    /// Generate found nothing to fetch and no wait is configured
    NoMoreUrls,
}

impl Termination {
    /// All terminations are graceful
    pub fn exit_code(&self) -> i32 {
        0
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopRequested => f.write_str("stop file found"),
            Self::RoundLimitReached => f.write_str("round limit reached"),
            Self::NoMoreUrls => f.write_str("no URLs to fetch"),
        }
    }
}

/// Record of one completed round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub round: u32,
    pub segment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoundSummary {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Mutable state owned by the round scheduler
///
/// The round index only moves forward, and only after a round has run to
/// completion; a generate retry keeps the current index.
#[derive(Debug, Clone)]
pub struct RoundState {
    round: u32,
    segment: Option<String>,
    phase: RoundPhase,
    started_at: Option<DateTime<Utc>>,
    history: Vec<RoundSummary>,
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            round: 1,
            segment: None,
            phase: RoundPhase::Injecting,
            started_at: None,
            history: Vec::new(),
        }
    }

    /// The current round, starting at 1
    pub fn round(&self) -> u32 {
        self.round
    }

    /// The segment selected in the current round, if any
    pub fn segment(&self) -> Option<&str> {
        self.segment.as_deref()
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Completed rounds, oldest first
    pub fn history(&self) -> &[RoundSummary] {
        &self.history
    }

    pub fn enter(&mut self, phase: RoundPhase) {
        tracing::trace!("Round {}: {} -> {}", self.round, self.phase, phase);
        self.phase = phase;
    }

    /// Marks the start of an attempt at the current round
    pub fn begin_round(&mut self) {
        self.segment = None;
        self.started_at.get_or_insert_with(Utc::now);
        self.enter(RoundPhase::RoundStart);
    }

    pub fn select_segment(&mut self, segment: String) {
        self.segment = Some(segment);
    }

    /// Records the current round as complete and moves to the next one
    pub fn complete_round(&mut self) -> &RoundSummary {
        let finished_at = Utc::now();
        let summary = RoundSummary {
            round: self.round,
            segment: self.segment.take().unwrap_or_default(),
            started_at: self.started_at.take().unwrap_or(finished_at),
            finished_at,
        };
        self.history.push(summary);
        self.round += 1;
        &self.history[self.history.len() - 1]
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}
