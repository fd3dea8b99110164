use crate::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default number of engine slaves (fetchers) per generate call
pub const DEFAULT_NUM_SLAVES: u32 = 1;

/// Default number of reduce tasks passed to every distributed job
pub const DEFAULT_NUM_TASKS: u32 = 2;

/// Default number of URLs selected per generate call
pub const DEFAULT_SIZE_FETCHLIST: u64 = 50_000;

/// Default fetch time limit per round, in minutes
pub const DEFAULT_TIME_LIMIT_FETCH: i64 = 180;

/// Default number of fetcher and sitemap threads
pub const DEFAULT_NUM_THREADS: u32 = 50;

/// Default name of the distributed filesystem client binary
pub const DEFAULT_FS_CLIENT: &str = "hadoop";

/// Default launcher location relative to the engine home
pub const DEFAULT_LAUNCHER: &str = "bin/crawl-engine";

/// When sitemaps are discovered from hosts in the host database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SitemapPolicy {
    /// Never process sitemaps from the host database
    #[default]
    Never,

    /// Process sitemaps from the host database at the start of every round
    Always,

    /// Process sitemaps from the host database in the first round only
    Once,
}

impl SitemapPolicy {
    /// Returns true if sitemap-from-hostdb processing runs in the given round
    pub fn applies_to_round(self, round: u32) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Once => round == 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::Once => "once",
        }
    }
}

impl FromStr for SitemapPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "once" => Ok(Self::Once),
            other => Err(ConfigError::Validation(format!(
                "sitemaps-from-hostdb must be one of never, always, once; got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SitemapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping used by the dedup stage when picking duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupGroup {
    /// Deduplicate across the whole crawl database
    #[default]
    None,

    /// Only treat documents on the same host as duplicates
    Host,

    /// Only treat documents on the same domain as duplicates
    Domain,
}

impl DedupGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Host => "host",
            Self::Domain => "domain",
        }
    }
}

impl FromStr for DedupGroup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "host" => Ok(Self::Host),
            "domain" => Ok(Self::Domain),
            other => Err(ConfigError::Validation(format!(
                "dedup-group must be one of none, host, domain; got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DedupGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of the crawl engine installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Installation directory, searched for the packaged job artifact
    pub home: PathBuf,

    /// Executable invoked as `<launcher> <subcommand> <args...>`
    pub launcher: PathBuf,

    /// Distributed filesystem client, a bare name or a path
    pub fs_client: String,
}

impl EngineConfig {
    /// File name of the launcher, used to recognise the job artifact
    pub fn launcher_name(&self) -> &str {
        self.launcher
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("")
    }
}

/// Validated, immutable configuration for one orchestrator run
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlConfig {
    /// Root directory holding crawldb, hostdb, linkdb and segments
    pub crawl_root: PathBuf,

    /// Maximum number of rounds, `None` for unbounded
    pub rounds: Option<u32>,

    /// Whether each round ends with index and clean stages
    pub index: bool,

    /// Extra engine properties (`key=value`) passed to index and clean
    pub properties: Vec<String>,

    /// Seconds to wait before retrying generate when no URLs are due
    pub wait: Option<u64>,

    /// Directory of seed URL lists, injected once before the first round
    pub seed_dir: Option<PathBuf>,

    /// Directory of sitemap URL lists, processed once before the first round
    pub sitemap_dir: Option<PathBuf>,

    pub num_slaves: u32,
    pub num_tasks: u32,
    pub size_fetchlist: u64,

    /// Fetch time limit in minutes, -1 for no limit
    pub time_limit_fetch: i64,

    pub num_threads: u32,
    pub sitemaps_from_hostdb: SitemapPolicy,
    pub dedup_group: DedupGroup,
    pub engine: EngineConfig,
}

impl CrawlConfig {
    /// Returns a configuration with the given crawl root and all defaults
    ///
    /// Mostly useful when embedding the scheduler; the CLI goes through
    /// [`crate::config::resolve_config`] instead.
    pub fn with_defaults(crawl_root: impl Into<PathBuf>, engine_home: &Path) -> Self {
        Self {
            crawl_root: crawl_root.into(),
            rounds: None,
            index: false,
            properties: Vec::new(),
            wait: None,
            seed_dir: None,
            sitemap_dir: None,
            num_slaves: DEFAULT_NUM_SLAVES,
            num_tasks: DEFAULT_NUM_TASKS,
            size_fetchlist: DEFAULT_SIZE_FETCHLIST,
            time_limit_fetch: DEFAULT_TIME_LIMIT_FETCH,
            num_threads: DEFAULT_NUM_THREADS,
            sitemaps_from_hostdb: SitemapPolicy::Never,
            dedup_group: DedupGroup::None,
            engine: EngineConfig {
                home: engine_home.to_path_buf(),
                launcher: engine_home.join(DEFAULT_LAUNCHER),
                fs_client: DEFAULT_FS_CLIENT.to_string(),
            },
        }
    }
}

/// Unvalidated configuration as read from the TOML file or the command line
///
/// Every field is optional so that a file layer and a CLI layer can be
/// merged before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConfig {
    pub crawl_root: Option<PathBuf>,
    pub rounds: Option<i64>,
    pub index: Option<bool>,
    pub properties: Option<Vec<String>>,
    pub wait: Option<String>,
    pub seed_dir: Option<PathBuf>,
    pub sitemap_dir: Option<PathBuf>,
    pub num_slaves: Option<u32>,
    pub num_tasks: Option<u32>,
    pub size_fetchlist: Option<u64>,
    pub time_limit_fetch: Option<i64>,
    pub num_threads: Option<u32>,
    pub sitemaps_from_hostdb: Option<String>,
    pub dedup_group: Option<String>,
    pub engine_home: Option<PathBuf>,
    pub launcher: Option<PathBuf>,
    pub fs_client: Option<String>,
}

impl RawConfig {
    /// Fills every unset field of `self` from `fallback`
    ///
    /// `self` wins wherever both layers set a value.
    pub fn merge(self, fallback: RawConfig) -> RawConfig {
        RawConfig {
            crawl_root: self.crawl_root.or(fallback.crawl_root),
            rounds: self.rounds.or(fallback.rounds),
            index: self.index.or(fallback.index),
            properties: self.properties.or(fallback.properties),
            wait: self.wait.or(fallback.wait),
            seed_dir: self.seed_dir.or(fallback.seed_dir),
            sitemap_dir: self.sitemap_dir.or(fallback.sitemap_dir),
            num_slaves: self.num_slaves.or(fallback.num_slaves),
            num_tasks: self.num_tasks.or(fallback.num_tasks),
            size_fetchlist: self.size_fetchlist.or(fallback.size_fetchlist),
            time_limit_fetch: self.time_limit_fetch.or(fallback.time_limit_fetch),
            num_threads: self.num_threads.or(fallback.num_threads),
            sitemaps_from_hostdb: self.sitemaps_from_hostdb.or(fallback.sitemaps_from_hostdb),
            dedup_group: self.dedup_group.or(fallback.dedup_group),
            engine_home: self.engine_home.or(fallback.engine_home),
            launcher: self.launcher.or(fallback.launcher),
            fs_client: self.fs_client.or(fallback.fs_client),
        }
    }
}
