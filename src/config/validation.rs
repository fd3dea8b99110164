use crate::config::duration::to_seconds;
use crate::config::types::{
    CrawlConfig, DedupGroup, EngineConfig, RawConfig, SitemapPolicy, DEFAULT_FS_CLIENT,
    DEFAULT_LAUNCHER, DEFAULT_NUM_SLAVES, DEFAULT_NUM_TASKS, DEFAULT_NUM_THREADS,
    DEFAULT_SIZE_FETCHLIST, DEFAULT_TIME_LIMIT_FETCH,
};
use crate::ConfigError;
use std::path::Path;

/// Applies defaults to a merged configuration and validates it
///
/// # Arguments
///
/// * `raw` - The merged command-line and file configuration
/// * `default_home` - Engine home used when none is configured
///
/// # Returns
///
/// * `Ok(CrawlConfig)` - The immutable configuration for this run
/// * `Err(ConfigError)` - A required value is missing or a value is invalid
pub fn resolve_config(raw: RawConfig, default_home: &Path) -> Result<CrawlConfig, ConfigError> {
    let crawl_root = raw
        .crawl_root
        .ok_or_else(|| ConfigError::Validation("crawl directory is required".to_string()))?;
    if crawl_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "crawl directory cannot be empty".to_string(),
        ));
    }

    let rounds = validate_rounds(
        raw.rounds
            .ok_or_else(|| ConfigError::Validation("number of rounds is required".to_string()))?,
    )?;

    let properties = raw.properties.unwrap_or_default();
    for property in &properties {
        validate_property(property)?;
    }

    let wait = match raw.wait.as_deref() {
        None | Some("-1") => None,
        Some(token) => Some(to_seconds(token)),
    };

    let num_slaves = positive("num-slaves", raw.num_slaves.unwrap_or(DEFAULT_NUM_SLAVES))?;
    let num_tasks = positive("num-tasks", raw.num_tasks.unwrap_or(DEFAULT_NUM_TASKS))?;
    let num_threads = positive("num-threads", raw.num_threads.unwrap_or(DEFAULT_NUM_THREADS))?;

    let size_fetchlist = raw.size_fetchlist.unwrap_or(DEFAULT_SIZE_FETCHLIST);
    if size_fetchlist < 1 {
        return Err(ConfigError::Validation(
            "size-fetchlist must be >= 1, got 0".to_string(),
        ));
    }

    let time_limit_fetch = raw.time_limit_fetch.unwrap_or(DEFAULT_TIME_LIMIT_FETCH);
    if time_limit_fetch != -1 && time_limit_fetch < 1 {
        return Err(ConfigError::Validation(format!(
            "time-limit-fetch must be -1 or >= 1 minutes, got {}",
            time_limit_fetch
        )));
    }

    let sitemaps_from_hostdb = match raw.sitemaps_from_hostdb.as_deref() {
        Some(value) => value.parse::<SitemapPolicy>()?,
        None => SitemapPolicy::default(),
    };

    let dedup_group = match raw.dedup_group.as_deref() {
        Some(value) => value.parse::<DedupGroup>()?,
        None => DedupGroup::default(),
    };

    let home = raw
        .engine_home
        .unwrap_or_else(|| default_home.to_path_buf());
    let launcher = raw
        .launcher
        .unwrap_or_else(|| home.join(DEFAULT_LAUNCHER));
    let fs_client = raw
        .fs_client
        .unwrap_or_else(|| DEFAULT_FS_CLIENT.to_string());
    if fs_client.is_empty() {
        return Err(ConfigError::Validation(
            "fs-client cannot be empty".to_string(),
        ));
    }

    Ok(CrawlConfig {
        crawl_root,
        rounds,
        index: raw.index.unwrap_or(false),
        properties,
        wait,
        seed_dir: raw.seed_dir,
        sitemap_dir: raw.sitemap_dir,
        num_slaves,
        num_tasks,
        size_fetchlist,
        time_limit_fetch,
        num_threads,
        sitemaps_from_hostdb,
        dedup_group,
        engine: EngineConfig {
            home,
            launcher,
            fs_client,
        },
    })
}

/// Validates the round limit, mapping -1 to unbounded
fn validate_rounds(rounds: i64) -> Result<Option<u32>, ConfigError> {
    if rounds == -1 {
        return Ok(None);
    }

    if rounds < 1 {
        return Err(ConfigError::Validation(format!(
            "rounds must be -1 (unbounded) or >= 1, got {}",
            rounds
        )));
    }

    u32::try_from(rounds)
        .map(Some)
        .map_err(|_| ConfigError::Validation(format!("rounds is too large: {}", rounds)))
}

/// Validates an engine property of the form `key=value`
fn validate_property(property: &str) -> Result<(), ConfigError> {
    match property.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "engine property must have the form key=value, got '{}'",
            property
        ))),
    }
}

fn positive(name: &str, value: u32) -> Result<u32, ConfigError> {
    if value < 1 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 1, got {}",
            name, value
        )));
    }
    Ok(value)
}
