//! Execution mode detection
//!
//! The engine home holds a packaged job artifact (`<launcher>*.job`) only
//! when the engine was built for cluster deployment. Its presence switches
//! the whole run to distributed mode.

use crate::config::CrawlConfig;
use crate::mode::{CrawlFs, DistributedFs, ExecutionMode, LocalFs};
use crate::ConfigError;
use std::path::{Path, PathBuf};

/// File name suffix of the packaged distributed job artifact
pub const JOB_ARTIFACT_SUFFIX: &str = ".job";

/// Everything that depends on the execution mode, resolved once per run
pub struct ResolvedRun {
    pub mode: ExecutionMode,

    /// The configuration with mode-specific overrides applied
    pub config: CrawlConfig,

    /// Filesystem strategy for the resolved mode
    pub fs: Box<dyn CrawlFs>,
}

impl std::fmt::Debug for ResolvedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRun")
            .field("mode", &self.mode)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Decides between local and distributed execution
pub struct ModeResolver<'a> {
    home: &'a Path,
    launcher_name: &'a str,
}

impl<'a> ModeResolver<'a> {
    pub fn new(home: &'a Path, launcher_name: &'a str) -> Self {
        Self {
            home,
            launcher_name,
        }
    }

    /// Returns the mode implied by the contents of the engine home
    ///
    /// An unreadable or missing home means local mode.
    pub fn detect(&self) -> ExecutionMode {
        let entries = match std::fs::read_dir(self.home) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot read engine home {}: {}", self.home.display(), e);
                return ExecutionMode::Local;
            }
        };

        let found = entries.filter_map(|entry| entry.ok()).any(|entry| {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name();
            let name = name.to_string_lossy();
            is_file && self.is_job_artifact(&name)
        });

        if found {
            ExecutionMode::Distributed
        } else {
            ExecutionMode::Local
        }
    }

    fn is_job_artifact(&self, file_name: &str) -> bool {
        file_name.ends_with(JOB_ARTIFACT_SUFFIX) && file_name.contains(self.launcher_name)
    }

    /// Resolves the mode for `config` and applies its consequences
    ///
    /// Local mode forces a single slave since there are no separate worker
    /// processes. Distributed mode requires the filesystem client, which is
    /// located here so that a missing client fails the run before any stage
    /// executes.
    pub fn resolve(config: CrawlConfig) -> Result<ResolvedRun, ConfigError> {
        let mode = ModeResolver::new(&config.engine.home, config.engine.launcher_name()).detect();
        let mut config = config;

        let fs: Box<dyn CrawlFs> = match mode {
            ExecutionMode::Local => {
                if config.num_slaves != 1 {
                    tracing::warn!(
                        "Local mode: ignoring num-slaves={} and using 1",
                        config.num_slaves
                    );
                    config.num_slaves = 1;
                }
                Box::new(LocalFs)
            }
            ExecutionMode::Distributed => {
                let client = locate_executable(&config.engine.fs_client)
                    .ok_or_else(|| ConfigError::MissingClient(config.engine.fs_client.clone()))?;
                tracing::debug!("Using filesystem client {}", client.display());
                Box::new(DistributedFs::new(client))
            }
        };

        tracing::info!("Execution mode: {}", mode);
        Ok(ResolvedRun { mode, config, fs })
    }
}

/// Finds an executable by path or by searching `PATH`
///
/// Names containing a path separator are checked as given.
pub fn locate_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
