//! Mode-specific directory checks and segment listing

use crate::engine::exit_code;
use crate::mode::ExecutionMode;
use crate::CycleError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Filesystem operations whose implementation depends on the execution mode
#[async_trait]
pub trait CrawlFs: Send + Sync {
    /// The mode this strategy serves
    fn mode(&self) -> ExecutionMode;

    /// Returns true if `path` exists and is a directory
    async fn dir_exists(&self, path: &Path) -> Result<bool, CycleError>;

    /// Returns the most recent segment name under `segments_root`
    ///
    /// Segment names are timestamps, so the lexicographic maximum is the
    /// newest one. Returns `None` when there are no segments.
    async fn latest_segment(&self, segments_root: &Path) -> Result<Option<String>, CycleError>;
}

/// Local filesystem strategy
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

#[async_trait]
impl CrawlFs for LocalFs {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Local
    }

    async fn dir_exists(&self, path: &Path) -> Result<bool, CycleError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn latest_segment(&self, segments_root: &Path) -> Result<Option<String>, CycleError> {
        let mut entries = match tokio::fs::read_dir(segments_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if latest.as_ref().map_or(true, |current| name > *current) {
                latest = Some(name);
            }
        }

        Ok(latest)
    }
}

/// Distributed filesystem strategy, backed by the filesystem client binary
#[derive(Debug, Clone)]
pub struct DistributedFs {
    client: PathBuf,
}

impl DistributedFs {
    pub fn new(client: impl Into<PathBuf>) -> Self {
        Self {
            client: client.into(),
        }
    }

    fn command(&self, args: &[&str], path: &Path) -> Command {
        let mut command = Command::new(&self.client);
        command.arg("fs").args(args).arg(path);
        command
    }

    fn describe(&self, args: &[&str], path: &Path) -> String {
        format!(
            "{} fs {} {}",
            self.client.display(),
            args.join(" "),
            path.display()
        )
    }

    fn spawn_error(&self, source: std::io::Error) -> CycleError {
        CycleError::Spawn {
            program: self.client.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl CrawlFs for DistributedFs {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Distributed
    }

    async fn dir_exists(&self, path: &Path) -> Result<bool, CycleError> {
        tracing::debug!("{}", self.describe(&["-test", "-d"], path));

        let status = self
            .command(&["-test", "-d"], path)
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        Ok(status.success())
    }

    async fn latest_segment(&self, segments_root: &Path) -> Result<Option<String>, CycleError> {
        tracing::debug!("{}", self.describe(&["-ls"], segments_root));

        let output = self
            .command(&["-ls"], segments_root)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(CycleError::FsClient {
                command: self.describe(&["-ls"], segments_root),
                code: exit_code(output.status),
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(latest_segment_from_listing(&listing))
    }
}

/// Returns true if a path component looks like a segment name
///
/// Segment names are all-digit timestamps starting with the century, e.g.
/// `20230101000000`.
pub fn is_segment_name(component: &str) -> bool {
    component.len() > 2
        && component.starts_with("20")
        && component.chars().all(|c| c.is_ascii_digit())
}

/// Extracts the newest segment name from a distributed directory listing
///
/// Every line is split on `/` and only components that look like segment
/// names are kept, which drops permissions, owners, dates and any
/// non-segment files in the listing.
pub fn latest_segment_from_listing(listing: &str) -> Option<String> {
    listing
        .lines()
        .flat_map(|line| line.split('/'))
        .map(str::trim)
        .filter(|component| is_segment_name(component))
        .max()
        .map(str::to_string)
}
