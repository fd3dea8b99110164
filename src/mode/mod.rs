//! Execution mode handling
//!
//! A run either works against the local filesystem or against a distributed
//! one. The choice is made once by [`ModeResolver`] and everything that
//! depends on it goes through the [`CrawlFs`] strategy it hands out.

mod fs;
mod resolver;

pub use fs::{is_segment_name, latest_segment_from_listing, CrawlFs, DistributedFs, LocalFs};
pub use resolver::{locate_executable, ModeResolver, ResolvedRun, JOB_ARTIFACT_SUFFIX};

use std::fmt;

/// Where the crawl engine runs its jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Jobs run in-process on the local filesystem
    Local,

    /// Jobs are submitted to a cluster and read from a distributed filesystem
    Distributed,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
