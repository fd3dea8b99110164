//! Sumi-Cycle: a round scheduler for batch web crawls
//!
//! This crate drives an external crawl engine through repeated rounds of
//! generate, fetch, parse, update, link inversion, dedup and optional
//! indexing. The engine's subcommands are opaque; this crate only decides
//! what runs next, where it runs, and when to stop.

pub mod config;
pub mod engine;
pub mod mode;
pub mod rounds;

use thiserror::Error;

/// Exit code used for configuration and usage errors
pub const USAGE_EXIT_CODE: i32 = 2;

/// Exit code used when an external program cannot be started at all
pub const SPAWN_EXIT_CODE: i32 = 127;

/// Main error type for Sumi-Cycle operations
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command `{command}` failed with exit code {code}")]
    StageFailed { command: String, code: i32 },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Filesystem client command `{command}` failed with exit code {code}")]
    FsClient { command: String, code: i32 },

    #[error("No segment found under {root} after generate succeeded")]
    MissingSegment { root: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CycleError {
    /// Returns the process exit code this error terminates the run with
    ///
    /// A failed stage propagates the stage's own exit code unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StageFailed { code, .. } => *code,
            Self::Config(_) => USAGE_EXIT_CODE,
            Self::Spawn { .. } => SPAWN_EXIT_CODE,
            Self::FsClient { .. } | Self::MissingSegment { .. } | Self::Io(_) => 1,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Distributed mode requires the `{0}` command, which could not be found")]
    MissingClient(String),
}

/// Result type alias for Sumi-Cycle operations
pub type Result<T> = std::result::Result<T, CycleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::CrawlConfig;
pub use mode::ExecutionMode;
pub use rounds::{RoundScheduler, Termination};
