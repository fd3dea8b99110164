//! Running engine subcommands as child processes

use crate::engine::Invocation;
use crate::CycleError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;

/// Runs engine subcommands one at a time
///
/// `run` reports the raw exit code so that call sites which expect a
/// particular non-zero code (generate's "nothing to fetch") can inspect it.
/// Everything else goes through `run_checked`, which turns any non-zero
/// code into a fatal [`CycleError::StageFailed`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the invocation to completion and returns its exit code
    async fn run(&self, invocation: &Invocation) -> Result<i32, CycleError>;

    /// Runs the invocation and fails on any non-zero exit code
    async fn run_checked(&self, invocation: &Invocation) -> Result<(), CycleError> {
        let code = self.run(invocation).await?;
        if code != 0 {
            tracing::error!("Error running: {} (exit code {})", invocation, code);
            return Err(CycleError::StageFailed {
                command: invocation.to_string(),
                code,
            });
        }
        Ok(())
    }
}

/// Runner that spawns the crawl engine launcher
///
/// The child inherits stdin, stdout and stderr, so engine output goes
/// straight to the operator's terminal or log.
#[derive(Debug, Clone)]
pub struct EngineRunner {
    launcher: PathBuf,
}

impl EngineRunner {
    pub fn new(launcher: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
        }
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }
}

#[async_trait]
impl CommandRunner for EngineRunner {
    async fn run(&self, invocation: &Invocation) -> Result<i32, CycleError> {
        tracing::info!("{} {}", self.launcher.display(), invocation);

        let status = Command::new(&self.launcher)
            .arg(&invocation.subcommand)
            .args(&invocation.args)
            .status()
            .await
            .map_err(|source| CycleError::Spawn {
                program: self.launcher.display().to_string(),
                source,
            })?;

        let code = exit_code(status);
        tracing::debug!("{} finished with exit code {}", invocation.subcommand, code);
        Ok(code)
    }
}

/// Converts a child exit status into a shell-style exit code
///
/// A child terminated by a signal reports `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
