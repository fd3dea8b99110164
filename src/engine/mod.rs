//! Crawl engine invocation
//!
//! This module contains everything needed to call the external crawl
//! engine:
//! - `Invocation`: one subcommand with its arguments
//! - `CommandRunner`: the seam the round scheduler runs stages through
//! - `EngineRunner`: the runner that spawns the real launcher
//! - `StageBuilder`: argument lists for every pipeline stage

mod runner;
mod stages;

pub use runner::{exit_code, CommandRunner, EngineRunner};
pub use stages::{CrawlLayout, StageBuilder};

use std::fmt;

/// One engine subcommand and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub subcommand: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            subcommand: subcommand.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns true if `flag` appears among the arguments
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subcommand)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
