//! Configuration module for Sumi-Cycle
//!
//! This module handles loading the optional TOML configuration file, merging
//! it with command-line values, and validating the result into an immutable
//! [`CrawlConfig`].
//!
//! # Example
//!
//! ```no_run
//! use sumi_cycle::config::{load_config, resolve_config};
//! use std::path::Path;
//!
//! let raw = load_config(Path::new("crawl.toml")).unwrap();
//! let config = resolve_config(raw, Path::new("/opt/crawl-engine")).unwrap();
//! println!("Crawl root: {}", config.crawl_root.display());
//! ```

pub mod duration;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CrawlConfig, DedupGroup, EngineConfig, RawConfig, SitemapPolicy};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

// Re-export validation
pub use validation::resolve_config;
