//! Argument lists for the pipeline stages
//!
//! Every stage is an engine subcommand addressed by paths under the crawl
//! root. This module is the only place that knows which flags each stage
//! takes.

use crate::config::{CrawlConfig, DedupGroup};
use crate::engine::Invocation;
use std::path::{Path, PathBuf};

/// Directory layout under the crawl root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlLayout {
    root: PathBuf,
}

impl CrawlLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn crawldb(&self) -> PathBuf {
        self.root.join("crawldb")
    }

    pub fn hostdb(&self) -> PathBuf {
        self.root.join("hostdb")
    }

    pub fn linkdb(&self) -> PathBuf {
        self.root.join("linkdb")
    }

    pub fn segments(&self) -> PathBuf {
        self.root.join("segments")
    }

    pub fn segment(&self, id: &str) -> PathBuf {
        self.segments().join(id)
    }
}

/// Builds stage invocations from the run configuration
pub struct StageBuilder<'a> {
    config: &'a CrawlConfig,
    layout: CrawlLayout,
}

impl<'a> StageBuilder<'a> {
    pub fn new(config: &'a CrawlConfig) -> Self {
        Self {
            config,
            layout: CrawlLayout::new(&config.crawl_root),
        }
    }

    pub fn layout(&self) -> &CrawlLayout {
        &self.layout
    }

    /// Options shared by every distributed job in a round
    pub fn common_options(&self) -> Vec<String> {
        let mut options = Vec::with_capacity(8);
        for property in [
            format!("mapreduce.job.reduces={}", self.config.num_tasks),
            "mapreduce.reduce.speculative=false".to_string(),
            "mapreduce.map.speculative=false".to_string(),
            "mapreduce.map.output.compress=true".to_string(),
        ] {
            options.push("-D".to_string());
            options.push(property);
        }
        options
    }

    /// User supplied engine properties as `-D key=value` pairs
    pub fn property_options(&self) -> Vec<String> {
        self.config
            .properties
            .iter()
            .flat_map(|p| ["-D".to_string(), p.clone()])
            .collect()
    }

    pub fn inject(&self, seed_dir: &Path) -> Invocation {
        Invocation::new("inject")
            .arg(display(&self.layout.crawldb()))
            .arg(display(seed_dir))
    }

    pub fn sitemap(&self, sitemap_dir: &Path) -> Invocation {
        Invocation::new("sitemap")
            .arg(display(&self.layout.crawldb()))
            .arg("-sitemapUrls")
            .arg(display(sitemap_dir))
            .arg("-threads")
            .arg(self.config.num_threads.to_string())
    }

    pub fn update_hostdb(&self) -> Invocation {
        Invocation::new("updatehostdb")
            .arg("-crawldb")
            .arg(display(&self.layout.crawldb()))
            .arg("-hostdb")
            .arg(display(&self.layout.hostdb()))
    }

    pub fn sitemap_from_hostdb(&self) -> Invocation {
        Invocation::new("sitemap")
            .arg(display(&self.layout.crawldb()))
            .arg("-hostdb")
            .arg(display(&self.layout.hostdb()))
            .arg("-threads")
            .arg(self.config.num_threads.to_string())
    }

    pub fn generate(&self) -> Invocation {
        Invocation::new("generate")
            .args(self.common_options())
            .arg(display(&self.layout.crawldb()))
            .arg(display(&self.layout.segments()))
            .arg("-topN")
            .arg(self.config.size_fetchlist.to_string())
            .arg("-numFetchers")
            .arg(self.config.num_slaves.to_string())
            .arg("-noFilter")
    }

    pub fn fetch(&self, segment: &str) -> Invocation {
        Invocation::new("fetch")
            .args(self.common_options())
            .arg("-D")
            .arg(format!("fetcher.timelimit.mins={}", self.config.time_limit_fetch))
            .arg(display(&self.layout.segment(segment)))
            .arg("-noParsing")
            .arg("-threads")
            .arg(self.config.num_threads.to_string())
    }

    /// Parse tolerates malformed records: the engine may skip a bad record
    /// after two failed task attempts instead of failing the stage.
    pub fn parse(&self, segment: &str) -> Invocation {
        Invocation::new("parse")
            .args(self.common_options())
            .args([
                "-D",
                "mapreduce.task.skip.start.attempts=2",
                "-D",
                "mapreduce.map.skip.maxrecords=1",
            ])
            .arg(display(&self.layout.segment(segment)))
    }

    pub fn update_db(&self, segment: &str) -> Invocation {
        Invocation::new("updatedb")
            .args(self.common_options())
            .arg(display(&self.layout.crawldb()))
            .arg(display(&self.layout.segment(segment)))
    }

    pub fn invert_links(&self, segment: &str) -> Invocation {
        Invocation::new("invertlinks")
            .args(self.common_options())
            .arg(display(&self.layout.linkdb()))
            .arg(display(&self.layout.segment(segment)))
    }

    pub fn dedup(&self) -> Invocation {
        let invocation = Invocation::new("dedup")
            .args(self.common_options())
            .arg(display(&self.layout.crawldb()));

        match self.config.dedup_group {
            DedupGroup::None => invocation,
            group => invocation.arg("-group").arg(group.as_str()),
        }
    }

    pub fn index(&self, segment: &str) -> Invocation {
        Invocation::new("index")
            .args(self.property_options())
            .arg(display(&self.layout.crawldb()))
            .arg("-linkdb")
            .arg(display(&self.layout.linkdb()))
            .arg(display(&self.layout.segment(segment)))
    }

    pub fn clean(&self) -> Invocation {
        Invocation::new("clean")
            .args(self.property_options())
            .arg(display(&self.layout.crawldb()))
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
