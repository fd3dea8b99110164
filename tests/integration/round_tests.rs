//! Integration tests for the round scheduler
//!
//! These tests run the scheduler against a scripted engine that records
//! every invocation and mimics the directories the real engine creates,
//! so the local filesystem strategy sees crawldb, hostdb and segments
//! appear the way they would in a real crawl.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sumi_cycle::config::{CrawlConfig, SitemapPolicy};
use sumi_cycle::engine::{CommandRunner, Invocation};
use sumi_cycle::mode::LocalFs;
use sumi_cycle::rounds::{RoundPhase, RoundScheduler, Termination};
use sumi_cycle::CycleError;
use tempfile::TempDir;

/// Engine stand-in that records invocations and returns scripted exit codes
struct ScriptedEngine {
    root: PathBuf,
    calls: Mutex<Vec<Invocation>>,
    generate_codes: Mutex<VecDeque<i32>>,
    failures: HashMap<&'static str, i32>,
    stop_file_trigger: Option<(&'static str, usize, PathBuf)>,
}

impl ScriptedEngine {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            generate_codes: Mutex::new(VecDeque::new()),
            failures: HashMap::new(),
            stop_file_trigger: None,
        }
    }

    /// Exit codes for successive generate calls; 0 once exhausted
    fn with_generate_codes(self, codes: &[i32]) -> Self {
        *self.generate_codes.lock().unwrap() = codes.iter().copied().collect();
        self
    }

    fn failing(mut self, subcommand: &'static str, code: i32) -> Self {
        self.failures.insert(subcommand, code);
        self
    }

    /// Creates `stop_file` on the `nth` call of `subcommand`
    fn creating_stop_file_on(
        mut self,
        subcommand: &'static str,
        nth: usize,
        stop_file: &Path,
    ) -> Self {
        self.stop_file_trigger = Some((subcommand, nth, stop_file.to_path_buf()));
        self
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn subcommands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.subcommand).collect()
    }

    fn count(&self, subcommand: &str) -> usize {
        self.subcommands().iter().filter(|s| *s == subcommand).count()
    }

    fn segment_name(index: usize) -> String {
        let base = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (base + ChronoDuration::days(index as i64))
            .format("%Y%m%d%H%M%S")
            .to_string()
    }
}

#[async_trait]
impl CommandRunner for ScriptedEngine {
    async fn run(&self, invocation: &Invocation) -> Result<i32, CycleError> {
        let subcommand = invocation.subcommand.as_str();
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some((trigger, nth, stop_file)) = &self.stop_file_trigger {
            if subcommand == *trigger && self.count(subcommand) == *nth {
                std::fs::write(stop_file, "").unwrap();
            }
        }

        if let Some(code) = self.failures.get(subcommand) {
            return Ok(*code);
        }

        match subcommand {
            "inject" | "updatedb" => {
                std::fs::create_dir_all(self.root.join("crawldb")).unwrap();
            }
            "updatehostdb" => {
                std::fs::create_dir_all(self.root.join("hostdb")).unwrap();
            }
            "generate" => {
                let code = self.generate_codes.lock().unwrap().pop_front().unwrap_or(0);
                if code == 0 {
                    let generated = self.count("generate");
                    let segment = Self::segment_name(generated);
                    std::fs::create_dir_all(self.root.join("segments").join(segment)).unwrap();
                }
                return Ok(code);
            }
            _ => {}
        }

        Ok(0)
    }
}

struct Fixture {
    dir: TempDir,
    config: CrawlConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = CrawlConfig::with_defaults(dir.path().join("crawl"), dir.path());
        Self { dir, config }
    }

    fn root(&self) -> PathBuf {
        self.config.crawl_root.clone()
    }

    fn stop_file(&self) -> PathBuf {
        self.dir.path().join(".STOP")
    }
}

async fn run(
    fixture: &Fixture,
    engine: &ScriptedEngine,
) -> (Result<Termination, CycleError>, u32, RoundPhase) {
    let fs = LocalFs;
    let mut scheduler =
        RoundScheduler::new(&fixture.config, engine, &fs).with_stop_file(fixture.stop_file());
    let result = scheduler.run().await;
    let completed = scheduler.state().history().len() as u32;
    (result, completed, scheduler.state().phase())
}

#[tokio::test]
async fn test_round_limit_runs_exact_number_of_rounds() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(3);
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, completed, phase) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::RoundLimitReached);
    assert_eq!(completed, 3);
    assert_eq!(phase, RoundPhase::Terminated);
    assert_eq!(engine.count("generate"), 3);
    assert_eq!(engine.count("fetch"), 3);
    assert_eq!(engine.count("dedup"), 3);
}

#[tokio::test]
async fn test_round_pipeline_order() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    fixture.config.index = true;
    fixture.config.seed_dir = Some(PathBuf::from("urls"));
    fixture.config.sitemap_dir = Some(PathBuf::from("sitemaps"));
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::RoundLimitReached);
    assert_eq!(
        engine.subcommands(),
        vec![
            "inject",
            "sitemap",
            "generate",
            "fetch",
            "parse",
            "updatedb",
            "invertlinks",
            "dedup",
            "index",
            "clean",
            "updatehostdb",
        ]
    );
}

#[tokio::test]
async fn test_segment_is_used_consistently_within_a_round() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(2);
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;
    result.unwrap();

    let segments_root = fixture.root().join("segments");
    let first = segments_root.join(ScriptedEngine::segment_name(1));
    let second = segments_root.join(ScriptedEngine::segment_name(2));
    let first = first.display().to_string();
    let second = second.display().to_string();

    let calls = engine.calls();
    let uses = |segment: &str| {
        calls
            .iter()
            .filter(|c| c.has_arg(segment))
            .map(|c| c.subcommand.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(uses(&first), vec!["fetch", "parse", "updatedb", "invertlinks"]);
    assert_eq!(uses(&second), vec!["fetch", "parse", "updatedb", "invertlinks"]);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_retries_same_round() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    fixture.config.wait = Some(10);
    let engine = ScriptedEngine::new(&fixture.root()).with_generate_codes(&[1, 0]);

    let started = tokio::time::Instant::now();
    let (result, completed, _) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::RoundLimitReached);
    assert!(started.elapsed() >= std::time::Duration::from_secs(10));
    assert_eq!(completed, 1);
    assert_eq!(engine.count("generate"), 2);
    assert_eq!(engine.count("fetch"), 1);
    assert_eq!(engine.count("updatedb"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_file_during_backoff_ends_run() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = None;
    fixture.config.wait = Some(60);
    let stop_file = fixture.stop_file();
    let engine = ScriptedEngine::new(&fixture.root())
        .with_generate_codes(&[1, 1, 1])
        .creating_stop_file_on("generate", 1, &stop_file);

    let (result, completed, phase) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::StopRequested);
    assert_eq!(completed, 0);
    assert_eq!(phase, RoundPhase::Terminated);
    assert_eq!(engine.subcommands(), vec!["generate"]);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_repeats_hostdb_bootstrap_in_round_one() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    fixture.config.wait = Some(5);
    fixture.config.seed_dir = Some(PathBuf::from("urls"));
    fixture.config.sitemaps_from_hostdb = SitemapPolicy::Once;
    let engine = ScriptedEngine::new(&fixture.root()).with_generate_codes(&[1, 0]);

    let (result, completed, _) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::RoundLimitReached);
    assert_eq!(completed, 1);
    assert_eq!(
        engine.subcommands(),
        vec![
            "inject",
            "updatehostdb",
            "sitemap",
            "generate",
            "updatehostdb",
            "sitemap",
            "generate",
            "fetch",
            "parse",
            "updatedb",
            "invertlinks",
            "dedup",
            "updatehostdb",
        ]
    );
}

#[tokio::test]
async fn test_no_urls_without_wait_terminates() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = None;
    let engine = ScriptedEngine::new(&fixture.root()).with_generate_codes(&[1]);

    let (result, completed, phase) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::NoMoreUrls);
    assert_eq!(completed, 0);
    assert_eq!(phase, RoundPhase::Terminated);
    assert_eq!(engine.subcommands(), vec!["generate"]);
}

#[tokio::test]
async fn test_generate_failure_is_fatal() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(2);
    fixture.config.wait = Some(10);
    let engine = ScriptedEngine::new(&fixture.root()).with_generate_codes(&[255]);

    let (result, _, _) = run(&fixture, &engine).await;

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 255);
    assert_eq!(engine.subcommands(), vec!["generate"]);
}

#[tokio::test]
async fn test_stage_failure_stops_everything() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(3);
    fixture.config.index = true;
    let engine = ScriptedEngine::new(&fixture.root()).failing("parse", 42);

    let (result, completed, phase) = run(&fixture, &engine).await;

    match result.unwrap_err() {
        CycleError::StageFailed { command, code } => {
            assert!(command.starts_with("parse "));
            assert_eq!(code, 42);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(completed, 0);
    assert_eq!(phase, RoundPhase::Parsing);
    assert_eq!(engine.subcommands(), vec!["generate", "fetch", "parse"]);
}

#[tokio::test]
async fn test_inject_failure_prevents_rounds() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    fixture.config.seed_dir = Some(PathBuf::from("urls"));
    let engine = ScriptedEngine::new(&fixture.root()).failing("inject", 3);

    let (result, _, _) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap_err().exit_code(), 3);
    assert_eq!(engine.subcommands(), vec!["inject"]);
}

#[tokio::test]
async fn test_stop_file_before_first_round() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(5);
    std::fs::write(fixture.stop_file(), "").unwrap();
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, completed, _) = run(&fixture, &engine).await;

    assert_eq!(result.unwrap(), Termination::StopRequested);
    assert_eq!(completed, 0);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_stop_file_is_checked_at_round_boundary() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = None;
    let stop_file = fixture.stop_file();
    let engine =
        ScriptedEngine::new(&fixture.root()).creating_stop_file_on("dedup", 2, &stop_file);

    let (result, completed, _) = run(&fixture, &engine).await;

    // The round that saw the file appear still runs to completion.
    assert_eq!(result.unwrap(), Termination::StopRequested);
    assert_eq!(completed, 2);
    assert_eq!(engine.count("generate"), 2);
    assert_eq!(engine.count("updatehostdb"), 2);
}

#[tokio::test]
async fn test_indexing_skipped_when_disabled() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(2);
    fixture.config.index = false;
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;
    result.unwrap();

    assert_eq!(engine.count("index"), 0);
    assert_eq!(engine.count("clean"), 0);
}

#[tokio::test]
async fn test_sitemaps_from_hostdb_once() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(3);
    fixture.config.seed_dir = Some(PathBuf::from("urls"));
    fixture.config.sitemaps_from_hostdb = SitemapPolicy::Once;
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;
    result.unwrap();

    let calls = engine.calls();
    let hostdb_sitemaps = calls
        .iter()
        .filter(|c| c.subcommand == "sitemap" && c.has_arg("-hostdb"))
        .count();
    assert_eq!(hostdb_sitemaps, 1);

    // Bootstrap in round 1 plus the end-of-round refresh in every round.
    assert_eq!(engine.count("updatehostdb"), 4);

    let subcommands = engine.subcommands();
    assert_eq!(
        &subcommands[..4],
        &["inject", "updatehostdb", "sitemap", "generate"]
    );
}

#[tokio::test]
async fn test_sitemaps_from_hostdb_always() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(3);
    fixture.config.seed_dir = Some(PathBuf::from("urls"));
    fixture.config.sitemaps_from_hostdb = SitemapPolicy::Always;
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;
    result.unwrap();

    let hostdb_sitemaps = engine
        .calls()
        .iter()
        .filter(|c| c.subcommand == "sitemap" && c.has_arg("-hostdb"))
        .count();
    assert_eq!(hostdb_sitemaps, 3);
    assert_eq!(engine.count("updatehostdb"), 4);
}

#[tokio::test]
async fn test_hostdb_steps_skipped_without_crawldb() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    fixture.config.sitemaps_from_hostdb = SitemapPolicy::Once;
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;
    result.unwrap();

    // No crawldb and no hostdb before the first generate: the bootstrap is a
    // no-op, and only the end-of-round refresh runs once updatedb made one.
    let subcommands = engine.subcommands();
    assert_eq!(subcommands.first().map(String::as_str), Some("generate"));
    assert_eq!(subcommands.last().map(String::as_str), Some("updatehostdb"));
    assert_eq!(engine.count("updatehostdb"), 1);
    assert_eq!(engine.count("sitemap"), 0);
}

#[tokio::test]
async fn test_generate_uses_configured_limits() {
    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    fixture.config.size_fetchlist = 1234;
    fixture.config.num_slaves = 1;
    let engine = ScriptedEngine::new(&fixture.root());

    let (result, _, _) = run(&fixture, &engine).await;
    result.unwrap();

    let generate = engine
        .calls()
        .into_iter()
        .find(|c| c.subcommand == "generate")
        .unwrap();
    assert!(generate.args.windows(2).any(|w| w == ["-topN", "1234"]));
    assert!(generate.args.windows(2).any(|w| w == ["-numFetchers", "1"]));
    assert!(generate.has_arg("-noFilter"));
}

#[tokio::test]
async fn test_missing_segment_after_generate() {
    struct NoSegmentEngine;

    #[async_trait]
    impl CommandRunner for NoSegmentEngine {
        async fn run(&self, _invocation: &Invocation) -> Result<i32, CycleError> {
            Ok(0)
        }
    }

    let mut fixture = Fixture::new();
    fixture.config.rounds = Some(1);
    let engine = NoSegmentEngine;
    let fs = LocalFs;
    let mut scheduler =
        RoundScheduler::new(&fixture.config, &engine, &fs).with_stop_file(fixture.stop_file());

    let err = scheduler.run().await.unwrap_err();
    assert!(matches!(err, CycleError::MissingSegment { .. }));
}
