//! Command-line front-end (C10): wires the analyzer boundary, the engine's
//! pure components, and the two on-disk caches together. Exit code 0 means
//! the requested operation completed; 1 means it didn't (bad input, a
//! failing analyzer, an unreadable cache path).

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use chrono::Utc;
use log::info;

use aare::analyzer::{Analyzer, FileAnalyzer};
use aare::cache::{self, AnalysisSnapshotCache, Snapshot, VerifiedBaselineCache};
use aare::config::Config;
use aare::graph;
use aare::hash;
use aare::patch;
use aare::select::Selector;
use aare::status;
use aare::symbol::Fqs;
use aare::vcs::{GitVcs, Vcs};

#[derive(Parser)]
#[command(name = "aare", about = "Selective test selection for Lisp-like codebases")]
struct Cli {
    /// Project root the analyzer output is relative to.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to an `aare.toml` configuration file. Missing is fine; defaults apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a fresh analysis snapshot from an external facts dump.
    Analyze {
        /// JSON facts file produced by the external analyzer.
        #[arg(long)]
        facts: PathBuf,
    },
    /// Select tests to run given the current snapshot and verified baseline.
    Select {
        /// Ignore the baseline and select every test.
        #[arg(long)]
        all: bool,
        /// Rehash only files with uncommitted changes before selecting,
        /// rather than trusting the snapshot's hashes as-is.
        #[arg(long)]
        patch: bool,
    },
    /// Record tests as verified against the current snapshot's hashes.
    MarkVerified {
        /// Fully-qualified test names (`namespace/name`) to mark verified.
        #[arg(long = "test")]
        tests: Vec<String>,
        /// Mark every test in the current snapshot as verified.
        #[arg(long, conflicts_with = "tests")]
        all: bool,
    },
    /// Remove cached state.
    Clear {
        /// Also remove the verified baseline, not just the analysis snapshot.
        #[arg(long)]
        all: bool,
    },
    /// Report what's cached.
    Status,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => Ok(Config::default()),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;
    let snapshot_cache = AnalysisSnapshotCache::new(&config.snapshot_path);
    let baseline_cache = VerifiedBaselineCache::new(&config.baseline_path);

    match cli.command {
        Command::Analyze { facts } => {
            let analyzer = FileAnalyzer::new(&facts);
            let parsed = analyzer
                .analyze(&cli.root)
                .context("running the analyzer")?;
            let builder_config = config.graph_builder_config();
            let graph = graph::build(parsed, &builder_config);
            info!("built symbol graph with {} nodes", graph.nodes.len());
            let hashes = hash::hash_all(&graph);
            let snapshot = Snapshot {
                analyzed_at: Utc::now(),
                graph,
                hashes,
            };
            snapshot_cache
                .store(&snapshot)
                .context("writing analysis snapshot")?;
            println!("analyzed {} symbols", snapshot.hashes.len());
        }
        Command::Select { all, patch: use_patch } => {
            let Some(snapshot) = snapshot_cache.load() else {
                bail!("no analysis snapshot found; run `aare analyze` first");
            };
            let snapshot = if use_patch {
                let changed_files = GitVcs
                    .uncommitted_files(&cli.root)
                    .context("checking uncommitted files")?;
                let graph = snapshot.graph.clone();
                patch::apply(&snapshot, graph, &changed_files, Utc::now())
            } else {
                snapshot
            };
            let baseline = baseline_cache.load();
            let selector = Selector::new(&snapshot.graph);
            let selection = selector.select(&baseline, &snapshot.hashes, all);
            let total_tests = snapshot.graph.test_nodes().count();
            status::print_selection(&mut std::io::stdout(), &selection, total_tests)?;
        }
        Command::MarkVerified { tests, all } => {
            let Some(snapshot) = snapshot_cache.load() else {
                bail!("no analysis snapshot found; run `aare analyze` first");
            };
            let mut baseline = baseline_cache.load();
            let selector = Selector::new(&snapshot.graph);

            if all {
                // Adopting a legacy codebase with no prior verified state,
                // not the normal "these tests ran" path below.
                baseline = selector.mark_all_verified(&snapshot.hashes);
            } else {
                let parsed: HashSet<Fqs> = tests
                    .iter()
                    .map(|t| t.parse::<Fqs>())
                    .collect::<Result<_, _>>()
                    .context("parsing --test value as namespace/name")?;
                let selection = selector.select(&baseline, &snapshot.hashes, false);
                let tests_run = if parsed.is_empty() { None } else { Some(&parsed) };
                let report = selector
                    .mark_verified(&mut baseline, &snapshot.hashes, &selection, tests_run)
                    .context("marking tests verified")?;
                println!("recorded {} changed symbol(s) as verified", report.updated);
                if !report.skipped.is_empty() {
                    println!(
                        "{} symbol(s) remain unverified, not covered by the tests run",
                        report.skipped.len()
                    );
                }
            }
            baseline_cache
                .store(&baseline)
                .context("writing verified baseline")?;
        }
        Command::Clear { all } => {
            if all {
                cache::clear_all(&snapshot_cache, &baseline_cache).context("clearing caches")?;
            } else {
                cache::clear_analysis(&snapshot_cache).context("clearing analysis snapshot")?;
            }
        }
        Command::Status => {
            let cache_status = cache::status(&snapshot_cache, &baseline_cache);
            status::print_cache_status(&mut std::io::stdout(), &cache_status)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    flexi_logger::Logger::try_with_env_or_str("warn")
        .and_then(|logger| logger.start())
        .ok();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
