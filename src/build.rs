//! Corpus build orchestration.
//!
//! Expands the configuration into (source, version) pairs and runs each one
//! in turn: fetch the working tree, run the [`Coordinator`], record the
//! outcome. A failure in one pair (sync error, unwritable output) is
//! reported and the build moves on. Cancellation is checked between pairs.
//!
//! The build as a whole fails only when no source matches the selection or
//! when no pair managed to write a manifest.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Config, SourceConfig};
use crate::fetch::{Fetcher, SourceFetcher};
use crate::normalize::{Normalizer, PandocNormalizer};
use crate::pipeline::{pair_label, Coordinator, PairInput, PairRun, RunOptions};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, ProgressMode};
use crate::stats::RunStats;

/// Which pairs to build.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub source: Option<String>,
    pub version: Option<String>,
}

impl Selection {
    /// Expand the configured sources into the selected pairs, in config order.
    pub fn pairs<'c>(&self, config: &'c Config) -> Vec<(&'c SourceConfig, &'c str)> {
        config
            .sources
            .iter()
            .filter(|s| self.source.as_deref().map_or(true, |id| s.id == id))
            .flat_map(|s| s.versions.iter().map(move |v| (s, v.as_str())))
            .filter(|(_, v)| self.version.as_deref().map_or(true, |want| *v == want))
            .collect()
    }
}

/// Stage at which a pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Config,
    Write,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Config => "config",
            Stage::Write => "write",
        }
    }
}

#[derive(Debug, Clone)]
pub enum PairStatus {
    Completed { revision: String, run: PairRun },
    Failed { stage: Stage, error: String },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub source_id: String,
    pub version: String,
    pub status: PairStatus,
}

impl PairOutcome {
    pub fn label(&self) -> String {
        pair_label(&self.source_id, &self.version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub pairs: Vec<PairOutcome>,
}

impl BuildReport {
    /// Counters summed over every completed pair.
    pub fn totals(&self) -> RunStats {
        let mut total = RunStats::default();
        for pair in &self.pairs {
            if let PairStatus::Completed { run, .. } = &pair.status {
                total.absorb(&run.stats);
            }
        }
        total
    }

    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Cancelled))
    }

    fn count(&self, pred: impl Fn(&PairStatus) -> bool) -> usize {
        self.pairs.iter().filter(|p| pred(&p.status)).count()
    }
}

/// Run every selected pair sequentially.
pub async fn build_corpus(
    config: &Config,
    selection: &Selection,
    fetcher: &dyn Fetcher,
    normalizer: &dyn Normalizer,
    options: &RunOptions,
    progress: &dyn BuildProgressReporter,
    cancel: &AtomicBool,
) -> Result<BuildReport> {
    let pairs = selection.pairs(config);
    if pairs.is_empty() {
        bail!(
            "no configured source matches the selection (source: {}, version: {})",
            selection.source.as_deref().unwrap_or("*"),
            selection.version.as_deref().unwrap_or("*")
        );
    }

    let coordinator = Coordinator::new(normalizer, options).with_progress(progress);
    let mut report = BuildReport::default();

    for (source, version) in pairs {
        let status = if cancel.load(Ordering::SeqCst) {
            PairStatus::Cancelled
        } else {
            build_pair(config, source, version, fetcher, &coordinator, progress).await
        };
        report.pairs.push(PairOutcome {
            source_id: source.id.clone(),
            version: version.to_string(),
            status,
        });
    }

    Ok(report)
}

async fn build_pair(
    config: &Config,
    source: &SourceConfig,
    version: &str,
    fetcher: &dyn Fetcher,
    coordinator: &Coordinator<'_>,
    progress: &dyn BuildProgressReporter,
) -> PairStatus {
    let label = pair_label(&source.id, version);
    progress.report(BuildProgressEvent::Fetching {
        pair: label.clone(),
    });

    let tree = match fetcher.fetch(source, version).await {
        Ok(tree) => tree,
        Err(e) => {
            tracing::warn!(pair = %label, error = %e, "fetch failed");
            return PairStatus::Failed {
                stage: Stage::Fetch,
                error: e.to_string(),
            };
        }
    };

    let rules = match source.exclusion_rules(&config.defaults) {
        Ok(rules) => rules,
        Err(e) => {
            return PairStatus::Failed {
                stage: Stage::Config,
                error: format!("{:#}", e),
            }
        }
    };

    let input = PairInput {
        source,
        version,
        tree: &tree,
        chunking: source.chunking(&config.defaults),
        rules: &rules,
    };

    tracing::info!(pair = %label, revision = %tree.revision, root = %tree.root.display(), "processing");
    match coordinator.run(&input).await {
        Ok(run) => PairStatus::Completed {
            revision: tree.revision.clone(),
            run,
        },
        Err(e) => {
            tracing::warn!(pair = %label, error = %format!("{:#}", e), "manifest write failed");
            PairStatus::Failed {
                stage: Stage::Write,
                error: format!("{:#}", e),
            }
        }
    }
}

/// Options for `corpus build`.
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub selection: Selection,
    pub dry_run: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub progress: ProgressMode,
}

/// Entry point for `corpus build`: wire the real fetcher and normalizer,
/// run the build, print the report.
pub async fn run_build(config: &Config, args: BuildArgs) -> Result<()> {
    let options = RunOptions {
        output_root: config.corpus.output_root.clone(),
        mirror_markdown: config.corpus.mirror_markdown,
        dry_run: args.dry_run,
        generated_at: args.generated_at.unwrap_or_else(Utc::now),
    };
    let fetcher = SourceFetcher::new(&config.corpus.work_root, config.defaults.sync_timeout());
    let normalizer = PandocNormalizer::new(
        config.defaults.pandoc.clone(),
        config.defaults.normalize_timeout(),
    );
    let reporter = args.progress.reporter();

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received: finishing the current pair, then stopping");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let report = build_corpus(
        config,
        &args.selection,
        &fetcher,
        &normalizer,
        &options,
        reporter.as_ref(),
        &cancel,
    )
    .await?;

    print_report(&report, args.dry_run);

    if !args.dry_run && report.completed() == 0 {
        bail!("no manifest was written: all {} pair(s) failed", report.pairs.len());
    }
    Ok(())
}

fn print_report(report: &BuildReport, dry_run: bool) {
    for pair in &report.pairs {
        match &pair.status {
            PairStatus::Completed { revision, run } => {
                if dry_run {
                    println!("build {} (dry-run)", pair.label());
                } else {
                    println!("build {}", pair.label());
                }
                println!("  revision: {}", revision);
                run.stats.print();
                if let Some(path) = &run.manifest {
                    println!("  manifest: {}", path.display());
                }
            }
            PairStatus::Failed { stage, error } => {
                println!("build {}", pair.label());
                println!("  FAILED ({}): {}", stage.as_str(), error);
            }
            PairStatus::Cancelled => {
                println!("build {}", pair.label());
                println!("  cancelled");
            }
        }
    }

    let totals = report.totals();
    println!("total");
    println!(
        "  pairs: {} completed, {} failed, {} cancelled",
        report.completed(),
        report.failed(),
        report.cancelled()
    );
    println!("  files processed: {}", totals.files_processed);
    println!("  files skipped: {}", totals.files_skipped());
    println!("  files failed: {}", totals.files_failed());
    println!("  chunks emitted: {}", totals.chunks_emitted);
    println!("  duplicates dropped: {}", totals.duplicates_dropped);
    println!("  hard cuts: {}", totals.hard_cuts);
    println!("ok");
}

/// Parse the `--generated-at` flag (RFC 3339).
pub fn parse_generated_at(value: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid --generated-at timestamp: '{}'", value))?;
    Ok(ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[corpus]
output_root = "./out"

[[sources]]
id = "a"
category = "c"
tech = "t"
versions = ["1", "2"]
path = "/tmp/a"

[[sources]]
id = "b"
category = "c"
tech = "u"
versions = ["2"]
url = "https://example.com/b.git"
"#;

    #[test]
    fn test_selection_expands_pairs() {
        let cfg = parse_config(CONFIG).unwrap();
        let all = Selection::default().pairs(&cfg);
        let labels: Vec<_> = all.iter().map(|(s, v)| pair_label(&s.id, v)).collect();
        assert_eq!(labels, vec!["a@1", "a@2", "b@2"]);

        let by_version = Selection {
            version: Some("2".into()),
            ..Default::default()
        };
        assert_eq!(by_version.pairs(&cfg).len(), 2);

        let none = Selection {
            source: Some("zzz".into()),
            ..Default::default()
        };
        assert!(none.pairs(&cfg).is_empty());
    }

    #[test]
    fn test_parse_generated_at() {
        let ts = parse_generated_at("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T08:00:00+00:00");
        assert!(parse_generated_at("yesterday").is_err());
    }
}
