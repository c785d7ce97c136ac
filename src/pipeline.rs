//! Per-(source, version) pipeline coordination.
//!
//! Drives one working tree through the full flow: enumerate → classify →
//! normalize → clean → chunk → assemble → write manifest → write mirror.
//! Failures on a single document are recorded in [`RunStats`] and never
//! abort the run; only a failure to write the manifest fails the pair.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::assemble::{canonical_path, markdown_path, MetadataAssembler, RecordContext};
use crate::chunk::chunk_markdown;
use crate::config::{ChunkingConfig, SourceConfig};
use crate::exclude::{ExclusionRules, PathClass};
use crate::manifest::{prune_mirror, version_dir, write_manifest, write_mirror, MANIFEST_FILE};
use crate::models::{Document, ManifestRecord, WorkingTree};
use crate::normalize::{clean_markdown, detect_format, Format, NormalizeError, Normalizer};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, NoProgress};
use crate::stats::RunStats;

/// Settings shared by every pair of one build.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_root: PathBuf,
    pub mirror_markdown: bool,
    /// Process everything but write nothing.
    pub dry_run: bool,
    /// Stamp written to every record's `generated_at`.
    pub generated_at: DateTime<Utc>,
}

/// Outcome of a pair that ran to completion.
#[derive(Debug, Clone)]
pub struct PairRun {
    pub stats: RunStats,
    /// `None` on dry runs.
    pub manifest: Option<PathBuf>,
}

/// One (source, version) pair with its effective settings.
pub struct PairInput<'a> {
    pub source: &'a SourceConfig,
    pub version: &'a str,
    pub tree: &'a WorkingTree,
    pub chunking: ChunkingConfig,
    pub rules: &'a ExclusionRules,
}

/// `source@version`, as shown in logs, progress and the build summary.
pub fn pair_label(source_id: &str, version: &str) -> String {
    format!("{}@{}", source_id, version)
}

impl PairInput<'_> {
    pub fn label(&self) -> String {
        pair_label(&self.source.id, self.version)
    }
}

/// Everything one pair produced, before anything is written.
#[derive(Debug, Default)]
pub struct CollectedPair {
    pub records: Vec<ManifestRecord>,
    /// Mirror path (relative to the version directory) to normalized text.
    /// Empty unless mirroring is on and this is not a dry run.
    pub mirror: BTreeMap<String, String>,
}

pub struct Coordinator<'a> {
    normalizer: &'a dyn Normalizer,
    progress: &'a dyn BuildProgressReporter,
    options: &'a RunOptions,
}

impl<'a> Coordinator<'a> {
    pub fn new(normalizer: &'a dyn Normalizer, options: &'a RunOptions) -> Self {
        Self {
            normalizer,
            progress: &NoProgress,
            options,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn BuildProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Process one pair and write its manifest, then its Markdown mirror.
    pub async fn run(&self, input: &PairInput<'_>) -> Result<PairRun> {
        let mut stats = RunStats::default();
        let collected = self.collect_records(input, &mut stats).await;

        if self.options.dry_run {
            return Ok(PairRun {
                stats,
                manifest: None,
            });
        }

        let dir = self.version_dir(input);
        let destination = dir.join(MANIFEST_FILE);
        write_manifest(&collected.records, &destination)?;
        tracing::info!(
            pair = %input.label(),
            records = collected.records.len(),
            manifest = %destination.display(),
            "manifest written"
        );

        if self.options.mirror_markdown {
            self.write_mirror_files(input, &dir, &collected.mirror);
        }

        Ok(PairRun {
            stats,
            manifest: Some(destination),
        })
    }

    /// Mirror failures are logged and never fail the pair.
    fn write_mirror_files(
        &self,
        input: &PairInput<'_>,
        dir: &Path,
        mirror: &BTreeMap<String, String>,
    ) {
        for (md, text) in mirror {
            if let Err(e) = write_mirror(dir, md, text) {
                tracing::warn!(path = %md, error = %e, "mirror write failed");
            }
        }
        let keep: HashSet<String> = mirror.keys().cloned().collect();
        match prune_mirror(dir, &keep) {
            Ok(0) => {}
            Ok(n) => {
                tracing::info!(pair = %input.label(), removed = n, "stale mirror files removed")
            }
            Err(e) => {
                tracing::warn!(pair = %input.label(), error = %format!("{:#}", e), "mirror prune failed")
            }
        }
    }

    /// Produce the ordered, deduplicated records for one pair without
    /// writing anything.
    pub async fn collect_records(
        &self,
        input: &PairInput<'_>,
        stats: &mut RunStats,
    ) -> CollectedPair {
        let label = input.label();
        let paths = enumerate_files(&input.tree.root, stats);
        let eligible = classify_paths(&paths, input.rules, stats);

        let mut assembler = MetadataAssembler::new(RecordContext {
            source_id: input.source.id.clone(),
            tech: input.source.tech.clone(),
            version: input.version.to_string(),
            trust: input.source.trust,
            revision: input.tree.revision.clone(),
            generated_at: self.options.generated_at,
        });
        let collect_mirror = self.options.mirror_markdown && !self.options.dry_run;
        let mut mirror = BTreeMap::new();

        let total = eligible.len() as u64;
        let mut records = Vec::new();
        for (n, (relative, format)) in eligible.iter().enumerate() {
            self.progress.report(BuildProgressEvent::Processing {
                pair: label.clone(),
                n: n as u64,
                total,
            });

            let Some(text) = self
                .normalize_document(&input.tree.root, relative, *format, stats)
                .await
            else {
                continue;
            };

            let chunked = {
                let _span = tracing::warn_span!("document", path = %relative).entered();
                chunk_markdown(&text, &input.chunking)
            };
            if chunked.is_empty() {
                stats.files_empty += 1;
                continue;
            }
            stats.hard_cuts += chunked.hard_cuts;

            let assembled = assembler.assemble(relative, &chunked.chunks);
            stats.files_processed += 1;
            stats.duplicates_dropped += assembled.duplicates_dropped;
            stats.chunks_emitted += assembled.records.len();

            if collect_mirror {
                match mirror.entry(markdown_path(&canonical_path(relative))) {
                    Entry::Vacant(slot) => {
                        slot.insert(text);
                    }
                    Entry::Occupied(slot) => {
                        tracing::warn!(
                            path = %relative,
                            mirror = %slot.key(),
                            "mirror path already taken by an earlier document; skipped"
                        );
                    }
                }
            }

            records.extend(assembled.records);
        }

        self.progress.report(BuildProgressEvent::Processing {
            pair: label,
            n: total,
            total,
        });
        CollectedPair { records, mirror }
    }

    /// Read, normalize, and clean one document. `None` means the document
    /// was skipped (empty) or failed; `stats` already reflects which.
    async fn normalize_document(
        &self,
        root: &Path,
        relative: &str,
        format: Format,
        stats: &mut RunStats,
    ) -> Option<String> {
        let bytes = match std::fs::read(root.join(relative)) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %relative, error = %e, "failed to read document");
                stats.record_failure(relative, format!("read failed: {}", e));
                return None;
            }
        };
        let document = Document {
            relative_path: relative.to_string(),
            format,
            bytes,
        };
        if document.bytes.iter().all(|b| b.is_ascii_whitespace()) {
            tracing::debug!(path = %relative, "empty document");
            stats.files_empty += 1;
            return None;
        }

        let raw = match self.normalizer.normalize(root, &document).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    path = %relative,
                    ?format,
                    bytes = document.size(),
                    normalizer = self.normalizer.name(),
                    error = %e,
                    "normalization failed"
                );
                stats.record_failure(relative, e.to_string());
                return None;
            }
        };

        let text = clean_markdown(&raw);
        if text.is_empty() {
            tracing::debug!(path = %relative, "document normalized to empty text");
            stats.files_empty += 1;
            return None;
        }
        Some(text)
    }

    fn version_dir(&self, input: &PairInput<'_>) -> PathBuf {
        version_dir(
            &self.options.output_root,
            &input.source.category,
            &input.source.tech,
            input.version,
        )
    }
}

/// All regular files under `root`, as `/`-separated relative paths in a
/// stable (lexicographic, per directory) order. Unreadable entries are
/// recorded as failures.
pub fn enumerate_files(root: &Path, stats: &mut RunStats) -> Vec<String> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_str(root, p))
                    .unwrap_or_else(|| root.display().to_string());
                tracing::warn!(%path, error = %e, "failed to enumerate entry");
                stats.record_failure(path, format!("walk failed: {}", e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        paths.push(relative_str(root, entry.path()));
    }
    paths
}

/// Apply exclusion rules, counting skipped paths. Returns the eligible
/// paths in input order.
pub fn classify_paths(
    paths: &[String],
    rules: &ExclusionRules,
    stats: &mut RunStats,
) -> Vec<(String, Format)> {
    let mut eligible = Vec::new();
    for path in paths {
        match rules.classify(path) {
            PathClass::Eligible(format) => eligible.push((path.clone(), format)),
            PathClass::Excluded => stats.files_excluded += 1,
            PathClass::Unsupported => {
                tracing::debug!(%path, "unsupported format");
                stats.files_unsupported += 1;
            }
        }
    }
    eligible
}

/// CLI entry point for `corpus chunk`: run one file through normalization
/// and chunking and print every chunk. Nothing is written.
pub async fn run_chunk(
    path: &Path,
    chunking: &ChunkingConfig,
    normalizer: &dyn Normalizer,
) -> Result<()> {
    let format = detect_format(path)
        .ok_or_else(|| NormalizeError::Unsupported(path.display().to_string()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let (root, name) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => (parent, name.to_string_lossy().into_owned()),
        _ => bail!("not a file path: {}", path.display()),
    };
    let document = Document {
        relative_path: name,
        format,
        bytes,
    };

    let text = clean_markdown(&normalizer.normalize(root, &document).await?);
    let chunked = chunk_markdown(&text, chunking);

    println!(
        "{}: {} chars, {} chunks, {} hard cuts",
        path.display(),
        text.chars().count(),
        chunked.chunks.len(),
        chunked.hard_cuts
    );
    for chunk in &chunked.chunks {
        println!(
            "  #{:<4} {:>6}  {}",
            chunk.ordinal,
            chunk.char_len,
            chunk.heading.as_deref().unwrap_or("-")
        );
        println!("         {}", preview(&chunk.text, 72));
    }
    Ok(())
}

fn preview(text: &str, width: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let cut: String = flat.chars().take(width).collect();
    format!("{}...", cut)
}

fn relative_str(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
