//! Run statistics and corpus overview.
//!
//! [`RunStats`] is the accumulator threaded through one (source, version)
//! run. [`run_stats`] backs `corpus stats`: it scans the output tree for
//! manifests and prints record counts, sizes, and ages.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::manifest::{load_manifest, MANIFEST_FILE};

/// A document that could not be normalized or chunked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Counters for one (source, version) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Documents that produced at least one chunk.
    pub files_processed: usize,
    /// Files under an excluded directory.
    pub files_excluded: usize,
    /// Files whose extension is not in scope.
    pub files_unsupported: usize,
    /// Documents that normalized to empty text.
    pub files_empty: usize,
    pub failures: Vec<FileFailure>,
    pub chunks_emitted: usize,
    pub duplicates_dropped: usize,
    pub hard_cuts: usize,
}

impl RunStats {
    pub fn files_skipped(&self) -> usize {
        self.files_excluded + self.files_unsupported + self.files_empty
    }

    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn record_failure(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(FileFailure {
            path: path.into(),
            reason: reason.into(),
        });
    }

    /// Fold another run's counters into this one.
    pub fn absorb(&mut self, other: &RunStats) {
        self.files_processed += other.files_processed;
        self.files_excluded += other.files_excluded;
        self.files_unsupported += other.files_unsupported;
        self.files_empty += other.files_empty;
        self.failures.extend(other.failures.iter().cloned());
        self.chunks_emitted += other.chunks_emitted;
        self.duplicates_dropped += other.duplicates_dropped;
        self.hard_cuts += other.hard_cuts;
    }

    /// Print the indented counter block used by `corpus build`.
    pub fn print(&self) {
        println!("  files processed: {}", self.files_processed);
        println!(
            "  files skipped: {} (excluded {}, unsupported {}, empty {})",
            self.files_skipped(),
            self.files_excluded,
            self.files_unsupported,
            self.files_empty
        );
        println!("  files failed: {}", self.files_failed());
        for failure in &self.failures {
            println!("    {}: {}", failure.path, failure.reason);
        }
        println!("  chunks emitted: {}", self.chunks_emitted);
        println!("  duplicates dropped: {}", self.duplicates_dropped);
        println!("  hard cuts: {}", self.hard_cuts);
    }
}

/// Summary of one manifest file on disk.
struct ManifestStats {
    path: PathBuf,
    records: usize,
    bytes: u64,
    modified_ts: Option<i64>,
}

/// Run the stats command: find manifests under the output root and print a
/// summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let root = &config.corpus.output_root;
    let manifests = collect_manifest_stats(root)?;

    println!("Corpus Stats");
    println!("============");
    println!();
    println!("  Output root: {}", root.display());
    println!("  Manifests:   {}", manifests.len());
    println!(
        "  Records:     {}",
        manifests.iter().map(|m| m.records).sum::<usize>()
    );

    if !manifests.is_empty() {
        println!();
        println!(
            "  {:<48} {:>8} {:>10}   {}",
            "MANIFEST", "RECORDS", "SIZE", "WRITTEN"
        );
        println!("  {}", "-".repeat(84));
        for m in &manifests {
            let rel = m.path.strip_prefix(root).unwrap_or(&m.path);
            let written = match m.modified_ts {
                Some(ts) => format_ts_relative(ts),
                None => "unknown".to_string(),
            };
            println!(
                "  {:<48} {:>8} {:>10}   {}",
                rel.display(),
                m.records,
                format_bytes(m.bytes),
                written
            );
        }
    }

    println!();
    Ok(())
}

fn collect_manifest_stats(root: &Path) -> Result<Vec<ManifestStats>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE {
            continue;
        }
        let metadata = entry.metadata()?;
        let modified_ts = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        out.push(ManifestStats {
            path: entry.path().to_path_buf(),
            records: load_manifest(entry.path())?.len(),
            bytes: metadata.len(),
            modified_ts,
        });
    }
    Ok(out)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
