//! JSON-lines manifest persistence.
//!
//! One `manifest.jsonl` per (source, version): one [`ManifestRecord`] per
//! line, UTF-8, no enclosing array. Writes replace the previous file
//! atomically (temp file in the same directory, then rename), so a reader
//! never sees a half-written manifest.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::models::ManifestRecord;

pub const MANIFEST_FILE: &str = "manifest.jsonl";

/// `<output_root>/<category>/<tech>/<version>`.
pub fn version_dir(output_root: &Path, category: &str, tech: &str, version: &str) -> PathBuf {
    output_root
        .join(path_component(category))
        .join(path_component(tech))
        .join(path_component(version))
}

/// Make a label safe as a single path component (`release/1.x` → `release-1.x`).
fn path_component(label: &str) -> String {
    let cleaned = label.trim().replace(['/', '\\'], "-");
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Write `records` to `destination`, fully replacing any existing file.
///
/// Returns the number of records written.
pub fn write_manifest(records: &[ManifestRecord], destination: &Path) -> Result<usize> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;

    let tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(destination)
        .with_context(|| format!("Failed to move manifest into place: {}", destination.display()))?;

    Ok(records.len())
}

/// Read a manifest back into records. Blank lines are ignored.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open manifest: {}", path.display()))?;

    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ManifestRecord = serde_json::from_str(&line).with_context(|| {
            format!("Invalid record at {}:{}", path.display(), lineno + 1)
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write the normalized text of one document to the Markdown mirror.
pub fn write_mirror(version_dir: &Path, markdown_path: &str, text: &str) -> Result<()> {
    let dest = version_dir.join(markdown_path);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, text)
        .with_context(|| format!("Failed to write mirror file: {}", dest.display()))?;
    Ok(())
}

/// Delete mirror files under `version_dir` that are not in `keep`
/// (`/`-separated paths relative to `version_dir`). Returns how many were
/// removed. The manifest itself is never touched.
pub fn prune_mirror(version_dir: &Path, keep: &HashSet<String>) -> Result<usize> {
    if !version_dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(version_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(version_dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if keep.contains(&relative) {
            continue;
        }
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale mirror file: {}", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}
