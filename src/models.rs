//! Core data models used throughout the corpus builder.
//!
//! These types represent the documents, chunks, and manifest records that
//! flow through the normalization → chunking → indexing pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Provenance trust tag attached to every record of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTag {
    #[default]
    Official,
    Community,
}

impl TrustTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTag::Official => "official",
            TrustTag::Community => "community",
        }
    }
}

impl fmt::Display for TrustTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synced checkout of one (source, version) pair.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    pub root: PathBuf,
    pub revision: String,
}

/// A file inside a working tree, before normalization.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the working-tree root, as enumerated.
    pub relative_path: String,
    pub format: crate::normalize::Format,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A bounded slice of a document's normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub ordinal: usize,
    pub text: String,
    /// Length of `text` in characters (not bytes).
    pub char_len: usize,
    /// Title of the section this chunk starts in, if any.
    pub heading: Option<String>,
}

/// One line of a `manifest.jsonl` file.
///
/// Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub id: String,
    pub file: String,
    pub text: String,
    pub repo: String,
    pub tech: String,
    pub version: String,
    pub source: TrustTag,
    pub git_sha: String,
    pub file_path: String,
    pub original_file: String,
    pub generated_at: String,
}
