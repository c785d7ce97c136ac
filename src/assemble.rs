//! Metadata assembly: chunks + provenance → manifest records.
//!
//! A [`MetadataAssembler`] lives for one (source, version) run. It stamps
//! every record with the run's generation timestamp, rewrites the stored
//! path to its `.md` form, and drops chunks whose id was already emitted
//! earlier in the run (first occurrence in enumeration order wins).

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::id::make_id;
use crate::models::{Chunk, ManifestRecord, TrustTag};

/// Timestamp format written to `generated_at` (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Immutable provenance shared by every record of one run.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub source_id: String,
    pub tech: String,
    pub version: String,
    pub trust: TrustTag,
    pub revision: String,
    pub generated_at: DateTime<Utc>,
}

/// Records for one document plus the number of duplicates dropped.
#[derive(Debug, Clone, Default)]
pub struct AssembledDocument {
    pub records: Vec<ManifestRecord>,
    pub duplicates_dropped: usize,
}

pub struct MetadataAssembler {
    context: RecordContext,
    generated_at: String,
    seen: HashSet<String>,
}

impl MetadataAssembler {
    pub fn new(context: RecordContext) -> Self {
        let generated_at = format_timestamp(&context.generated_at);
        Self {
            context,
            generated_at,
            seen: HashSet::new(),
        }
    }

    /// Build records for one document's chunks, in ordinal order.
    pub fn assemble(&mut self, original_path: &str, chunks: &[Chunk]) -> AssembledDocument {
        let original = canonical_path(original_path);
        let file = markdown_path(&original);

        let mut out = AssembledDocument::default();
        for chunk in chunks {
            let id = make_id(&self.context.source_id, &self.context.version, &chunk.text);
            if !self.seen.insert(id.clone()) {
                tracing::debug!(%id, file = %original, "dropping duplicate chunk");
                out.duplicates_dropped += 1;
                continue;
            }

            out.records.push(ManifestRecord {
                id,
                file: file.clone(),
                text: chunk.text.clone(),
                repo: self.context.source_id.clone(),
                tech: self.context.tech.clone(),
                version: self.context.version.clone(),
                source: self.context.trust,
                git_sha: self.context.revision.clone(),
                file_path: file.clone(),
                original_file: original.clone(),
                generated_at: self.generated_at.clone(),
            });
        }
        out
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Forward slashes only, no leading `./` or `/`, no empty or `.` segments.
pub fn canonical_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Replace the file extension with `.md` (or append it when there is none).
pub fn markdown_path(canonical: &str) -> String {
    let name_start = canonical.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &canonical[name_start..];
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.md", &canonical[..name_start + dot]),
        _ => format!("{}.md", canonical),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> RecordContext {
        RecordContext {
            source_id: "kube".into(),
            tech: "kubernetes".into(),
            version: "v1.30".into(),
            trust: TrustTag::Official,
            revision: "abc123".into(),
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        }
    }

    fn chunk(ordinal: usize, text: &str) -> Chunk {
        Chunk {
            ordinal,
            text: text.to_string(),
            char_len: text.chars().count(),
            heading: None,
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(canonical_path("./docs\\guide//intro.rst"), "docs/guide/intro.rst");
        assert_eq!(markdown_path("docs/guide/intro.rst"), "docs/guide/intro.md");
        assert_eq!(markdown_path("docs/guide/intro.md"), "docs/guide/intro.md");
        assert_eq!(markdown_path("docs/v1.2/README"), "docs/v1.2/README.md");
        assert_eq!(markdown_path("docs/.hidden"), "docs/.hidden.md");
        assert_eq!(markdown_path("book.tar.html"), "book.tar.md");
    }

    #[test]
    fn test_record_fields() {
        let mut asm = MetadataAssembler::new(context());
        let out = asm.assemble("content/en/setup.html", &[chunk(0, "Install it.")]);
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert!(r.id.starts_with("kube:v1.30:"));
        assert_eq!(r.file, "content/en/setup.md");
        assert_eq!(r.file_path, r.file);
        assert_eq!(r.original_file, "content/en/setup.html");
        assert_eq!(r.repo, "kube");
        assert_eq!(r.tech, "kubernetes");
        assert_eq!(r.version, "v1.30");
        assert_eq!(r.source, TrustTag::Official);
        assert_eq!(r.git_sha, "abc123");
        assert_eq!(r.generated_at, "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_duplicates_dropped_across_documents() {
        let mut asm = MetadataAssembler::new(context());
        let first = asm.assemble("a.md", &[chunk(0, "License: MIT\n"), chunk(1, "A only")]);
        let second = asm.assemble("b.md", &[chunk(0, "License: MIT\n"), chunk(1, "B only")]);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.duplicates_dropped, 0);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.duplicates_dropped, 1);
        assert_eq!(second.records[0].text, "B only");
    }

    #[test]
    fn test_duplicates_within_document() {
        let mut asm = MetadataAssembler::new(context());
        let out = asm.assemble("a.md", &[chunk(0, "same"), chunk(1, "same"), chunk(2, "other")]);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.duplicates_dropped, 1);
    }
}
