//! Format detection, normalization to Markdown, and Markdown cleanup.
//!
//! The corpus builder does not convert markup itself. It declares which
//! dialects are in scope ([`Format`]), delegates conversion to a
//! [`Normalizer`] capability, and post-processes the result with
//! [`clean_markdown`]. The bundled [`PandocNormalizer`] shells out to
//! `pandoc` with a per-file timeout.
//!
//! | Extension | Format | pandoc reader |
//! |-----------|--------|---------------|
//! | `md` | Markdown | passthrough |
//! | `mdx` | Mdx | `markdown` |
//! | `rst` | Rst | `rst` |
//! | `adoc`, `asciidoc` | AsciiDoc | `asciidoc` |
//! | `xml` | DocBook | `docbook` |
//! | `tex` | Latex | `latex` |
//! | `html`, `htm` | Html | `html` |

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::exec::{run_command, ExecError};
use crate::models::Document;

/// A markup dialect the pipeline knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Markdown,
    Mdx,
    Rst,
    AsciiDoc,
    DocBook,
    Latex,
    Html,
}

impl Format {
    /// Map a lowercase file extension (without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "md" | "markdown" => Some(Format::Markdown),
            "mdx" => Some(Format::Mdx),
            "rst" => Some(Format::Rst),
            "adoc" | "asciidoc" => Some(Format::AsciiDoc),
            "xml" => Some(Format::DocBook),
            "tex" => Some(Format::Latex),
            "html" | "htm" => Some(Format::Html),
            _ => None,
        }
    }

    /// The pandoc reader name, or `None` when no conversion is needed.
    pub fn pandoc_reader(&self) -> Option<&'static str> {
        match self {
            Format::Markdown => None,
            Format::Mdx => Some("markdown"),
            Format::Rst => Some("rst"),
            Format::AsciiDoc => Some("asciidoc"),
            Format::DocBook => Some("docbook"),
            Format::Latex => Some("latex"),
            Format::Html => Some("html"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("converter produced malformed output: {0}")]
    Malformed(String),
}

/// Converts one document's raw bytes into Markdown text.
///
/// Implementations must bound their own running time; the pipeline treats
/// any error as a per-file failure and moves on.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Short name used in logs (e.g. `"pandoc"`).
    fn name(&self) -> &str;

    /// Convert `document`, which lives under the working tree `root`.
    async fn normalize(&self, root: &Path, document: &Document) -> Result<String, NormalizeError>;
}

/// Detect the format of `path` from its extension.
pub fn detect_format(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Format::from_extension(&ext)
}

/// Normalizer backed by the `pandoc` binary.
///
/// Markdown input is decoded as UTF-8 (lossily) without spawning pandoc.
pub struct PandocNormalizer {
    binary: String,
    timeout: Duration,
}

impl PandocNormalizer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Normalizer for PandocNormalizer {
    fn name(&self) -> &str {
        "pandoc"
    }

    async fn normalize(&self, root: &Path, document: &Document) -> Result<String, NormalizeError> {
        let Some(reader) = document.format.pandoc_reader() else {
            return Ok(String::from_utf8_lossy(&document.bytes).into_owned());
        };

        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-f",
            reader,
            "-t",
            "gfm",
            "--wrap=none",
            "--markdown-headings=atx",
        ]);
        // Relative includes (rst `.. include::`, LaTeX `\input`) resolve
        // against the document's own directory.
        let path = root.join(&document.relative_path);
        if let Some(dir) = path.parent().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }

        let output = run_command(cmd, Some(&document.bytes), self.timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NormalizeError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(200).collect(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| NormalizeError::Malformed(e.to_string()))
    }
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>")
            .expect("static regex")
    })
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{#[^}\n]*\}").expect("static regex"))
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

/// Post-process converter output into the canonical normalized text.
///
/// - `\r\n` and lone `\r` become `\n`
/// - `<script>` and `<style>` blocks are removed
/// - pandoc attribute anchors (`{#id .class}`) are removed
/// - three or more consecutive newlines collapse to one blank line
/// - leading/trailing whitespace is trimmed and a single `\n` appended
///
/// Whitespace-only input yields an empty string.
pub fn clean_markdown(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = script_style_re().replace_all(&text, "");
    let text = attribute_re().replace_all(&text, "");
    let text = blank_run_re().replace_all(&text, "\n\n");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{}\n", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("a/b.md")), Some(Format::Markdown));
        assert_eq!(detect_format(Path::new("a/b.HTM")), Some(Format::Html));
        assert_eq!(detect_format(Path::new("book.asciidoc")), Some(Format::AsciiDoc));
        assert_eq!(detect_format(Path::new("main.rs")), None);
        assert_eq!(detect_format(Path::new("README")), None);
    }

    #[test]
    fn test_clean_line_endings_and_blank_runs() {
        let raw = "# Title\r\n\r\n\r\n\r\nBody\rmore\n\n\n";
        assert_eq!(clean_markdown(raw), "# Title\n\nBody\nmore\n");
    }

    #[test]
    fn test_clean_strips_script_and_style() {
        let raw = "Intro\n<script type=\"x\">\nalert(1)\n</script>\n<STYLE>p{}</STYLE>Outro";
        let cleaned = clean_markdown(raw);
        assert!(!cleaned.contains("alert"));
        assert!(!cleaned.contains("p{}"));
        assert!(cleaned.starts_with("Intro"));
        assert!(cleaned.ends_with("Outro\n"));
    }

    #[test]
    fn test_clean_strips_anchor_attributes() {
        let raw = "## Install {#install .unnumbered}\n\nText";
        assert_eq!(clean_markdown(raw), "## Install \n\nText\n");
    }

    #[test]
    fn test_clean_whitespace_only_is_empty() {
        assert_eq!(clean_markdown("  \n\r\n\t\n"), "");
    }

    fn document(path: &str, bytes: &[u8]) -> Document {
        Document {
            relative_path: path.to_string(),
            format: detect_format(Path::new(path)).unwrap(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_markdown_passthrough_does_not_spawn() {
        let normalizer = PandocNormalizer::new("no-such-pandoc-binary", Duration::from_secs(1));
        let text = normalizer
            .normalize(Path::new("."), &document("guide.md", b"# Hi\n\nthere"))
            .await
            .unwrap();
        assert_eq!(text, "# Hi\n\nthere");
    }

    #[tokio::test]
    async fn test_missing_converter_is_error() {
        let normalizer = PandocNormalizer::new("no-such-pandoc-binary", Duration::from_secs(1));
        let err = normalizer
            .normalize(Path::new("."), &document("guide.rst", b"Title\n=====\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Exec(ExecError::Spawn { .. })));
    }
}
