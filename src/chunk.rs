//! Header-aware, bounded-size Markdown chunker.
//!
//! Splits normalized Markdown into [`Chunk`]s whose character length lies in
//! `[min_chunk_chars, max_chunk_chars]`. The only chunk allowed below the
//! minimum is a document's last one (which is also the sole chunk for short
//! documents). Chunks are plain slices of the input: concatenating them in
//! ordinal order reproduces the text exactly.
//!
//! # Algorithm
//!
//! 1. Split the text into sections at ATX headers of level
//!    `1..=max_header_level`. Deeper headers, and `#` lines inside fenced
//!    code blocks, are ordinary text. Text before the first header forms its
//!    own section.
//! 2. Any section longer than `max_chunk_chars` is split at the last blank
//!    line before the limit. With no blank line in range the section is
//!    **hard cut** at exactly `max_chunk_chars` characters. Hard cuts are a
//!    documented policy, not an error: they are counted in
//!    [`ChunkedDocument::hard_cuts`] and logged at `warn` level.
//! 3. Pieces are packed in document order. A buffer shorter than
//!    `min_chunk_chars` absorbs the following piece(s); when the next piece
//!    does not fit whole, it is split inside the window that brings the
//!    buffer to `[min, max]`, preferring a blank line, then a line break,
//!    then a hard cut.
//! 4. Ordinals `0..N-1` are assigned in emission order.
//!
//! Lengths are measured in Unicode scalar values; cuts always land on
//! `char` boundaries.

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Result of chunking one document.
#[derive(Debug, Clone, Default)]
pub struct ChunkedDocument {
    pub chunks: Vec<Chunk>,
    /// Number of forced splits at the character limit.
    pub hard_cuts: usize,
}

impl ChunkedDocument {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A header-delimited slice of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section<'a> {
    heading: Option<String>,
    text: &'a str,
}

/// A section fragment no longer than `max_chunk_chars`.
struct Piece<'a> {
    heading: Option<&'a str>,
    text: &'a str,
}

/// Chunk normalized Markdown. Empty or whitespace-only text yields no chunks.
pub fn chunk_markdown(text: &str, config: &ChunkingConfig) -> ChunkedDocument {
    if text.trim().is_empty() {
        return ChunkedDocument::default();
    }

    let sections = split_sections(text, config.max_header_level);

    let mut hard_cuts = 0;
    let mut pieces = Vec::new();
    for section in &sections {
        for part in split_oversized(section.text, config.max_chunk_chars, &mut hard_cuts) {
            pieces.push(Piece {
                heading: section.heading.as_deref(),
                text: part,
            });
        }
    }

    let mut packer = Packer::new(config.min_chunk_chars, config.max_chunk_chars);
    for piece in pieces {
        packer.push(piece, &mut hard_cuts);
    }

    ChunkedDocument {
        chunks: packer.finish(),
        hard_cuts,
    }
}

fn split_sections(text: &str, max_level: usize) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut heading: Option<String> = None;
    let mut fence: Option<(char, usize)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if let Some(marker) = fence_marker(line) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) if marker.0 == ch && marker.1 >= len => fence = None,
                Some(_) => {}
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }

        if let Some((_, title)) = parse_header(line, max_level) {
            if line_start > start {
                sections.push(Section {
                    heading: heading.take(),
                    text: &text[start..line_start],
                });
            }
            start = line_start;
            heading = Some(title);
        }
    }

    if start < text.len() {
        sections.push(Section {
            heading,
            text: &text[start..],
        });
    }

    sections
}

/// Recognise an opening or closing code fence: up to three spaces of
/// indentation, then three or more backticks or tildes.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = rest.chars().take_while(|c| *c == ch).count();
    (run >= 3).then_some((ch, run))
}

/// Parse an ATX header (`## Title`) up to `max_level`. Returns the level and
/// the title with any closing `#` sequence removed.
fn parse_header(line: &str, max_level: usize) -> Option<(usize, String)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > max_level {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        return None;
    }
    Some((hashes, title.to_string()))
}

/// Split `text` into pieces of at most `max_chars` characters, cutting after
/// the last blank line before the limit or, failing that, at the limit.
fn split_oversized<'a>(text: &'a str, max_chars: usize, hard_cuts: &mut usize) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = text;

    while char_len(rest) > max_chars {
        let limit = byte_offset(rest, max_chars);
        let cut = match rest[..limit].rfind("\n\n") {
            Some(i) => i + 2,
            None => {
                *hard_cuts += 1;
                tracing::warn!(
                    max_chars,
                    "hard cut: no paragraph boundary within the chunk limit"
                );
                limit
            }
        };
        parts.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

struct Packer {
    min: usize,
    max: usize,
    buf: String,
    buf_chars: usize,
    heading: Option<String>,
    chunks: Vec<Chunk>,
}

impl Packer {
    fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            buf: String::new(),
            buf_chars: 0,
            heading: None,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: Piece<'_>, hard_cuts: &mut usize) {
        let mut rest = piece.text;

        while !rest.is_empty() {
            if self.buf_chars >= self.min {
                self.emit();
            }

            let rest_chars = char_len(rest);
            if self.buf.is_empty() {
                self.heading = piece.heading.map(str::to_string);
                self.append(rest, rest_chars);
                return;
            }

            if self.buf_chars + rest_chars <= self.max {
                self.append(rest, rest_chars);
                return;
            }

            // Buffer is short and the piece overflows: take just enough of
            // it to land the buffer in [min, max].
            let lo = byte_offset(rest, self.min - self.buf_chars);
            let hi = byte_offset(rest, self.max - self.buf_chars);
            let window = &rest[..hi];
            let cut = window
                .rfind("\n\n")
                .map(|i| i + 2)
                .filter(|&c| c >= lo)
                .or_else(|| window.rfind('\n').map(|i| i + 1).filter(|&c| c >= lo))
                .unwrap_or_else(|| {
                    *hard_cuts += 1;
                    tracing::warn!(
                        max_chars = self.max,
                        "hard cut: no line boundary within the merge window"
                    );
                    hi
                });

            let head = &rest[..cut];
            self.append(head, char_len(head));
            self.emit();
            rest = &rest[cut..];
        }
    }

    fn append(&mut self, text: &str, chars: usize) {
        self.buf.push_str(text);
        self.buf_chars += chars;
    }

    fn emit(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            ordinal: self.chunks.len(),
            text: std::mem::take(&mut self.buf),
            char_len: self.buf_chars,
            heading: self.heading.take(),
        });
        self.buf_chars = 0;
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.emit();
        self.chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `n`-th character of `s` (or `s.len()` past the end).
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(level: usize, min: usize, max: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_header_level: level,
            min_chunk_chars: min,
            max_chunk_chars: max,
        }
    }

    fn paragraphs(prefix: &str, count: usize, len: usize) -> String {
        (0..count)
            .map(|i| {
                let head = format!("{} {} ", prefix, i);
                let fill = "x".repeat(len.saturating_sub(head.len()));
                format!("{}{}", head, fill)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn assert_invariants(text: &str, doc: &ChunkedDocument, config: &ChunkingConfig) {
        let joined: String = doc.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text, "chunks must reproduce the input");

        let last = doc.chunks.len().saturating_sub(1);
        for (i, chunk) in doc.chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert_eq!(chunk.char_len, chunk.text.chars().count());
            assert!(
                chunk.char_len <= config.max_chunk_chars,
                "chunk {} has {} chars",
                i,
                chunk.char_len
            );
            if i != last {
                assert!(
                    chunk.char_len >= config.min_chunk_chars,
                    "chunk {} has {} chars",
                    i,
                    chunk.char_len
                );
            }
        }
    }

    #[test]
    fn test_empty_and_whitespace_yield_no_chunks() {
        let c = cfg(3, 10, 100);
        assert!(chunk_markdown("", &c).is_empty());
        assert!(chunk_markdown(" \n\n\t\n", &c).is_empty());
    }

    #[test]
    fn test_short_document_single_chunk() {
        let c = cfg(3, 400, 1500);
        let text = "# Title\n\nJust a little text.\n";
        let doc = chunk_markdown(text, &c);
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].text, text);
        assert_eq!(doc.chunks[0].heading.as_deref(), Some("Title"));
        assert_eq!(doc.hard_cuts, 0);
    }

    #[test]
    fn test_no_headers_is_one_section() {
        let c = cfg(3, 100, 300);
        let text = paragraphs("para", 10, 80);
        let doc = chunk_markdown(&text, &c);
        assert!(doc.chunks.len() > 1);
        assert!(doc.chunks.iter().all(|ch| ch.heading.is_none()));
        assert_invariants(&text, &doc, &c);
        assert_eq!(doc.hard_cuts, 0);
    }

    #[test]
    fn test_five_thousand_chars_two_headers() {
        let c = cfg(3, 400, 1500);
        let text = format!(
            "# Getting started\n\n{}\n\n## Configuration\n\n{}\n",
            paragraphs("start", 20, 120),
            paragraphs("config", 20, 120)
        );
        assert!(text.chars().count() >= 4900);
        let doc = chunk_markdown(&text, &c);
        assert!(doc.chunks.len() >= 4, "got {} chunks", doc.chunks.len());
        assert_invariants(&text, &doc, &c);
        assert_eq!(doc.hard_cuts, 0);
        assert!(doc.chunks[0].text.starts_with("# Getting started"));
        assert!(doc
            .chunks
            .iter()
            .any(|ch| ch.text.starts_with("## Configuration")));
    }

    #[test]
    fn test_headers_deeper_than_level_are_text() {
        let text = "# A\n\nalpha\n\n### Deep\n\ndeep text\n\n# B\n\nbeta\n";
        let sections = split_sections(text, 2);
        let titles: Vec<_> = sections.iter().map(|s| s.heading.clone()).collect();
        assert_eq!(titles, vec![Some("A".to_string()), Some("B".to_string())]);
        assert!(sections[0].text.contains("### Deep"));

        let sections = split_sections(text, 3);
        assert_eq!(sections.len(), 3);
    }

    #[test]
    fn test_preamble_is_its_own_section() {
        let text = "intro line\n\n# Title\n\nbody\n";
        let sections = split_sections(text, 3);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, None);
        assert_eq!(sections[0].text, "intro line\n\n");
        assert_eq!(sections[1].heading.as_deref(), Some("Title"));
    }

    #[test]
    fn test_fenced_hash_lines_are_not_headers() {
        let text = "# Setup\n\n```bash\n# install deps\nmake\n```\n\n~~~\n# also code\n~~~\n\n# Next\n";
        let sections = split_sections(text, 3);
        let titles: Vec<_> = sections
            .iter()
            .filter_map(|s| s.heading.as_deref())
            .collect();
        assert_eq!(titles, vec!["Setup", "Next"]);
    }

    #[test]
    fn test_header_parsing() {
        assert_eq!(parse_header("## Title ##\n", 3), Some((2, "Title".into())));
        assert_eq!(parse_header("#hashtag\n", 3), None);
        assert_eq!(parse_header("#### Too deep\n", 3), None);
        assert_eq!(parse_header("#   \n", 3), None);
        assert_eq!(parse_header("#\tTabbed\n", 3), Some((1, "Tabbed".into())));
    }

    #[test]
    fn test_oversized_paragraph_is_hard_cut() {
        let c = cfg(3, 50, 200);
        let text = "y".repeat(650);
        let doc = chunk_markdown(&text, &c);
        assert_eq!(doc.chunks.len(), 4);
        assert_eq!(doc.hard_cuts, 3);
        assert_invariants(&text, &doc, &c);
        assert_eq!(doc.chunks[3].char_len, 50);
    }

    #[test]
    fn test_oversized_section_prefers_paragraph_boundary() {
        let c = cfg(3, 10, 100);
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let doc = chunk_markdown(&text, &c);
        assert_eq!(doc.hard_cuts, 0);
        assert_eq!(doc.chunks.len(), 2);
        assert_eq!(doc.chunks[0].text, format!("{}\n\n", "a".repeat(60)));
        assert_invariants(&text, &doc, &c);
    }

    #[test]
    fn test_small_sections_are_merged() {
        let c = cfg(2, 60, 500);
        let text = "# One\n\nshort\n\n# Two\n\nshort\n\n# Three\n\nshort\n\n# Four\n\nshort\n";
        let doc = chunk_markdown(text, &c);
        assert!(doc.chunks.len() < 4);
        assert_invariants(text, &doc, &c);
        assert_eq!(doc.chunks[0].heading.as_deref(), Some("One"));
    }

    #[test]
    fn test_merge_splits_next_piece_to_stay_in_bounds() {
        let c = cfg(1, 100, 150);
        let text = format!(
            "# Small\n\nabc\n\n# Big\n\n{}\n{}\n",
            "p".repeat(85),
            "q".repeat(50)
        );
        let doc = chunk_markdown(&text, &c);
        assert_invariants(&text, &doc, &c);
        assert_eq!(doc.hard_cuts, 0);
    }

    #[test]
    fn test_multibyte_text_cuts_on_char_boundaries() {
        let c = cfg(3, 20, 50);
        let text = "é".repeat(173);
        let doc = chunk_markdown(&text, &c);
        assert_invariants(&text, &doc, &c);
        assert!(doc.chunks.iter().all(|ch| ch.char_len <= 50));
    }

    #[test]
    fn test_deterministic() {
        let c = cfg(3, 100, 400);
        let text = format!("# A\n\n{}\n\n## B\n\n{}", paragraphs("a", 9, 90), paragraphs("b", 7, 70));
        let first = chunk_markdown(&text, &c);
        let second = chunk_markdown(&text, &c);
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(first.hard_cuts, second.hard_cuts);
    }
}
