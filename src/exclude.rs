//! Declarative path eligibility rules.
//!
//! [`ExclusionRules`] decides, from a relative path alone, whether a file
//! belongs to an excluded directory, has an out-of-scope extension, or is
//! eligible for ingestion. It never touches the filesystem, so it can be
//! evaluated against synthetic path lists.
//!
//! Exclusion entries are either bare directory names (`node_modules`), which
//! match at any depth, or glob patterns containing `/` or wildcards
//! (`docs/_build`, `**/generated-*`), which match the directory and
//! everything beneath it.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;

use crate::normalize::Format;

/// Classification of a single relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Eligible(Format),
    Excluded,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct ExclusionRules {
    excluded: GlobSet,
    extensions: BTreeSet<String>,
}

impl ExclusionRules {
    pub fn new(exclude_dirs: &[String], extensions: &[String]) -> Result<Self> {
        let mut patterns = Vec::new();
        for entry in exclude_dirs {
            let entry = entry.trim().trim_matches('/');
            if entry.is_empty() {
                continue;
            }
            if is_glob_like(entry) {
                patterns.push(entry.to_string());
                patterns.push(format!("{}/**", entry));
            } else {
                patterns.push(format!("**/{}/**", entry));
            }
        }

        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            excluded: build_globset(&patterns)?,
            extensions,
        })
    }

    /// Classify a path relative to the working-tree root.
    ///
    /// Backslash separators are accepted and treated as `/`.
    pub fn classify(&self, relative_path: &str) -> PathClass {
        let path = relative_path.replace('\\', "/");
        let path = path.trim_start_matches("./");

        if self.excluded.is_match(path) {
            return PathClass::Excluded;
        }

        let Some(ext) = extension_of(path) else {
            return PathClass::Unsupported;
        };
        if !self.extensions.contains(&ext) {
            return PathClass::Unsupported;
        }
        match Format::from_extension(&ext) {
            Some(format) => PathClass::Eligible(format),
            None => PathClass::Unsupported,
        }
    }
}

fn is_glob_like(entry: &str) -> bool {
    entry.contains(['/', '*', '?', '[', '{'])
}

fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ExclusionRules {
        let dirs: Vec<String> = ["node_modules", "target", ".git", "docs/_build"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let exts: Vec<String> = ["md", ".rst", "HTML"].iter().map(|s| s.to_string()).collect();
        ExclusionRules::new(&dirs, &exts).unwrap()
    }

    #[test]
    fn test_bare_name_matches_any_depth() {
        let r = rules();
        assert_eq!(r.classify("node_modules/pkg/README.md"), PathClass::Excluded);
        assert_eq!(r.classify("web/node_modules/pkg/README.md"), PathClass::Excluded);
        assert_eq!(r.classify(".git/description.md"), PathClass::Excluded);
    }

    #[test]
    fn test_name_must_be_whole_component() {
        let r = rules();
        assert_eq!(
            r.classify("targets/guide.md"),
            PathClass::Eligible(Format::Markdown)
        );
        assert_eq!(
            r.classify("my_target/guide.md"),
            PathClass::Eligible(Format::Markdown)
        );
    }

    #[test]
    fn test_glob_entry_is_anchored() {
        let r = rules();
        assert_eq!(r.classify("docs/_build/index.html"), PathClass::Excluded);
        assert_eq!(
            r.classify("other/docs/_build/index.html"),
            PathClass::Eligible(Format::Html)
        );
    }

    #[test]
    fn test_extension_filter() {
        let r = rules();
        assert_eq!(r.classify("guide/intro.RST"), PathClass::Eligible(Format::Rst));
        assert_eq!(r.classify("src/main.rs"), PathClass::Unsupported);
        assert_eq!(r.classify("Makefile"), PathClass::Unsupported);
        assert_eq!(r.classify("docs/.md"), PathClass::Unsupported);
        // in the format table but not configured for this source
        assert_eq!(r.classify("book/ch1.tex"), PathClass::Unsupported);
    }

    #[test]
    fn test_windows_separators() {
        let r = rules();
        assert_eq!(r.classify("web\\node_modules\\a.md"), PathClass::Excluded);
        assert_eq!(
            r.classify(".\\guide\\a.md"),
            PathClass::Eligible(Format::Markdown)
        );
    }
}
