//! TOML configuration for corpus builds.
//!
//! A config file declares where output and checkouts live, a `[defaults]`
//! table of chunking/exclusion settings, and a list of `[[sources]]`. Each
//! source may override any default; [`SourceConfig::chunking`] and
//! [`SourceConfig::exclusion_rules`] resolve the effective values.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exclude::ExclusionRules;
use crate::manifest::version_dir;
use crate::models::TrustTag;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub output_root: PathBuf,
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
    #[serde(default = "default_mirror_markdown")]
    pub mirror_markdown: bool,
}

fn default_work_root() -> PathBuf {
    PathBuf::from("./work")
}
fn default_mirror_markdown() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_header_level")]
    pub max_header_level: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
    #[serde(default = "default_normalize_timeout_secs")]
    pub normalize_timeout_secs: u64,
    #[serde(default = "default_pandoc")]
    pub pandoc: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
            extensions: default_extensions(),
            max_header_level: default_max_header_level(),
            min_chunk_chars: default_min_chunk_chars(),
            max_chunk_chars: default_max_chunk_chars(),
            sync_timeout_secs: default_sync_timeout_secs(),
            normalize_timeout_secs: default_normalize_timeout_secs(),
            pandoc: default_pandoc(),
        }
    }
}

fn default_exclude_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        "build",
        "dist",
        "vendor",
        "__pycache__",
        ".venv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_extensions() -> Vec<String> {
    [
        "md", "mdx", "rst", "adoc", "asciidoc", "xml", "tex", "html", "htm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_header_level() -> usize {
    3
}
fn default_min_chunk_chars() -> usize {
    400
}
fn default_max_chunk_chars() -> usize {
    1500
}
fn default_sync_timeout_secs() -> u64 {
    300
}
fn default_normalize_timeout_secs() -> u64 {
    30
}
fn default_pandoc() -> String {
    "pandoc".to_string()
}

/// One documentation provider. Immutable once loaded.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub id: String,
    pub category: String,
    pub tech: String,
    pub versions: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default, rename = "source")]
    pub trust: TrustTag,
    #[serde(default)]
    pub exclude_dirs: Option<Vec<String>>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub max_header_level: Option<usize>,
    #[serde(default)]
    pub min_chunk_chars: Option<usize>,
    #[serde(default)]
    pub max_chunk_chars: Option<usize>,
}

/// Effective chunker settings for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_header_level: usize,
    pub min_chunk_chars: usize,
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_header_level: default_max_header_level(),
            min_chunk_chars: default_min_chunk_chars(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=6).contains(&self.max_header_level) {
            bail!("max_header_level must be in [1, 6]");
        }
        if self.min_chunk_chars == 0 {
            bail!("min_chunk_chars must be > 0");
        }
        if self.min_chunk_chars > self.max_chunk_chars {
            bail!(
                "min_chunk_chars ({}) must not exceed max_chunk_chars ({})",
                self.min_chunk_chars,
                self.max_chunk_chars
            );
        }
        Ok(())
    }
}

impl SourceConfig {
    pub fn chunking(&self, defaults: &DefaultsConfig) -> ChunkingConfig {
        ChunkingConfig {
            max_header_level: self.max_header_level.unwrap_or(defaults.max_header_level),
            min_chunk_chars: self.min_chunk_chars.unwrap_or(defaults.min_chunk_chars),
            max_chunk_chars: self.max_chunk_chars.unwrap_or(defaults.max_chunk_chars),
        }
    }

    pub fn exclusion_rules(&self, defaults: &DefaultsConfig) -> Result<ExclusionRules> {
        let dirs = self.exclude_dirs.as_ref().unwrap_or(&defaults.exclude_dirs);
        let exts = self.extensions.as_ref().unwrap_or(&defaults.extensions);
        ExclusionRules::new(dirs, exts)
            .with_context(|| format!("Invalid exclusion rules for source '{}'", self.id))
    }

    /// Human-readable origin: the remote URL or the local path.
    pub fn origin(&self) -> String {
        match (&self.url, &self.path) {
            (Some(url), _) => url.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => "-".to_string(),
        }
    }
}

impl Config {
    pub fn find_source(&self, id: &str) -> Result<&SourceConfig> {
        match self.sources.iter().find(|s| s.id == id) {
            Some(source) => Ok(source),
            None => bail!("unknown source: '{}'", id),
        }
    }
}

impl DefaultsConfig {
    /// Chunker settings with no per-source overrides applied.
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            max_header_level: self.max_header_level,
            min_chunk_chars: self.min_chunk_chars,
            max_chunk_chars: self.max_chunk_chars,
        }
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn normalize_timeout(&self) -> Duration {
        Duration::from_secs(self.normalize_timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        bail!("at least one [[sources]] entry is required");
    }

    if config.defaults.sync_timeout_secs == 0 || config.defaults.normalize_timeout_secs == 0 {
        bail!("defaults.sync_timeout_secs and defaults.normalize_timeout_secs must be > 0");
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.id.trim().is_empty() {
            bail!("source id must not be empty");
        }
        if source.id.contains(':') {
            bail!("source id '{}' must not contain ':'", source.id);
        }
        if !seen.insert(source.id.as_str()) {
            bail!("duplicate source id: '{}'", source.id);
        }
        if source.versions.is_empty() {
            bail!("source '{}' must list at least one version", source.id);
        }
        if source.versions.iter().any(|v| v.trim().is_empty()) {
            bail!("source '{}' has an empty version label", source.id);
        }
        match (&source.url, &source.path) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => bail!(
                "source '{}' must set exactly one of `url` or `path`",
                source.id
            ),
        }
        source
            .chunking(&config.defaults)
            .validate()
            .with_context(|| format!("Invalid chunking settings for source '{}'", source.id))?;
        source.exclusion_rules(&config.defaults)?;
    }

    // Version labels are flattened into path components, so distinct labels
    // can still land on the same manifest directory.
    let mut targets: HashMap<PathBuf, (&str, &str)> = HashMap::new();
    for source in &config.sources {
        for version in &source.versions {
            let dir = version_dir(Path::new(""), &source.category, &source.tech, version);
            if let Some((id, other)) = targets.get(&dir) {
                if *id == source.id {
                    bail!(
                        "source '{}' versions '{}' and '{}' both write {}",
                        id,
                        other,
                        version,
                        dir.display()
                    );
                }
                bail!(
                    "sources '{}' and '{}' both write {}",
                    id,
                    source.id,
                    dir.display()
                );
            }
            targets.insert(dir, (source.id.as_str(), version.as_str()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[corpus]
output_root = "./out"

[[sources]]
id = "rust-book"
category = "languages"
tech = "rust"
versions = ["main", "1.75"]
url = "https://github.com/rust-lang/book.git"
"#;

    #[test]
    fn test_defaults_applied() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.corpus.work_root, PathBuf::from("./work"));
        assert!(cfg.corpus.mirror_markdown);
        let src = &cfg.sources[0];
        assert_eq!(src.trust, TrustTag::Official);
        assert_eq!(src.chunking(&cfg.defaults), ChunkingConfig::default());
    }

    #[test]
    fn test_per_source_override() {
        let content = format!("{}max_chunk_chars = 900\nsource = \"community\"\n", BASE);
        let cfg = parse_config(&content).unwrap();
        let chunking = cfg.sources[0].chunking(&cfg.defaults);
        assert_eq!(chunking.max_chunk_chars, 900);
        assert_eq!(chunking.min_chunk_chars, 400);
        assert_eq!(cfg.sources[0].trust, TrustTag::Community);
    }

    #[test]
    fn test_rejects_min_above_max() {
        let content = format!("{}min_chunk_chars = 2000\n", BASE);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_rejects_url_and_path() {
        let content = format!("{}path = \"/tmp/book\"\n", BASE);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_rejects_no_sources() {
        assert!(parse_config("[corpus]\noutput_root = \"./out\"\n").is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let content = format!("{}{}", BASE, BASE.replace("[corpus]\noutput_root = \"./out\"\n", ""));
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_sources_sharing_output_dir() {
        let content = format!(
            "{}\n[[sources]]\nid = \"rust-reference\"\ncategory = \"languages\"\ntech = \"rust\"\nversions = [\"main\"]\nurl = \"https://github.com/rust-lang/reference.git\"\n",
            BASE
        );
        let err = parse_config(&content).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sources 'rust-book' and 'rust-reference' both write"));
        assert!(msg.contains("main"));
    }

    #[test]
    fn test_rejects_versions_flattening_to_same_dir() {
        let content = BASE.replace(
            "versions = [\"main\", \"1.75\"]",
            "versions = [\"release/1.x\", \"release-1.x\"]",
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err
            .to_string()
            .contains("versions 'release/1.x' and 'release-1.x' both write"));
    }

    #[test]
    fn test_accepts_same_tech_with_distinct_versions() {
        let content = format!(
            "{}\n[[sources]]\nid = \"rust-reference\"\ncategory = \"languages\"\ntech = \"rust\"\nversions = [\"1.80\"]\nurl = \"https://github.com/rust-lang/reference.git\"\n",
            BASE
        );
        assert_eq!(parse_config(&content).unwrap().sources.len(), 2);
    }

    #[test]
    fn test_find_source() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.find_source("rust-book").unwrap().tech, "rust");
        assert!(cfg.find_source("python-docs").is_err());
        assert_eq!(cfg.defaults.chunking(), ChunkingConfig::default());
    }
}
