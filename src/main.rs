//! # Doc Corpus CLI (`corpus`)
//!
//! The `corpus` binary builds and inspects a versioned documentation corpus.
//!
//! ## Usage
//!
//! ```bash
//! corpus --config ./config/corpus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corpus build` | Sync, normalize, chunk and write manifests for every (source, version) |
//! | `corpus sources` | List configured sources and their health |
//! | `corpus chunk <file>` | Show how one file would be chunked |
//! | `corpus stats` | Summarize the manifests under the output root |
//!
//! ## Examples
//!
//! ```bash
//! # Build everything
//! corpus build --config ./config/corpus.toml
//!
//! # Rebuild one version, reproducibly
//! corpus build --source rust-book --version main --generated-at 2024-01-01T00:00:00Z
//!
//! # See what a build would produce without writing anything
//! corpus build --dry-run
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use doc_corpus::build::{self, BuildArgs, Selection};
use doc_corpus::config::{self, DefaultsConfig};
use doc_corpus::normalize::PandocNormalizer;
use doc_corpus::pipeline;
use doc_corpus::progress::ProgressMode;
use doc_corpus::{sources, stats};

/// Doc Corpus CLI: build a versioned, chunked documentation corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/corpus.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "corpus",
    about = "Build a versioned, chunked corpus of technical documentation",
    version,
    long_about = "Syncs documentation sources at pinned versions, normalizes every in-scope \
    file to Markdown, splits it into bounded header-aware chunks and writes one JSON-lines \
    manifest per (source, version) with deterministic chunk ids."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/corpus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build manifests for every configured (source, version) pair.
    ///
    /// Pairs run sequentially. A failing pair is reported and skipped; the
    /// command fails only when nothing matches the selection or no pair
    /// produced a manifest.
    Build {
        /// Only build this source id.
        #[arg(long)]
        source: Option<String>,

        /// Only build this version label.
        #[arg(long)]
        version: Option<String>,

        /// Process everything but write no files.
        #[arg(long)]
        dry_run: bool,

        /// Timestamp stamped on every record (RFC 3339). Defaults to now.
        #[arg(long, value_parser = build::parse_generated_at)]
        generated_at: Option<chrono::DateTime<chrono::Utc>>,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,
    },

    /// List configured sources and whether they can be synced.
    Sources,

    /// Normalize and chunk a single file, printing every chunk.
    ///
    /// Uses the chunking settings of `--source` when given, otherwise the
    /// configured defaults (or built-in defaults without a config file).
    Chunk {
        file: PathBuf,

        #[arg(long)]
        source: Option<String>,
    },

    /// Summarize the manifests under the output root.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // `chunk` works without a config file unless a source is named. A config
    // file that exists must still parse.
    if let Commands::Chunk { file, source } = &cli.command {
        let loaded = if source.is_none() && !cli.config.exists() {
            None
        } else {
            Some(config::load_config(&cli.config)?)
        };
        let (defaults, chunking) = match (loaded, source) {
            (Some(cfg), Some(id)) => {
                let chunking = cfg.find_source(id)?.chunking(&cfg.defaults);
                (cfg.defaults, chunking)
            }
            (Some(cfg), None) => {
                let chunking = cfg.defaults.chunking();
                (cfg.defaults, chunking)
            }
            (None, _) => {
                let defaults = DefaultsConfig::default();
                let chunking = defaults.chunking();
                (defaults, chunking)
            }
        };
        let timeout = defaults.normalize_timeout();
        let normalizer = PandocNormalizer::new(defaults.pandoc, timeout);
        pipeline::run_chunk(file, &chunking, &normalizer).await?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build {
            source,
            version,
            dry_run,
            generated_at,
            progress,
        } => {
            let args = BuildArgs {
                selection: Selection { source, version },
                dry_run,
                generated_at,
                progress,
            };
            build::run_build(&cfg, args).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Chunk { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
