//! # Doc Corpus
//!
//! Builds a versioned, chunked corpus of technical documentation for
//! retrieval systems.
//!
//! For every configured (source, version) pair the pipeline syncs a working
//! tree, selects in-scope documentation files, normalizes them to Markdown,
//! splits them into bounded, header-aware chunks and writes one JSON-lines
//! manifest whose records carry deterministic ids and full provenance.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌───────────┐   ┌────────────────┐
//! │  Fetch   │──▶│ Normalize │──▶│  Chunk  │──▶│ Assemble  │──▶│    Manifest    │
//! │ git/path │   │ pandoc+md │   │ headers │   │ ids+dedup │   │ manifest.jsonl │
//! └──────────┘   └───────────┘   └─────────┘   └───────────┘   └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! corpus sources                         # check configured sources
//! corpus build                           # build every (source, version)
//! corpus build --source rust-book --dry-run
//! corpus chunk docs/guide.md             # inspect chunking of one file
//! corpus stats                           # summarize written manifests
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, per-source overrides, validation |
//! | [`models`] | Core data types |
//! | [`exclude`] | Path matcher for excluded directories and in-scope formats |
//! | [`normalize`] | `Normalizer` capability, pandoc adapter, Markdown cleanup |
//! | [`fetch`] | `Fetcher` capability, git and local-directory trees |
//! | [`exec`] | Timeout-bounded external processes |
//! | [`chunk`] | Header-aware bounded chunker |
//! | [`id`] | Deterministic chunk identifiers |
//! | [`assemble`] | Manifest record assembly with deduplication |
//! | [`manifest`] | Atomic manifest writer and reader |
//! | [`pipeline`] | Per-(source, version) coordinator |
//! | [`build`] | Driver over all sources and versions |
//! | [`stats`] | Run statistics and corpus overview |
//! | [`progress`] | Build progress on stderr |
//! | [`sources`] | Source listing and health |

pub mod assemble;
pub mod build;
pub mod chunk;
pub mod config;
pub mod exclude;
pub mod exec;
pub mod fetch;
pub mod id;
pub mod manifest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod sources;
pub mod stats;
