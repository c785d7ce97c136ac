//! Working-tree acquisition.
//!
//! The pipeline never talks to version control directly. It asks a
//! [`Fetcher`] for a [`WorkingTree`] (root directory + revision id) per
//! (source, version) pair. Two implementations ship:
//!
//! - [`GitFetcher`]: one shallow checkout per pair under `work_root`.
//!   First use clones `--branch <version> --single-branch --depth 1`;
//!   later runs `fetch origin <version>` and `reset --hard FETCH_HEAD`.
//! - [`LocalFetcher`]: uses a source's configured `path` as-is.
//!
//! Every git invocation is bounded by the configured sync timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::SourceConfig;
use crate::exec::{run_command, ExecError};
use crate::models::WorkingTree;

/// Revision reported when none can be determined.
pub const UNKNOWN_REVISION: &str = "unknown";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("source '{0}' has no {1} configured")]
    MissingOrigin(String, &'static str),

    #[error("working tree does not exist: {0}")]
    MissingTree(PathBuf),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &SourceConfig, version: &str) -> Result<WorkingTree, FetchError>;
}

pub struct GitFetcher {
    work_root: PathBuf,
    timeout: Duration,
}

impl GitFetcher {
    pub fn new(work_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_root: work_root.into(),
            timeout,
        }
    }

    /// Checkout directory for one pair: `<work_root>/<source>/<version>`.
    pub fn checkout_dir(&self, source_id: &str, version: &str) -> PathBuf {
        self.work_root
            .join(source_id)
            .join(version.replace(['/', '\\'], "-"))
    }

    async fn git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, FetchError> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let output = run_command(cmd, None, self.timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn clone_repo(&self, url: &str, version: &str, dest: &Path) -> Result<(), FetchError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let dest_str = dest.to_string_lossy();
        self.git(
            &[
                "clone",
                "--branch",
                version,
                "--single-branch",
                "--depth",
                "1",
                url,
                &dest_str,
            ],
            None,
        )
        .await?;
        Ok(())
    }

    async fn update(&self, repo_dir: &Path, version: &str) -> Result<(), FetchError> {
        self.git(&["fetch", "--depth", "1", "origin", version], Some(repo_dir))
            .await?;
        self.git(&["reset", "--hard", "FETCH_HEAD"], Some(repo_dir))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(&self, source: &SourceConfig, version: &str) -> Result<WorkingTree, FetchError> {
        let url = source
            .url
            .as_deref()
            .ok_or_else(|| FetchError::MissingOrigin(source.id.clone(), "url"))?;

        let dest = self.checkout_dir(&source.id, version);
        if dest.join(".git").exists() {
            self.update(&dest, version).await?;
        } else {
            self.clone_repo(url, version, &dest).await?;
        }

        let revision = self.git(&["rev-parse", "HEAD"], Some(&dest)).await?;
        Ok(WorkingTree {
            root: dest,
            revision,
        })
    }
}

/// Uses a local directory as the working tree for every version.
pub struct LocalFetcher {
    timeout: Duration,
}

impl LocalFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, source: &SourceConfig, _version: &str) -> Result<WorkingTree, FetchError> {
        let root = source
            .path
            .clone()
            .ok_or_else(|| FetchError::MissingOrigin(source.id.clone(), "path"))?;
        if !root.is_dir() {
            return Err(FetchError::MissingTree(root));
        }

        let revision = local_revision(&root, self.timeout).await;
        Ok(WorkingTree { root, revision })
    }
}

/// `git rev-parse HEAD` inside `root`, or [`UNKNOWN_REVISION`] when the
/// directory is not a repository (or git is unavailable).
async fn local_revision(root: &Path, timeout: Duration) -> String {
    let mut cmd = Command::new("git");
    cmd.args(["rev-parse", "HEAD"]).current_dir(root);
    match run_command(cmd, None, timeout).await {
        Ok(output) if output.status.success() => {
            let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if sha.is_empty() {
                UNKNOWN_REVISION.to_string()
            } else {
                sha
            }
        }
        _ => UNKNOWN_REVISION.to_string(),
    }
}

/// Dispatches to [`GitFetcher`] for `url` sources and [`LocalFetcher`] for
/// `path` sources.
pub struct SourceFetcher {
    git: GitFetcher,
    local: LocalFetcher,
}

impl SourceFetcher {
    pub fn new(work_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            git: GitFetcher::new(work_root, timeout),
            local: LocalFetcher::new(timeout),
        }
    }
}

#[async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, source: &SourceConfig, version: &str) -> Result<WorkingTree, FetchError> {
        if source.url.is_some() {
            self.git.fetch(source, version).await
        } else {
            self.local.fetch(source, version).await
        }
    }
}
