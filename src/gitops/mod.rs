//! Git integration backend for the merge queue.
//!
//! Repo-level operations (checkout, pull, merge, fetch, push) shell out to
//! the `git` binary; workspace-level change inspection uses libgit2 (see
//! `tracker`). The backend is a trait so the merge queue and coordinator can
//! be tested against a scripted double.

mod tracker;
mod worktree;

pub use tracker::ChangeTracker;
pub use worktree::GitWorktrees;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

/// Outcome of merging one branch into the base branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeState {
    Merged,
    Conflict { detail: String },
}

/// Git operations the merge queue needs from the shared repository.
///
/// Implementations are NOT required to be safe for concurrent merges; the
/// merge queue is strictly sequential and is the only caller that mutates
/// the base branch.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Check out the base branch and bring it up to date with the remote.
    async fn prepare_base(&self, base: &str) -> Result<()>;

    /// Merge `branch` into the currently checked-out base branch.
    ///
    /// A failed merge is aborted and reported as `Conflict`, leaving the
    /// base branch untouched.
    async fn merge(&self, branch: &str, base: &str) -> Result<MergeState>;

    /// Fetch the remote so subsequent merges see the latest integrated state.
    async fn fetch_remote(&self) -> Result<()>;

    /// Publish the integrated base branch to the remote.
    async fn push(&self, base: &str) -> Result<()>;
}

/// `git`-subprocess backend operating on the main repository directory.
pub struct GitCli {
    repo_dir: PathBuf,
    remote: String,
    dry_run: bool,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: impl Into<String>, dry_run: bool) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.into(),
            dry_run,
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .with_context(|| format!("failed to run git {}", args.join(" ")))
    }

    async fn run_git_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.run_git(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn prepare_base(&self, base: &str) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would check out and pull {base}");
            return Ok(());
        }
        self.run_git_checked(&["checkout", base]).await?;
        self.run_git_checked(&["pull", &self.remote, base]).await
    }

    async fn merge(&self, branch: &str, base: &str) -> Result<MergeState> {
        if self.dry_run {
            info!("[dry-run] would merge {branch} into {base}");
            return Ok(MergeState::Merged);
        }

        let message = format!("Merge {branch}");
        let output = self
            .run_git(&["merge", "--no-ff", "-m", &message, branch])
            .await?;

        if output.status.success() {
            return Ok(MergeState::Merged);
        }

        // Leave the base branch clean before reporting the conflict.
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        self.run_git(&["merge", "--abort"]).await.ok();

        let detail = if stderr.is_empty() { stdout } else { stderr };
        Ok(MergeState::Conflict { detail })
    }

    async fn fetch_remote(&self) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would fetch {}", self.remote);
            return Ok(());
        }
        self.run_git_checked(&["fetch", &self.remote]).await
    }

    async fn push(&self, base: &str) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would push {base} to {}", self.remote);
            return Ok(());
        }
        self.run_git_checked(&["push", &self.remote, base]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_backend_is_inert() {
        // Points at a directory with no git repo; dry-run must never touch it.
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path(), "origin", true);

        git.prepare_base("main").await.unwrap();
        assert_eq!(
            git.merge("convoy/ticket-1", "main").await.unwrap(),
            MergeState::Merged
        );
        git.fetch_remote().await.unwrap();
        git.push("main").await.unwrap();
    }

    #[tokio::test]
    async fn run_git_reports_failure_detail() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path(), "origin", false);
        // Not a repository: status must be non-zero and surfaced as an error.
        let err = git.run_git_checked(&["status"]).await.unwrap_err();
        assert!(format!("{err:#}").contains("git status"));
    }
}
