//! Per-ticket workspace provisioning backed by git worktrees.
//!
//! Each concurrently running ticket gets its own worktree and branch, so
//! parallel tasks never contend on working-directory state. The worktree is
//! removed when the ticket's task finishes; the branch survives for the
//! merge queue.

use crate::dag::{TicketId, Workspace, WorkspaceProvisioner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Provisions one worktree + branch per ticket under the worktree root.
pub struct GitWorktrees {
    repo_dir: PathBuf,
    root: PathBuf,
    branch_prefix: String,
    base_branch: String,
    dry_run: bool,
}

impl GitWorktrees {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        branch_prefix: impl Into<String>,
        base_branch: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            root: root.into(),
            branch_prefix: branch_prefix.into(),
            base_branch: base_branch.into(),
            dry_run,
        }
    }

    fn branch_name(&self, ticket: TicketId) -> String {
        format!("{}{}", self.branch_prefix, ticket)
    }

    fn worktree_path(&self, ticket: TicketId) -> PathBuf {
        self.root.join(format!("ticket-{ticket}"))
    }
}

#[async_trait]
impl WorkspaceProvisioner for GitWorktrees {
    async fn acquire(&self, ticket: TicketId) -> Result<Workspace> {
        let branch = self.branch_name(ticket);
        let path = self.worktree_path(ticket);

        if self.dry_run {
            info!("[dry-run] would create worktree {} on {branch}", path.display());
            return Ok(Workspace { ticket, path, branch });
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create worktree root {}", self.root.display()))?;

        let path_str = path
            .to_str()
            .context("worktree path contains invalid UTF-8")?;

        debug!(%ticket, branch, path = path_str, "creating worktree");
        let output = Command::new("git")
            .args([
                "worktree",
                "add",
                "-b",
                branch.as_str(),
                path_str,
                self.base_branch.as_str(),
            ])
            .current_dir(&self.repo_dir)
            .output()
            .await
            .context("failed to run git worktree add")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git worktree add failed for ticket #{ticket}: {}", stderr.trim());
        }

        Ok(Workspace { ticket, path, branch })
    }

    async fn release(&self, workspace: Workspace) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would remove worktree {}", workspace.path.display());
            return Ok(());
        }

        let output = Command::new("git")
            .args(["worktree", "remove", "--force"])
            .arg(&workspace.path)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .context("failed to run git worktree remove")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "git worktree remove failed for {}: {}",
                workspace.path.display(),
                stderr.trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn have_git() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn init_repo(dir: &std::path::Path) {
        let repo = git2::Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);

        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
        // Stable base branch name regardless of git init defaults.
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("main", &head, true).unwrap();
    }

    #[tokio::test]
    async fn acquire_and_release_real_worktree() {
        if !have_git() {
            eprintln!("git binary not available; skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let worktrees = GitWorktrees::new(
            dir.path(),
            dir.path().join(".convoy/worktrees"),
            "convoy/ticket-",
            "main",
            false,
        );

        let ws = worktrees.acquire(TicketId(42)).await.unwrap();
        assert!(ws.path.exists());
        assert_eq!(ws.branch, "convoy/ticket-42");
        assert!(ws.path.join("README.md").exists());

        worktrees.release(ws.clone()).await.unwrap();
        assert!(!ws.path.exists());
    }

    #[tokio::test]
    async fn acquire_fails_cleanly_outside_a_repo() {
        if !have_git() {
            eprintln!("git binary not available; skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let worktrees = GitWorktrees::new(
            dir.path(),
            dir.path().join("wt"),
            "convoy/ticket-",
            "main",
            false,
        );
        let err = worktrees.acquire(TicketId(1)).await.unwrap_err();
        assert!(err.to_string().contains("ticket #1"));
    }

    #[tokio::test]
    async fn dry_run_provisioner_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let worktrees = GitWorktrees::new(
            dir.path(),
            dir.path().join("wt"),
            "convoy/ticket-",
            "main",
            true,
        );

        let ws = worktrees.acquire(TicketId(7)).await.unwrap();
        assert!(!ws.path.exists());
        worktrees.release(ws).await.unwrap();
    }
}
