//! Changed-file inspection inside a ticket workspace.
//!
//! Answers one question after a ticket's command has run and committed: which
//! paths did this branch change relative to the base branch? Computed as the
//! diff between the merge base and the workspace HEAD, so drift on the base
//! branch does not pollute the answer.

use anyhow::{Context, Result};
use git2::Repository;
use std::collections::BTreeSet;
use std::path::Path;

pub struct ChangeTracker {
    repo: Repository,
}

impl ChangeTracker {
    pub fn open(workspace_dir: &Path) -> Result<Self> {
        let repo = Repository::open(workspace_dir)
            .with_context(|| format!("failed to open git repository at {}", workspace_dir.display()))?;
        Ok(Self { repo })
    }

    /// Paths changed between the merge base with `base_ref` and HEAD, sorted.
    pub fn changed_files(&self, base_ref: &str) -> Result<Vec<String>> {
        let head = self
            .repo
            .head()
            .context("workspace has no HEAD")?
            .peel_to_commit()
            .context("workspace HEAD is not a commit")?;
        let base = self
            .repo
            .revparse_single(base_ref)
            .with_context(|| format!("base ref '{base_ref}' not found"))?
            .peel_to_commit()
            .with_context(|| format!("base ref '{base_ref}' is not a commit"))?;

        let merge_base = self
            .repo
            .merge_base(head.id(), base.id())
            .context("no merge base between workspace HEAD and base ref")?;
        let base_tree = self.repo.find_commit(merge_base)?.tree()?;
        let head_tree = head.tree()?;

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;

        let mut files = BTreeSet::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned());
            if let Some(path) = path {
                files.insert(path);
            }
        }

        Ok(files.into_iter().collect())
    }

    /// Current HEAD SHA (None on an unborn branch).
    pub fn head_sha(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|c| c.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        (dir, repo)
    }

    fn commit_all(repo: &Repository, msg: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    fn checkout_new_branch(repo: &Repository, name: &str) {
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch(name, &head, false).unwrap();
        repo.set_head(&format!("refs/heads/{name}")).unwrap();
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
    }

    #[test]
    fn changed_files_reports_branch_changes_only() {
        let (dir, repo) = setup_repo();
        fs::write(dir.path().join("base.txt"), "base\n").unwrap();
        commit_all(&repo, "init");
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("main", &head, true).unwrap();

        checkout_new_branch(&repo, "convoy/ticket-7");
        fs::write(dir.path().join("feature.txt"), "work\n").unwrap();
        fs::write(dir.path().join("base.txt"), "base\nedited\n").unwrap();
        commit_all(&repo, "ticket work");

        let tracker = ChangeTracker::open(dir.path()).unwrap();
        let files = tracker.changed_files("main").unwrap();
        assert_eq!(files, vec!["base.txt".to_string(), "feature.txt".to_string()]);
    }

    #[test]
    fn changed_files_empty_when_branch_matches_base() {
        let (dir, repo) = setup_repo();
        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        commit_all(&repo, "init");
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("main", &head, true).unwrap();

        checkout_new_branch(&repo, "empty-branch");

        let tracker = ChangeTracker::open(dir.path()).unwrap();
        assert!(tracker.changed_files("main").unwrap().is_empty());
    }

    #[test]
    fn changed_files_errors_on_unknown_base() {
        let (dir, repo) = setup_repo();
        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        commit_all(&repo, "init");

        let tracker = ChangeTracker::open(dir.path()).unwrap();
        let err = tracker.changed_files("no-such-branch").unwrap_err();
        assert!(format!("{err:#}").contains("no-such-branch"));
    }

    #[test]
    fn head_sha_present_after_commit() {
        let (dir, repo) = setup_repo();
        let tracker = ChangeTracker::open(dir.path()).unwrap();
        assert!(tracker.head_sha().is_none());

        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        commit_all(&repo, "init");
        assert_eq!(tracker.head_sha().unwrap().len(), 40);
    }

    #[test]
    fn open_fails_outside_a_repository() {
        let dir = tempdir().unwrap();
        assert!(ChangeTracker::open(dir.path()).is_err());
    }
}
