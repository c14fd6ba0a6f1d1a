//! Default ticket processor: runs a configured shell command per ticket.
//!
//! The command executes inside the ticket's worktree with `CONVOY_TICKET`
//! set and `{ticket}` substituted; it is expected to commit its work on the
//! workspace branch. Anything more elaborate (agents, RPC workers) plugs in
//! behind the same `TicketProcessor` trait.

use crate::dag::{ExecutionTimer, TicketId, TicketProcessor, Workspace, WorkResult};
use crate::gitops::ChangeTracker;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

const ERROR_TAIL_CHARS: usize = 500;

/// Keep only the tail of a process's output for error reporting.
fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(max_chars.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

/// Runs one shell command per ticket inside its workspace.
pub struct ShellTicketProcessor {
    command: String,
    base_branch: String,
    dry_run: bool,
}

impl ShellTicketProcessor {
    pub fn new(command: impl Into<String>, base_branch: impl Into<String>, dry_run: bool) -> Self {
        Self {
            command: command.into(),
            base_branch: base_branch.into(),
            dry_run,
        }
    }

    fn command_for(&self, ticket: TicketId) -> String {
        self.command.replace("{ticket}", &ticket.to_string())
    }
}

#[async_trait]
impl TicketProcessor for ShellTicketProcessor {
    async fn process(&self, ticket: TicketId, workspace: &Workspace) -> WorkResult {
        let timer = ExecutionTimer::start();
        let command = self.command_for(ticket);

        if self.dry_run {
            info!("[dry-run] would run for #{ticket}: {command}");
            return WorkResult::success(ticket, workspace.branch.clone(), Vec::new(), timer.elapsed());
        }

        debug!(%ticket, command, workspace = %workspace.path.display(), "processing ticket");
        let output = match Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&workspace.path)
            .env("CONVOY_TICKET", ticket.to_string())
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                return WorkResult::failure(
                    ticket,
                    format!("failed to spawn ticket command: {e}"),
                    timer.elapsed(),
                );
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                tail(&stdout, ERROR_TAIL_CHARS)
            } else {
                tail(&stderr, ERROR_TAIL_CHARS)
            };
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return WorkResult::failure(
                ticket,
                format!("ticket command exited with {code}: {detail}"),
                timer.elapsed(),
            );
        }

        let files = match ChangeTracker::open(&workspace.path)
            .and_then(|t| t.changed_files(&self.base_branch))
        {
            Ok(files) => files,
            Err(e) => {
                return WorkResult::failure(
                    ticket,
                    format!("failed to compute changed files: {e:#}"),
                    timer.elapsed(),
                );
            }
        };

        WorkResult::success(ticket, workspace.branch.clone(), files, timer.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn workspace(ticket: u64, path: &Path) -> Workspace {
        Workspace {
            ticket: TicketId(ticket),
            path: path.to_path_buf(),
            branch: format!("convoy/ticket-{ticket}"),
        }
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

    fn setup_branch_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "test").unwrap();
            config.set_str("user.email", "test@test.com").unwrap();
        }
        fs::write(dir.join("base.txt"), "base\n").unwrap();
        commit_all(&repo, "init");
        {
            let head = repo.head().unwrap().peel_to_commit().unwrap();
            repo.branch("main", &head, true).unwrap();
            repo.branch("convoy/ticket-7", &head, true).unwrap();
        }
        repo.set_head("refs/heads/convoy/ticket-7").unwrap();
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
        repo
    }

    #[test]
    fn substitutes_ticket_placeholder() {
        let processor = ShellTicketProcessor::new("do-work {ticket}", "main", false);
        assert_eq!(processor.command_for(TicketId(197)), "do-work 197");
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("hello", 500), "hello");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("  padded  ", 6), "padded");
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code_and_stderr() {
        let dir = tempdir().unwrap();
        let processor = ShellTicketProcessor::new("echo broken >&2; exit 3", "main", false);
        let result = processor.process(TicketId(1), &workspace(1, dir.path())).await;

        assert!(!result.is_success());
        let error = result.error().unwrap();
        assert!(error.contains("exited with 3"));
        assert!(error.contains("broken"));
    }

    #[tokio::test]
    async fn command_sees_ticket_env_var() {
        let dir = tempdir().unwrap();
        let processor =
            ShellTicketProcessor::new("test \"$CONVOY_TICKET\" = 7 || exit 9", "main", false);
        // The repo is needed only after the command succeeds.
        setup_branch_repo(dir.path());

        let result = processor.process(TicketId(7), &workspace(7, dir.path())).await;
        assert!(result.is_success(), "error: {:?}", result.error());
    }

    #[tokio::test]
    async fn successful_command_collects_changed_files() {
        let dir = tempdir().unwrap();
        let repo = setup_branch_repo(dir.path());
        fs::write(dir.path().join("work.txt"), "done\n").unwrap();
        commit_all(&repo, "ticket work");

        let processor = ShellTicketProcessor::new("true", "main", false);
        let result = processor.process(TicketId(7), &workspace(7, dir.path())).await;

        assert!(result.is_success());
        assert_eq!(result.branch.as_deref(), Some("convoy/ticket-7"));
        assert_eq!(result.files_changed, vec!["work.txt".to_string()]);
    }

    #[tokio::test]
    async fn missing_repo_after_success_is_a_failure() {
        let dir = tempdir().unwrap();
        let processor = ShellTicketProcessor::new("true", "main", false);
        let result = processor.process(TicketId(1), &workspace(1, dir.path())).await;

        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("changed files"));
    }

    #[tokio::test]
    async fn dry_run_succeeds_without_executing() {
        let dir = tempdir().unwrap();
        let processor = ShellTicketProcessor::new("exit 1", "main", true);
        let result = processor.process(TicketId(1), &workspace(1, dir.path())).await;
        assert!(result.is_success());
        assert!(result.files_changed.is_empty());
    }
}
