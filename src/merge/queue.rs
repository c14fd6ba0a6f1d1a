//! Sequential integration of completed branches into the base branch.
//!
//! The queue is the one place in the run that requires true mutual
//! exclusion: every entry merges into the same shared base branch, so
//! entries are processed strictly one at a time, ascending by ticket id,
//! with a remote refresh after each successful merge. One entry's failure
//! never aborts the rest of the queue.

use crate::dag::{TicketId, WorkResult};
use crate::gitops::{GitBackend, MergeState};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Merge outcome for one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Merged cleanly
    Merged,
    /// Merged, but the overlap scan flagged files shared with a sibling
    ConflictDetected,
    /// Three-way merge failed; branch left unmerged
    MergeFailed,
}

/// One processed entry of the merge queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeQueueEntry {
    pub ticket: TicketId,
    pub branch: String,
    pub files: Vec<String>,
    pub outcome: MergeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Merges a wave's successful branches into the shared base branch.
pub struct MergeQueue {
    git: Arc<dyn GitBackend>,
    base_branch: String,
    skip_push: bool,
}

impl MergeQueue {
    pub fn new(git: Arc<dyn GitBackend>, base_branch: impl Into<String>, skip_push: bool) -> Self {
        Self {
            git,
            base_branch: base_branch.into(),
            skip_push,
        }
    }

    /// Merge the given successful results, strictly sequentially, ascending
    /// by ticket id.
    ///
    /// `flagged` holds tickets the overlap scan marked; they still merge,
    /// but a clean merge is reported as `ConflictDetected` instead of
    /// `Merged`. After the queue drains, the updated base branch is pushed
    /// unless publication is disabled.
    pub async fn merge_wave(
        &self,
        results: &[WorkResult],
        flagged: &HashSet<TicketId>,
    ) -> Result<Vec<MergeQueueEntry>> {
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let mut queue: Vec<&WorkResult> = results.iter().filter(|r| r.is_success()).collect();
        queue.sort_by_key(|r| r.ticket);

        self.git.prepare_base(&self.base_branch).await?;

        let mut entries = Vec::with_capacity(queue.len());
        let mut merged_any = false;

        for result in queue {
            let Some(branch) = result.branch.as_deref() else {
                warn!(ticket = %result.ticket, "successful result without a branch; skipping merge");
                continue;
            };

            let (outcome, detail) = match self.git.merge(branch, &self.base_branch).await {
                Ok(MergeState::Merged) => {
                    merged_any = true;
                    // Refresh before the next entry so it merges against the
                    // latest integrated state.
                    if let Err(e) = self.git.fetch_remote().await {
                        warn!(error = %format!("{e:#}"), "remote refresh failed after merge");
                    }
                    if flagged.contains(&result.ticket) {
                        (MergeOutcome::ConflictDetected, None)
                    } else {
                        (MergeOutcome::Merged, None)
                    }
                }
                Ok(MergeState::Conflict { detail }) => {
                    warn!(ticket = %result.ticket, branch, "merge conflict; branch left unmerged");
                    (MergeOutcome::MergeFailed, Some(detail))
                }
                Err(e) => {
                    let detail = format!("{e:#}");
                    warn!(ticket = %result.ticket, branch, error = %detail, "merge command failed");
                    (MergeOutcome::MergeFailed, Some(detail))
                }
            };

            entries.push(MergeQueueEntry {
                ticket: result.ticket,
                branch: branch.to_string(),
                files: result.files_changed.clone(),
                outcome,
                detail,
            });
        }

        if merged_any && !self.skip_push {
            self.git.push(&self.base_branch).await?;
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted backend recording the exact call sequence.
    struct ScriptedGit {
        conflicts: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGit {
        fn new(conflicting_branches: &[&str]) -> Self {
            Self {
                conflicts: conflicting_branches.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl GitBackend for ScriptedGit {
        async fn prepare_base(&self, base: &str) -> Result<()> {
            self.record(format!("prepare {base}"));
            Ok(())
        }

        async fn merge(&self, branch: &str, base: &str) -> Result<MergeState> {
            self.record(format!("merge {branch} into {base}"));
            if self.conflicts.contains(branch) {
                Ok(MergeState::Conflict {
                    detail: "CONFLICT (content)".to_string(),
                })
            } else {
                Ok(MergeState::Merged)
            }
        }

        async fn fetch_remote(&self) -> Result<()> {
            self.record("fetch".to_string());
            Ok(())
        }

        async fn push(&self, base: &str) -> Result<()> {
            self.record(format!("push {base}"));
            Ok(())
        }
    }

    fn success(ticket: u64) -> WorkResult {
        WorkResult::success(
            TicketId(ticket),
            format!("convoy/ticket-{ticket}"),
            vec![format!("src/{ticket}.rs")],
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn merges_ascending_with_fetch_between_and_final_push() {
        let git = Arc::new(ScriptedGit::new(&[]));
        let queue = MergeQueue::new(git.clone(), "main", false);

        // Deliberately out of order; the queue must sort.
        let results = vec![success(202), success(199), success(201)];
        let entries = queue.merge_wave(&results, &HashSet::new()).await.unwrap();

        let tickets: Vec<u64> = entries.iter().map(|e| e.ticket.0).collect();
        assert_eq!(tickets, vec![199, 201, 202]);
        assert!(entries.iter().all(|e| e.outcome == MergeOutcome::Merged));

        assert_eq!(
            git.calls(),
            vec![
                "prepare main",
                "merge convoy/ticket-199 into main",
                "fetch",
                "merge convoy/ticket-201 into main",
                "fetch",
                "merge convoy/ticket-202 into main",
                "fetch",
                "push main",
            ]
        );
    }

    #[tokio::test]
    async fn conflict_does_not_abort_the_queue() {
        let git = Arc::new(ScriptedGit::new(&["convoy/ticket-2"]));
        let queue = MergeQueue::new(git.clone(), "main", false);

        let results = vec![success(1), success(2), success(3)];
        let entries = queue.merge_wave(&results, &HashSet::new()).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].outcome, MergeOutcome::Merged);
        assert_eq!(entries[1].outcome, MergeOutcome::MergeFailed);
        assert!(entries[1].detail.as_deref().unwrap().contains("CONFLICT"));
        assert_eq!(entries[2].outcome, MergeOutcome::Merged);

        // No fetch after the conflicting entry, and the push still happens
        // because other entries merged.
        let calls = git.calls();
        assert!(calls.contains(&"push main".to_string()));
        assert_eq!(calls.iter().filter(|c| c.as_str() == "fetch").count(), 2);
    }

    #[tokio::test]
    async fn flagged_tickets_report_conflict_detected_but_still_merge() {
        let git = Arc::new(ScriptedGit::new(&[]));
        let queue = MergeQueue::new(git.clone(), "main", false);

        let flagged: HashSet<TicketId> = [TicketId(1), TicketId(2)].into_iter().collect();
        let results = vec![success(1), success(2)];
        let entries = queue.merge_wave(&results, &flagged).await.unwrap();

        assert!(entries
            .iter()
            .all(|e| e.outcome == MergeOutcome::ConflictDetected));
        assert_eq!(git.calls().iter().filter(|c| c.starts_with("merge")).count(), 2);
    }

    #[tokio::test]
    async fn skip_push_suppresses_publication() {
        let git = Arc::new(ScriptedGit::new(&[]));
        let queue = MergeQueue::new(git.clone(), "main", true);

        queue.merge_wave(&[success(1)], &HashSet::new()).await.unwrap();
        assert!(!git.calls().iter().any(|c| c.starts_with("push")));
    }

    #[tokio::test]
    async fn nothing_merged_means_no_push() {
        let git = Arc::new(ScriptedGit::new(&["convoy/ticket-1"]));
        let queue = MergeQueue::new(git.clone(), "main", false);

        let entries = queue.merge_wave(&[success(1)], &HashSet::new()).await.unwrap();
        assert_eq!(entries[0].outcome, MergeOutcome::MergeFailed);
        assert!(!git.calls().iter().any(|c| c.starts_with("push")));
    }

    #[tokio::test]
    async fn empty_wave_is_a_no_op() {
        let git = Arc::new(ScriptedGit::new(&[]));
        let queue = MergeQueue::new(git.clone(), "main", false);
        let entries = queue.merge_wave(&[], &HashSet::new()).await.unwrap();
        assert!(entries.is_empty());
        assert!(git.calls().is_empty());
    }
}
