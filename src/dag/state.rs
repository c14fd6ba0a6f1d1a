//! Run state: per-ticket work results and the aggregate run report.

use crate::dag::builder::TicketId;
use crate::merge::FileOverlap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Result of processing a single ticket, produced once by the ticket
/// processor and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResult {
    /// Ticket id
    pub ticket: TicketId,
    /// Whether processing succeeded
    pub success: bool,
    /// Branch holding the ticket's work (present iff success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Paths changed on the branch, sorted
    pub files_changed: Vec<String>,
    /// Failure detail (present iff failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock processing time
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl WorkResult {
    /// Create a successful result.
    pub fn success(
        ticket: TicketId,
        branch: impl Into<String>,
        files_changed: Vec<String>,
        duration: Duration,
    ) -> Self {
        Self {
            ticket,
            success: true,
            branch: Some(branch.into()),
            files_changed,
            error: None,
            duration,
        }
    }

    /// Create a failed result.
    pub fn failure(ticket: TicketId, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            ticket,
            success: false,
            branch: None,
            files_changed: Vec::new(),
            error: Some(error.into()),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Final per-ticket outcome for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    /// Merged into the base branch cleanly
    Merged,
    /// Merged, but the wave's overlap scan flagged shared files
    ConflictDetected,
    /// Branch could not be merged into the base branch
    MergeFailed,
    /// Ticket processing failed
    Failed,
    /// Never dispatched because an ancestor failed
    Skipped,
}

impl FinalStatus {
    /// Whether this status makes the whole run exit non-zero.
    pub fn is_run_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::MergeFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::ConflictDetected => "conflict_detected",
            Self::MergeFailed => "merge_failed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Timing for one completed wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveTiming {
    pub wave: usize,
    pub tickets: Vec<TicketId>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Outcome of one post-merge validation command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub wave: usize,
    pub command: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Aggregate run report, appended to across waves and finalized at run end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_tickets: usize,
    pub merged: Vec<TicketId>,
    pub conflicted: Vec<TicketId>,
    pub merge_failed: Vec<TicketId>,
    pub failed: Vec<TicketId>,
    pub skipped: Vec<TicketId>,
    pub overlaps: Vec<FileOverlap>,
    pub waves: Vec<WaveTiming>,
    pub validations: Vec<ValidationRecord>,
}

impl RunReport {
    pub fn new(total_tickets: usize) -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            total_tickets,
            merged: Vec::new(),
            conflicted: Vec::new(),
            merge_failed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            overlaps: Vec::new(),
            waves: Vec::new(),
            validations: Vec::new(),
        }
    }

    pub fn record_status(&mut self, ticket: TicketId, status: FinalStatus) {
        match status {
            FinalStatus::Merged => self.merged.push(ticket),
            FinalStatus::ConflictDetected => self.conflicted.push(ticket),
            FinalStatus::MergeFailed => self.merge_failed.push(ticket),
            FinalStatus::Failed => self.failed.push(ticket),
            FinalStatus::Skipped => self.skipped.push(ticket),
        }
    }

    pub fn record_overlaps(&mut self, overlaps: &[FileOverlap]) {
        self.overlaps.extend_from_slice(overlaps);
    }

    pub fn record_wave(&mut self, timing: WaveTiming) {
        self.waves.push(timing);
    }

    pub fn record_validation(&mut self, record: ValidationRecord) {
        self.validations.push(record);
    }

    pub fn finalize(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Whether any ticket ended in a state that should fail the run.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.merge_failed.is_empty()
    }

    /// Tickets integrated into the base branch (clean or flagged).
    pub fn integrated_count(&self) -> usize {
        self.merged.len() + self.conflicted.len()
    }

    /// All (ticket, status) rows, ascending by ticket id.
    pub fn final_statuses(&self) -> Vec<(TicketId, FinalStatus)> {
        let mut rows: Vec<(TicketId, FinalStatus)> = Vec::with_capacity(self.total_tickets);
        rows.extend(self.merged.iter().map(|&t| (t, FinalStatus::Merged)));
        rows.extend(
            self.conflicted
                .iter()
                .map(|&t| (t, FinalStatus::ConflictDetected)),
        );
        rows.extend(
            self.merge_failed
                .iter()
                .map(|&t| (t, FinalStatus::MergeFailed)),
        );
        rows.extend(self.failed.iter().map(|&t| (t, FinalStatus::Failed)));
        rows.extend(self.skipped.iter().map(|&t| (t, FinalStatus::Skipped)));
        rows.sort_by_key(|(t, _)| *t);
        rows
    }
}

/// Tracks wall-clock time for a run or wave.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Serde helpers serializing `Duration` as integer milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
