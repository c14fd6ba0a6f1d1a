//! Typed error hierarchy for the convoy scheduler.
//!
//! Two top-level enums cover the two failure domains:
//! - `GraphError` — fatal configuration errors caught at graph build time
//! - `RunError` — run-level failures from the wave coordinator
//!
//! Per-ticket failures (processing errors, merge conflicts) are not errors at
//! this level; they are recorded in `WorkResult`/`MergeQueueEntry` and the
//! run report, and the run continues.

use crate::dag::TicketId;
use thiserror::Error;

fn join_ids(ids: &[TicketId]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fatal errors from ticket graph construction.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("ticket #{ticket} depends on #{dependency}, which is not in the ticket set")]
    UnknownTicketReference { ticket: TicketId, dependency: TicketId },

    #[error("dependency spec names ticket #{ticket}, which is not in the ticket set")]
    UnknownTicket { ticket: TicketId },

    #[error("dependency cycle detected among tickets: {}", join_ids(.members))]
    CyclicDependency { members: Vec<TicketId> },

    #[error("duplicate ticket #{ticket} in the ticket set")]
    DuplicateTicket { ticket: TicketId },

    #[error("invalid ticket id '{token}'")]
    InvalidTicketId { token: String },

    #[error("invalid dependency pair '{pair}': expected 'child:parent'")]
    InvalidDependencyPair { pair: String },
}

/// Errors from the run coordinator.
#[derive(Debug, Error)]
pub enum RunError {
    /// Defensive invariant violation: the scheduler returned an empty wave
    /// while non-terminal tickets remain. Unreachable given correct skip
    /// propagation.
    #[error("scheduling stalled: no runnable wave but tickets remain unfinished: {}", join_ids(.remaining))]
    SchedulingStalled { remaining: Vec<TicketId> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reference_names_both_tickets() {
        let err = GraphError::UnknownTicketReference {
            ticket: TicketId(197),
            dependency: TicketId(999),
        };
        let msg = err.to_string();
        assert!(msg.contains("#197"));
        assert!(msg.contains("#999"));
    }

    #[test]
    fn cycle_error_lists_members() {
        let err = GraphError::CyclicDependency {
            members: vec![TicketId(1), TicketId(2), TicketId(3)],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected among tickets: #1, #2, #3"
        );
    }

    #[test]
    fn stalled_error_lists_remaining() {
        let err = RunError::SchedulingStalled {
            remaining: vec![TicketId(7), TicketId(8)],
        };
        let msg = err.to_string();
        assert!(msg.contains("stalled"));
        assert!(msg.contains("#7, #8"));
    }

    #[test]
    fn run_error_wraps_anyhow() {
        let err: RunError = anyhow::anyhow!("fetch failed").into();
        assert!(matches!(err, RunError::Other(_)));
        assert_eq!(err.to_string(), "fetch failed");
    }
}
