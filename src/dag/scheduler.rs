//! Wave scheduling and skip propagation over the ticket graph.
//!
//! The scheduler owns all node statuses for a run. `next_wave` returns the
//! tickets whose dependencies have all succeeded; tickets blocked by a failed
//! or skipped dependency are marked skipped (transitively) as a side effect
//! and are never dispatched.

use crate::dag::builder::{NodeIndex, TicketGraph, TicketId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Status of a ticket in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting for dependencies to finish
    #[default]
    Pending,
    /// Selected into the current wave, not yet dispatched
    Ready,
    /// Dispatched to the ticket processor
    Running,
    /// Processed successfully
    Succeeded,
    /// Processing or integration failed
    Failed { error: String },
    /// Never dispatched because an ancestor failed or was skipped
    Skipped,
}

impl TicketStatus {
    /// Check if the ticket is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. } | Self::Skipped)
    }

    /// Check if the ticket succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Check if the ticket blocks its dependents from ever running.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped)
    }
}

/// A node in the graph: a ticket with its current status.
#[derive(Debug, Clone)]
pub struct TicketNode {
    pub id: TicketId,
    pub status: TicketStatus,
    pub index: NodeIndex,
}

/// Computes execution waves and tracks per-ticket status for one run.
#[derive(Debug)]
pub struct WaveScheduler {
    graph: TicketGraph,
    nodes: Vec<TicketNode>,
}

impl WaveScheduler {
    pub fn new(graph: TicketGraph) -> Self {
        let nodes = graph
            .tickets()
            .iter()
            .enumerate()
            .map(|(index, &id)| TicketNode {
                id,
                status: TicketStatus::Pending,
                index,
            })
            .collect();
        Self { graph, nodes }
    }

    pub fn ticket_count(&self) -> usize {
        self.graph.len()
    }

    pub fn graph(&self) -> &TicketGraph {
        &self.graph
    }

    pub fn nodes(&self) -> &[TicketNode] {
        &self.nodes
    }

    /// Get a node by its ticket id.
    pub fn node(&self, id: TicketId) -> Option<&TicketNode> {
        self.graph.index_of(id).and_then(|i| self.nodes.get(i))
    }

    fn set_status(&mut self, id: TicketId, status: TicketStatus) {
        if let Some(idx) = self.graph.index_of(id) {
            self.nodes[idx].status = status;
        }
    }

    /// Compute the full wave partition ignoring statuses (plan preview).
    ///
    /// Each wave lists the tickets whose dependencies are all in earlier
    /// waves, ascending by id. The graph is acyclic by construction, so this
    /// always covers every ticket.
    pub fn compute_waves(&self) -> Vec<Vec<TicketId>> {
        let mut waves = Vec::new();
        let mut done: HashSet<NodeIndex> = HashSet::new();

        while done.len() < self.graph.len() {
            let ready: Vec<NodeIndex> = (0..self.graph.len())
                .filter(|i| !done.contains(i))
                .filter(|&i| self.graph.dependencies(i).iter().all(|d| done.contains(d)))
                .collect();
            if ready.is_empty() {
                break;
            }
            done.extend(ready.iter().copied());
            waves.push(ready.into_iter().map(|i| self.graph.ticket(i)).collect());
        }

        waves
    }

    /// Compute the next wave of runnable tickets, ascending by id.
    ///
    /// Side effect: any non-terminal ticket with a failed or skipped
    /// dependency is marked `Skipped` (transitively, through its own
    /// dependents) and is not returned. Returned tickets transition to
    /// `Ready`. An empty result means either the run is complete or, if
    /// non-terminal tickets remain, that scheduling has stalled — the caller
    /// treats the latter as a fatal invariant violation.
    pub fn next_wave(&mut self) -> Vec<TicketId> {
        // Skip pass first so a blocked ticket never lands in the wave below.
        for index in 0..self.nodes.len() {
            let status = &self.nodes[index].status;
            if status.is_terminal() || *status == TicketStatus::Running {
                continue;
            }
            let blocked = self
                .graph
                .dependencies(index)
                .iter()
                .any(|&d| self.nodes[d].status.blocks_dependents());
            if blocked {
                self.nodes[index].status = TicketStatus::Skipped;
                self.skip_dependents(index);
            }
        }

        let mut wave = Vec::new();
        for index in 0..self.nodes.len() {
            match self.nodes[index].status {
                TicketStatus::Pending | TicketStatus::Ready => {}
                _ => continue,
            }
            let satisfied = self
                .graph
                .dependencies(index)
                .iter()
                .all(|&d| self.nodes[d].status.is_success());
            if satisfied {
                self.nodes[index].status = TicketStatus::Ready;
                wave.push(self.nodes[index].id);
            }
        }
        wave
    }

    /// Mark a ticket as dispatched.
    pub fn mark_running(&mut self, id: TicketId) {
        self.set_status(id, TicketStatus::Running);
    }

    /// Mark a ticket as successfully processed.
    pub fn mark_succeeded(&mut self, id: TicketId) {
        self.set_status(id, TicketStatus::Succeeded);
    }

    /// Mark a ticket as failed without touching its dependents.
    ///
    /// Most callers want `propagate_failure` instead.
    pub fn mark_failed(&mut self, id: TicketId, error: &str) {
        self.set_status(
            id,
            TicketStatus::Failed {
                error: error.to_string(),
            },
        );
    }

    /// Record a failure and skip every transitive dependent.
    ///
    /// The node itself is marked `Failed` unless already terminal (a merge
    /// failure arrives after the node succeeded processing — the failure
    /// still has to block dependents). Dependents are marked `Skipped`
    /// unless they already succeeded.
    pub fn propagate_failure(&mut self, id: TicketId, error: &str) {
        let Some(index) = self.graph.index_of(id) else {
            return;
        };
        match self.nodes[index].status {
            TicketStatus::Skipped | TicketStatus::Failed { .. } => {}
            _ => {
                self.nodes[index].status = TicketStatus::Failed {
                    error: error.to_string(),
                };
            }
        }
        self.skip_dependents(index);
    }

    fn skip_dependents(&mut self, index: NodeIndex) {
        let dependents: Vec<NodeIndex> = self.graph.dependents(index).to_vec();
        for dep_idx in dependents {
            if !self.nodes[dep_idx].status.is_terminal() {
                self.nodes[dep_idx].status = TicketStatus::Skipped;
                self.skip_dependents(dep_idx);
            }
        }
    }

    /// Check if every ticket reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_terminal())
    }

    /// Tickets not yet in a terminal state, ascending.
    pub fn remaining(&self) -> Vec<TicketId> {
        self.nodes
            .iter()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.id)
            .collect()
    }

    /// Tickets that ended skipped, ascending.
    pub fn skipped(&self) -> Vec<TicketId> {
        self.nodes
            .iter()
            .filter(|n| n.status == TicketStatus::Skipped)
            .map(|n| n.id)
            .collect()
    }
}
