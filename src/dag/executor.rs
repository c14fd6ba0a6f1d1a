//! Bounded-parallel execution of one wave of tickets.
//!
//! Each ticket runs in its own workspace against the external ticket
//! processor. The executor enforces the parallelism cap with a semaphore and
//! waits for every dispatched task to reach a terminal outcome: a failing
//! ticket never cancels its siblings. There are no timeouts at this layer.

use crate::dag::builder::TicketId;
use crate::dag::state::{ExecutionTimer, RunReport, WorkResult};
use crate::merge::MergeQueueEntry;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::warn;

/// Events emitted during a run, for progress display and machine output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A wave of tickets has started.
    WaveStarted { wave: usize, tickets: Vec<TicketId> },
    /// A ticket was dispatched to the processor.
    TicketStarted { ticket: TicketId, wave: usize },
    /// A ticket reached a terminal processing outcome.
    TicketCompleted {
        ticket: TicketId,
        result: Box<WorkResult>,
    },
    /// Two tickets in the wave changed the same file.
    OverlapDetected {
        ticket_a: TicketId,
        ticket_b: TicketId,
        path: String,
    },
    /// The merge queue started draining a wave.
    MergeStarted { wave: usize, tickets: Vec<TicketId> },
    /// One merge queue entry finished.
    MergeCompleted {
        wave: usize,
        entry: Box<MergeQueueEntry>,
    },
    /// The post-merge validation command finished.
    ValidationCompleted { wave: usize, passed: bool },
    /// A wave fully completed (execution and integration).
    WaveCompleted {
        wave: usize,
        succeeded: usize,
        failed: usize,
    },
    /// The run finished.
    RunCompleted {
        success: bool,
        report: Box<RunReport>,
    },
}

/// An isolated per-ticket workspace handle.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub ticket: TicketId,
    /// Working directory dedicated to this ticket
    pub path: PathBuf,
    /// Branch the ticket's work lands on
    pub branch: String,
}

/// The external per-ticket worker.
///
/// Implementations must be safe to invoke concurrently for distinct tickets
/// given distinct workspaces. Failures are reported in the returned
/// `WorkResult`, never by panicking.
#[async_trait]
pub trait TicketProcessor: Send + Sync {
    async fn process(&self, ticket: TicketId, workspace: &Workspace) -> WorkResult;
}

/// Provides one isolated workspace per concurrently running ticket.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    async fn acquire(&self, ticket: TicketId) -> Result<Workspace>;
    async fn release(&self, workspace: Workspace) -> Result<()>;
}

/// Runs one wave of tickets with bounded parallelism.
pub struct WaveExecutor {
    max_parallel: usize,
    processor: Arc<dyn TicketProcessor>,
    workspaces: Arc<dyn WorkspaceProvisioner>,
    event_tx: Option<mpsc::Sender<RunEvent>>,
}

impl WaveExecutor {
    pub fn new(
        max_parallel: usize,
        processor: Arc<dyn TicketProcessor>,
        workspaces: Arc<dyn WorkspaceProvisioner>,
    ) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            processor,
            workspaces,
            event_tx: None,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute every ticket in the wave, returning a result per ticket.
    ///
    /// At most `max_parallel` tickets run at any instant; the rest of the
    /// wave queues for a free slot. Returns only when all dispatched tasks
    /// are done (join semantics — no early exit on first failure).
    pub async fn run_wave(
        &self,
        wave: usize,
        tickets: &[TicketId],
    ) -> HashMap<TicketId, WorkResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        let handles: Vec<_> = tickets
            .iter()
            .map(|&ticket| {
                let semaphore = semaphore.clone();
                let processor = self.processor.clone();
                let workspaces = self.workspaces.clone();
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    // Closed only if the executor itself is dropped mid-wave.
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (
                            ticket,
                            WorkResult::failure(ticket, "worker pool closed", Duration::ZERO),
                        );
                    };

                    if let Some(ref tx) = event_tx {
                        tx.send(RunEvent::TicketStarted { ticket, wave }).await.ok();
                    }

                    let result = process_in_workspace(&*processor, &*workspaces, ticket).await;

                    if let Some(ref tx) = event_tx {
                        tx.send(RunEvent::TicketCompleted {
                            ticket,
                            result: Box::new(result.clone()),
                        })
                        .await
                        .ok();
                    }

                    (ticket, result)
                })
            })
            .collect();

        let mut results = HashMap::with_capacity(tickets.len());
        for (i, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok((ticket, result)) => {
                    results.insert(ticket, result);
                }
                Err(join_err) => {
                    // A panicking processor fails its own ticket only.
                    let ticket = tickets[i];
                    warn!(%ticket, error = %join_err, "ticket task panicked");
                    results.insert(
                        ticket,
                        WorkResult::failure(
                            ticket,
                            format!("ticket task panicked: {join_err}"),
                            Duration::ZERO,
                        ),
                    );
                }
            }
        }
        results
    }
}

/// Acquire a workspace, process the ticket, release the workspace.
async fn process_in_workspace(
    processor: &dyn TicketProcessor,
    workspaces: &dyn WorkspaceProvisioner,
    ticket: TicketId,
) -> WorkResult {
    let timer = ExecutionTimer::start();

    let workspace = match workspaces.acquire(ticket).await {
        Ok(ws) => ws,
        Err(e) => {
            return WorkResult::failure(
                ticket,
                format!("workspace setup failed: {e:#}"),
                timer.elapsed(),
            );
        }
    };

    let result = processor.process(ticket, &workspace).await;

    if let Err(e) = workspaces.release(workspace).await {
        warn!(%ticket, error = %format!("{e:#}"), "workspace release failed");
    }

    result
}
