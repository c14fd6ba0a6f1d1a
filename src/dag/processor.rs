//! Top-level run coordinator.
//!
//! Drives the wave loop: compute the next wave, execute it, scan for file
//! overlaps, drain the merge queue, propagate failures, then move on. Wave
//! N+1 never begins before wave N's execution and integration fully
//! complete.

use crate::config::Config;
use crate::dag::builder::TicketId;
use crate::dag::executor::{RunEvent, WaveExecutor};
use crate::dag::scheduler::{TicketStatus, WaveScheduler};
use crate::dag::state::{
    ExecutionTimer, FinalStatus, RunReport, ValidationRecord, WaveTiming, WorkResult,
};
use crate::errors::RunError;
use crate::merge::{MergeOutcome, MergeQueue, detect_file_overlaps};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Coordinator state, advanced strictly in order for each wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    WaveReady,
    WaveRunning,
    WaveIntegrating,
    Draining,
    Done,
}

/// Dependency-aware batch processor with merge queue.
pub struct DagProcessor {
    config: Config,
    scheduler: WaveScheduler,
    executor: WaveExecutor,
    merge_queue: MergeQueue,
    event_tx: Option<mpsc::Sender<RunEvent>>,
    phase: RunPhase,
}

impl DagProcessor {
    pub fn new(
        config: Config,
        scheduler: WaveScheduler,
        executor: WaveExecutor,
        merge_queue: MergeQueue,
    ) -> Self {
        Self {
            config,
            scheduler,
            executor,
            merge_queue,
            event_tx: None,
            phase: RunPhase::Initializing,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Current coordinator phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }

    /// Execute the full run: wave loop, integration, report.
    pub async fn run(&mut self) -> Result<RunReport> {
        let mut report = RunReport::new(self.scheduler.ticket_count());
        let mut wave_index = 0;

        loop {
            self.phase = RunPhase::WaveReady;
            let wave = self.scheduler.next_wave();

            if wave.is_empty() {
                let remaining = self.scheduler.remaining();
                if remaining.is_empty() {
                    break;
                }
                // Unreachable given correct skip propagation; bail loudly
                // rather than spin.
                return Err(RunError::SchedulingStalled { remaining }.into());
            }

            info!(wave = wave_index, tickets = ?wave, "wave starting");
            self.emit(RunEvent::WaveStarted {
                wave: wave_index,
                tickets: wave.clone(),
            })
            .await;

            self.phase = RunPhase::WaveRunning;
            let timer = ExecutionTimer::start();
            for &ticket in &wave {
                self.scheduler.mark_running(ticket);
            }
            let results = self.executor.run_wave(wave_index, &wave).await;

            self.phase = RunPhase::WaveIntegrating;
            let (succeeded, failed) = self.integrate_wave(wave_index, &results, &mut report).await?;

            report.record_wave(WaveTiming {
                wave: wave_index,
                tickets: wave.clone(),
                duration: timer.elapsed(),
            });
            self.emit(RunEvent::WaveCompleted {
                wave: wave_index,
                succeeded,
                failed,
            })
            .await;

            wave_index += 1;
        }

        self.phase = RunPhase::Draining;
        for ticket in self.scheduler.skipped() {
            report.record_status(ticket, FinalStatus::Skipped);
        }
        report.finalize();

        let success = !report.has_failures();
        self.emit(RunEvent::RunCompleted {
            success,
            report: Box::new(report.clone()),
        })
        .await;

        self.phase = RunPhase::Done;
        Ok(report)
    }

    /// Integrate one wave: overlap scan, merge queue, failure propagation,
    /// post-merge validation. Returns (succeeded, failed) counts for the
    /// wave's processing results.
    async fn integrate_wave(
        &mut self,
        wave: usize,
        results: &std::collections::HashMap<TicketId, WorkResult>,
        report: &mut RunReport,
    ) -> Result<(usize, usize)> {
        let mut successes: Vec<WorkResult> =
            results.values().filter(|r| r.is_success()).cloned().collect();
        successes.sort_by_key(|r| r.ticket);

        let mut failures: Vec<&WorkResult> =
            results.values().filter(|r| !r.is_success()).collect();
        failures.sort_by_key(|r| r.ticket);

        for result in &successes {
            self.scheduler.mark_succeeded(result.ticket);
        }

        // Overlap scan is advisory; flagged tickets still merge.
        let overlaps = detect_file_overlaps(&successes);
        for overlap in &overlaps {
            self.emit(RunEvent::OverlapDetected {
                ticket_a: overlap.ticket_a,
                ticket_b: overlap.ticket_b,
                path: overlap.path.clone(),
            })
            .await;
        }
        report.record_overlaps(&overlaps);
        let flagged: HashSet<TicketId> = overlaps
            .iter()
            .flat_map(|o| [o.ticket_a, o.ticket_b])
            .collect();

        if !successes.is_empty() {
            self.emit(RunEvent::MergeStarted {
                wave,
                tickets: successes.iter().map(|r| r.ticket).collect(),
            })
            .await;
        }

        let entries = self.merge_queue.merge_wave(&successes, &flagged).await?;
        for entry in &entries {
            match entry.outcome {
                MergeOutcome::Merged => report.record_status(entry.ticket, FinalStatus::Merged),
                MergeOutcome::ConflictDetected => {
                    report.record_status(entry.ticket, FinalStatus::ConflictDetected);
                }
                MergeOutcome::MergeFailed => {
                    report.record_status(entry.ticket, FinalStatus::MergeFailed);
                    self.scheduler
                        .propagate_failure(entry.ticket, "merge into base branch failed");
                }
            }
            self.emit(RunEvent::MergeCompleted {
                wave,
                entry: Box::new(entry.clone()),
            })
            .await;
        }

        for result in &failures {
            report.record_status(result.ticket, FinalStatus::Failed);
            self.scheduler.propagate_failure(
                result.ticket,
                result.error().unwrap_or("ticket processing failed"),
            );
        }

        if !entries.is_empty()
            && let Some(command) = self.config.test_command.clone()
        {
            let record = self.run_validation(wave, &command).await;
            self.emit(RunEvent::ValidationCompleted {
                wave,
                passed: record.passed,
            })
            .await;
            report.record_validation(record);
        }

        Ok((successes.len(), failures.len()))
    }

    /// Run the post-merge validation command against the updated base
    /// branch. The result is recorded but never blocks the run.
    async fn run_validation(&self, wave: usize, command: &str) -> ValidationRecord {
        if self.config.dry_run {
            info!("[dry-run] would run validation: {command}");
            return ValidationRecord {
                wave,
                command: command.to_string(),
                passed: true,
                exit_code: Some(0),
            };
        }

        debug!(wave, command, "running post-merge validation");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.config.repo_dir)
            .output()
            .await
            .with_context(|| format!("failed to run validation command '{command}'"));

        match output {
            Ok(output) => ValidationRecord {
                wave,
                command: command.to_string(),
                passed: output.status.success(),
                exit_code: output.status.code(),
            },
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "validation command could not be run");
                ValidationRecord {
                    wave,
                    command: command.to_string(),
                    passed: false,
                    exit_code: None,
                }
            }
        }
    }

    /// Final status of a ticket as tracked by the scheduler.
    pub fn ticket_status(&self, id: TicketId) -> Option<&TicketStatus> {
        self.scheduler.node(id).map(|n| &n.status)
    }
}
