//! Run progress UI.
//!
//! Renders run events in one of three modes:
//! - `full`: progress bars and per-ticket status lines
//! - `minimal`: single-line updates
//! - `json`: one JSON event per line for machine consumption

use crate::dag::{RunEvent, RunReport, TicketId};
use crate::merge::MergeOutcome;
use crate::ui::icons::{CHECK, CLOCK, CROSS, MERGE, RUNNING, WARNING, WAVE};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Json,
}

impl UiMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        }
    }
}

/// Terminal UI consuming `RunEvent`s from the coordinator.
///
/// Used from a single display task that processes events sequentially; the
/// internal mutex only guards the bar map across `&self` methods.
pub struct RunUi {
    mode: UiMode,
    multi: MultiProgress,
    bars: Mutex<HashMap<TicketId, ProgressBar>>,
    verbose: bool,
    term: Term,
}

impl RunUi {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        Self {
            mode,
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            verbose,
            term: Term::stdout(),
        }
    }

    /// Render one event.
    pub fn handle_event(&self, event: &RunEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &RunEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{json}");
        }
    }

    fn handle_minimal(&self, event: &RunEvent) {
        match event {
            RunEvent::WaveStarted { wave, tickets } => {
                let _ = writeln!(&self.term, "wave {}: {}", wave, join_tickets(tickets));
            }
            RunEvent::TicketCompleted { ticket, result } => {
                if result.is_success() {
                    let _ = writeln!(&self.term, "ok #{ticket}");
                } else {
                    let _ = writeln!(
                        &self.term,
                        "failed #{ticket} ({})",
                        result.error().unwrap_or("unknown error")
                    );
                }
            }
            RunEvent::MergeCompleted { entry, .. } => {
                let _ = writeln!(&self.term, "{} #{}", entry_label(entry.outcome), entry.ticket);
            }
            RunEvent::RunCompleted { success, report } => {
                let _ = writeln!(
                    &self.term,
                    "done: {}/{} integrated {}",
                    report.integrated_count(),
                    report.total_tickets,
                    if *success { "ok" } else { "failed" }
                );
            }
            _ => {}
        }
    }

    fn handle_full(&self, event: &RunEvent) {
        match event {
            RunEvent::WaveStarted { wave, tickets } => {
                self.multi.println("").ok();
                self.multi
                    .println(format!(
                        "{} {} Wave {}: {}",
                        WAVE,
                        style("═".repeat(40)).cyan(),
                        style(wave).yellow().bold(),
                        style(join_tickets(tickets)).dim()
                    ))
                    .ok();
            }
            RunEvent::TicketStarted { ticket, .. } => self.on_ticket_started(*ticket),
            RunEvent::TicketCompleted { ticket, result } => {
                let mut bars = self.bars.lock().unwrap();
                if let Some(bar) = bars.remove(ticket) {
                    if result.is_success() {
                        bar.finish_with_message(format!(
                            "{} done in {} ({} files)",
                            CHECK,
                            format_duration(result.duration),
                            result.files_changed.len()
                        ));
                    } else {
                        bar.finish_with_message(format!(
                            "{} failed: {}",
                            CROSS,
                            result.error().unwrap_or("unknown error")
                        ));
                    }
                }
            }
            RunEvent::OverlapDetected {
                ticket_a,
                ticket_b,
                path,
            } => {
                self.multi
                    .println(format!(
                        "  {} #{} and #{} both modify {}",
                        WARNING,
                        style(ticket_a).yellow(),
                        style(ticket_b).yellow(),
                        style(path).bold()
                    ))
                    .ok();
            }
            RunEvent::MergeStarted { tickets, .. } => {
                self.multi
                    .println(format!(
                        "  {} merging {} branch(es) into base",
                        MERGE,
                        tickets.len()
                    ))
                    .ok();
            }
            RunEvent::MergeCompleted { entry, .. } => {
                let line = match entry.outcome {
                    MergeOutcome::Merged => {
                        format!("  {} #{} merged", CHECK, style(entry.ticket).green())
                    }
                    MergeOutcome::ConflictDetected => format!(
                        "  {} #{} merged with overlap warnings",
                        WARNING,
                        style(entry.ticket).yellow()
                    ),
                    MergeOutcome::MergeFailed => format!(
                        "  {} #{} merge failed: {}",
                        CROSS,
                        style(entry.ticket).red(),
                        entry.detail.as_deref().unwrap_or("conflict")
                    ),
                };
                self.multi.println(line).ok();
            }
            RunEvent::ValidationCompleted { passed, .. } => {
                let status = if *passed {
                    style("passed").green()
                } else {
                    style("FAILED").red()
                };
                self.multi
                    .println(format!("  {} post-merge validation {}", CLOCK, status))
                    .ok();
            }
            RunEvent::WaveCompleted {
                wave,
                succeeded,
                failed,
            } => {
                let icon = if *failed == 0 { CHECK } else { CROSS };
                self.multi
                    .println(format!(
                        "{} Wave {} complete: {} succeeded, {}",
                        icon,
                        wave,
                        style(succeeded).green(),
                        if *failed > 0 {
                            style(format!("{failed} failed")).red().to_string()
                        } else {
                            style("0 failed").dim().to_string()
                        }
                    ))
                    .ok();
            }
            RunEvent::RunCompleted { success, report } => self.on_run_completed(*success, report),
        }
    }

    fn on_ticket_started(&self, ticket: TicketId) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {prefix:.bold} {spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(format!("[#{ticket}]"));
        bar.set_message(format!("{RUNNING} running"));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bars.lock().unwrap().insert(ticket, bar);
    }

    fn on_run_completed(&self, success: bool, report: &RunReport) {
        self.multi.println("").ok();
        self.multi
            .println(format!("{}", style("═".repeat(50)).cyan()))
            .ok();
        if success {
            self.multi
                .println(format!("{} Run {}", CHECK, style("COMPLETE").green().bold()))
                .ok();
        } else {
            self.multi
                .println(format!("{} Run {}", CROSS, style("FAILED").red().bold()))
                .ok();
        }
        if self.verbose {
            self.multi
                .println(format!("  waves: {}", report.waves.len()))
                .ok();
        }
    }

    /// Print the wave plan before execution starts.
    pub fn print_plan(&self, total_tickets: usize, waves: &[Vec<TicketId>]) {
        if self.mode == UiMode::Json {
            return;
        }
        let _ = writeln!(
            &self.term,
            "\nPlan: {} tickets in {} waves",
            style(total_tickets).yellow().bold(),
            style(waves.len()).yellow().bold()
        );
        for (i, wave) in waves.iter().enumerate() {
            let parallel = if wave.len() > 1 {
                format!(" {}", style("(parallel)").dim())
            } else {
                String::new()
            };
            let _ = writeln!(
                &self.term,
                "  wave {}: [{}]{}",
                style(i).cyan(),
                style(join_tickets(wave)).yellow(),
                parallel
            );
        }
        let _ = writeln!(&self.term);
    }

    /// Render the final per-ticket status table.
    pub fn print_report(&self, report: &RunReport) {
        match self.mode {
            UiMode::Json => {
                if let Ok(json) = serde_json::to_string_pretty(report) {
                    let _ = writeln!(&self.term, "{json}");
                }
            }
            _ => {
                let _ = writeln!(&self.term, "{}", render_report_table(report));
            }
        }
    }
}

/// Format the final status table, one row per ticket, ascending by id.
pub fn render_report_table(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<10} {:<18}\n", "ticket", "status"));
    out.push_str(&format!("{:-<10} {:-<18}\n", "", ""));
    for (ticket, status) in report.final_statuses() {
        out.push_str(&format!("{:<10} {:<18}\n", format!("#{ticket}"), status.as_str()));
    }
    out.push_str(&format!(
        "\n{} integrated, {} failed, {} merge-failed, {} skipped\n",
        report.integrated_count(),
        report.failed.len(),
        report.merge_failed.len(),
        report.skipped.len()
    ));
    if !report.overlaps.is_empty() {
        out.push_str(&format!("{} file overlap warning(s)\n", report.overlaps.len()));
    }
    for validation in &report.validations {
        out.push_str(&format!(
            "validation after wave {}: {}\n",
            validation.wave,
            if validation.passed { "passed" } else { "FAILED" }
        ));
    }
    out
}

fn join_tickets(tickets: &[TicketId]) -> String {
    tickets
        .iter()
        .map(|t| format!("#{t}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn entry_label(outcome: MergeOutcome) -> &'static str {
    match outcome {
        MergeOutcome::Merged => "merged",
        MergeOutcome::ConflictDetected => "merged-with-warnings",
        MergeOutcome::MergeFailed => "merge-failed",
    }
}

/// Format a duration for display.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{secs}s")
    } else {
        format!("{}ms", d.as_millis())
    }
}
