//! Full pipeline execution — `convoy run`.

use anyhow::{Context, Result};
use convoy::config::Config;
use convoy::dag::{DagProcessor, RunEvent, WaveExecutor, WaveScheduler};
use convoy::gitops::{GitCli, GitWorktrees};
use convoy::merge::MergeQueue;
use convoy::runner::ShellTicketProcessor;
use convoy::ui::{RunUi, UiMode};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Flags for `convoy run`, applied over file configuration.
pub struct RunArgs {
    pub tickets: String,
    pub deps: String,
    pub command: Option<String>,
    pub max_parallel: Option<usize>,
    pub base: Option<String>,
    pub remote: Option<String>,
    pub no_push: bool,
    pub test_cmd: Option<String>,
    pub ui: String,
    pub dry_run: bool,
}

/// Execute the full run. Returns `true` when every ticket integrated
/// cleanly; the caller maps `false` to a non-zero exit code.
pub async fn cmd_run(repo_dir: PathBuf, verbose: bool, args: RunArgs) -> Result<bool> {
    let config = Config::load(repo_dir)?
        .with_max_parallel(args.max_parallel)
        .with_base_branch(args.base)
        .with_remote(args.remote)
        .with_skip_push(args.no_push)
        .with_test_command(args.test_cmd)
        .with_ticket_command(args.command)
        .with_dry_run(args.dry_run)
        .with_verbose(verbose);
    config.validate()?;

    let ticket_command = match &config.ticket_command {
        Some(cmd) => cmd.clone(),
        None if config.dry_run => "true".to_string(),
        None => anyhow::bail!(
            "a ticket command is required: pass --command or set ticket_command in convoy.toml"
        ),
    };

    let graph = super::build_graph(&args.tickets, &args.deps)
        .context("invalid ticket or dependency spec")?;
    let scheduler = WaveScheduler::new(graph);

    // Collaborators behind the trait seams: worktree provisioner, shell
    // ticket processor, git merge backend.
    let workspaces = Arc::new(GitWorktrees::new(
        &config.repo_dir,
        config.worktree_root(),
        config.branch_prefix.as_str(),
        config.base_branch.as_str(),
        config.dry_run,
    ));
    let processor = Arc::new(ShellTicketProcessor::new(
        ticket_command,
        config.base_branch.as_str(),
        config.dry_run,
    ));
    let git = Arc::new(GitCli::new(
        &config.repo_dir,
        config.remote.as_str(),
        config.dry_run,
    ));
    let merge_queue = MergeQueue::new(git, config.base_branch.clone(), config.skip_push);

    let (event_tx, mut event_rx) = mpsc::channel::<RunEvent>(100);

    let mode = UiMode::parse(&args.ui);
    let ui = Arc::new(RunUi::new(mode, verbose));
    ui.print_plan(scheduler.ticket_count(), &scheduler.compute_waves());

    let display_ui = ui.clone();
    let display_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            display_ui.handle_event(&event);
        }
    });

    let executor = WaveExecutor::new(config.max_parallel, processor, workspaces)
        .with_event_channel(event_tx.clone());
    let mut dag = DagProcessor::new(config, scheduler, executor, merge_queue)
        .with_event_channel(event_tx);

    let report = dag.run().await;

    // Drop the coordinator (and with it every event sender) so the display
    // task drains its queue and exits.
    drop(dag);
    display_handle.await.ok();
    let report = report?;

    ui.print_report(&report);
    Ok(!report.has_failures())
}
