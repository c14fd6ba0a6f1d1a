use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(version, about = "Dependency-aware batch ticket scheduler with merge queue")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository directory to operate in (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the wave execution plan without running anything
    Plan {
        /// Comma-separated ticket ids, e.g. "197,198,199"
        #[arg(long)]
        tickets: String,
        /// Dependency pairs "child:parent", e.g. "197:200,198:197"
        #[arg(long, default_value = "")]
        deps: String,
        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Execute tickets in dependency waves and merge the results
    Run {
        /// Comma-separated ticket ids
        #[arg(long)]
        tickets: String,
        /// Dependency pairs "child:parent"
        #[arg(long, default_value = "")]
        deps: String,
        /// Shell command run per ticket in its worktree ({ticket} is substituted)
        #[arg(long)]
        command: Option<String>,
        /// Maximum tickets processed concurrently (default 4)
        #[arg(long)]
        max_parallel: Option<usize>,
        /// Base branch every ticket integrates into (default "main")
        #[arg(long)]
        base: Option<String>,
        /// Remote holding the base branch (default "origin")
        #[arg(long)]
        remote: Option<String>,
        /// Skip publishing the integrated base branch
        #[arg(long)]
        no_push: bool,
        /// Post-merge validation command, run after each wave's merges
        #[arg(long)]
        test_cmd: Option<String>,
        /// Output mode: full, minimal, or json
        #[arg(long, default_value = "full")]
        ui: String,
        /// Log git and process operations instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "convoy=debug" } else { "convoy=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let repo_dir = cli
        .repo_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Plan { tickets, deps, json } => cmd::cmd_plan(&tickets, &deps, json)?,
        Commands::Run {
            tickets,
            deps,
            command,
            max_parallel,
            base,
            remote,
            no_push,
            test_cmd,
            ui,
            dry_run,
        } => {
            let args = cmd::RunArgs {
                tickets,
                deps,
                command,
                max_parallel,
                base,
                remote,
                no_push,
                test_cmd,
                ui,
                dry_run,
            };
            let clean = cmd::cmd_run(repo_dir, cli.verbose, args).await?;
            if !clean {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
