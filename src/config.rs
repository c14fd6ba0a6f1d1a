//! Runtime configuration for convoy.
//!
//! Defaults come from an optional `convoy.toml` in the repository directory;
//! CLI flags override file values. Only the scheduling/integration surface
//! lives here — ticket and dependency specs are parsed by the graph builder.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_PARALLEL: usize = 4;
pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH_PREFIX: &str = "convoy/ticket-";

const CONFIG_FILE: &str = "convoy.toml";

/// Optional file-level configuration (`convoy.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    max_parallel: Option<usize>,
    base_branch: Option<String>,
    remote: Option<String>,
    skip_push: Option<bool>,
    test_command: Option<String>,
    ticket_command: Option<String>,
    branch_prefix: Option<String>,
}

impl FileConfig {
    fn load(repo_dir: &Path) -> Result<Self> {
        let path = repo_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid {}", path.display()))
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Main repository directory (merges and pushes happen here)
    pub repo_dir: PathBuf,
    /// Worker pool size per wave
    pub max_parallel: usize,
    /// Shared branch every ticket integrates into
    pub base_branch: String,
    /// Remote holding the shared branch
    pub remote: String,
    /// Skip publishing the integrated base branch
    pub skip_push: bool,
    /// Post-merge validation command, run after each wave's merge queue
    pub test_command: Option<String>,
    /// Shell command the default ticket processor runs per ticket
    pub ticket_command: Option<String>,
    /// Prefix for per-ticket branch names
    pub branch_prefix: String,
    /// Log git/process operations instead of executing them
    pub dry_run: bool,
    pub verbose: bool,
}

impl Config {
    /// Load configuration for a repository directory, applying file defaults.
    pub fn load(repo_dir: impl Into<PathBuf>) -> Result<Self> {
        let repo_dir: PathBuf = repo_dir.into();
        let repo_dir = repo_dir
            .canonicalize()
            .with_context(|| format!("failed to resolve repository directory {}", repo_dir.display()))?;
        let file = FileConfig::load(&repo_dir)?;

        Ok(Self {
            repo_dir,
            max_parallel: file.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL),
            base_branch: file
                .base_branch
                .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
            remote: file.remote.unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            skip_push: file.skip_push.unwrap_or(false),
            test_command: file.test_command,
            ticket_command: file.ticket_command,
            branch_prefix: file
                .branch_prefix
                .unwrap_or_else(|| DEFAULT_BRANCH_PREFIX.to_string()),
            dry_run: false,
            verbose: false,
        })
    }

    /// Apply a CLI override when the flag was given.
    pub fn with_max_parallel(mut self, value: Option<usize>) -> Self {
        if let Some(v) = value {
            self.max_parallel = v;
        }
        self
    }

    pub fn with_base_branch(mut self, value: Option<String>) -> Self {
        if let Some(v) = value {
            self.base_branch = v;
        }
        self
    }

    pub fn with_remote(mut self, value: Option<String>) -> Self {
        if let Some(v) = value {
            self.remote = v;
        }
        self
    }

    pub fn with_skip_push(mut self, skip: bool) -> Self {
        if skip {
            self.skip_push = true;
        }
        self
    }

    pub fn with_test_command(mut self, value: Option<String>) -> Self {
        if value.is_some() {
            self.test_command = value;
        }
        self
    }

    pub fn with_ticket_command(mut self, value: Option<String>) -> Self {
        if value.is_some() {
            self.ticket_command = value;
        }
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            anyhow::bail!("max_parallel must be a positive integer");
        }
        Ok(())
    }

    /// Directory worktrees are provisioned under.
    pub fn worktree_root(&self) -> PathBuf {
        self.repo_dir.join(".convoy").join("worktrees")
    }
}
