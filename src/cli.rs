//! Command-line surface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use steward_core::Severity;
use steward_gate::{Stage, Tool};

#[derive(Parser, Debug)]
#[command(
    name = "steward",
    about = "Governance enforcement for repositories edited by coding agents",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: <root>/.steward/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Machine-readable output
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install the framework tree into the repository
    Install {
        /// Show the plan without writing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Canonical tree (default: paths.canonicalDir)
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Plan a framework update; writes only with --apply
    Update {
        #[arg(long, default_value_t = false)]
        apply: bool,
        /// Canonical tree (default: paths.canonicalDir)
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Check state files, hooks and tools
    Doctor {
        /// Write missing git hook shims
        #[arg(long, default_value_t = false)]
        fix_hooks: bool,
        /// Install missing gate tools
        #[arg(long, default_value_t = false)]
        fix_tools: bool,
    },
    /// Run the gate for a git stage
    Gate(GateArgs),
    /// Inspect resolved standards
    #[command(subcommand)]
    Standards(StandardsCommand),
    /// Record, list and renew risk decisions
    #[command(subcommand)]
    Decision(DecisionCommand),
}

#[derive(Args, Debug)]
pub struct GateArgs {
    pub stage: Stage,
    /// Commit message file (commit-msg stage)
    pub msg_file: Option<PathBuf>,
    /// Branch to evaluate (default: current branch)
    #[arg(long)]
    pub branch: Option<String>,
    /// Accept a blocked check if a live override decision exists
    #[arg(long = "override", value_name = "CHECK")]
    pub overrides: Vec<Tool>,
}

#[derive(Subcommand, Debug)]
pub enum StandardsCommand {
    /// Print the resolved standards with attribution
    Show {
        /// Only keys starting with this prefix
        prefix: Option<String>,
    },
    /// Key-level differences between two layers
    Diff { layer_a: String, layer_b: String },
}

#[derive(Subcommand, Debug)]
pub enum DecisionCommand {
    /// Record an accepted decision
    Accept {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        policy: String,
        #[arg(long)]
        severity: Severity,
        /// Context as JSON
        #[arg(long, default_value = "{}")]
        context: String,
    },
    /// List recorded decisions
    List,
    /// Extend a decision by its severity's lifetime
    Renew { id: String },
}

impl Command {
    /// Name used in `command.failed` audit events.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Install { .. } => "install",
            Command::Update { .. } => "update",
            Command::Doctor { .. } => "doctor",
            Command::Gate(_) => "gate",
            Command::Standards(StandardsCommand::Show { .. }) => "standards show",
            Command::Standards(StandardsCommand::Diff { .. }) => "standards diff",
            Command::Decision(DecisionCommand::Accept { .. }) => "decision accept",
            Command::Decision(DecisionCommand::List) => "decision list",
            Command::Decision(DecisionCommand::Renew { .. }) => "decision renew",
        }
    }
}
