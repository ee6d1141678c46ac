//! The closed set of gate tools and project stacks.
//!
//! Every tool spells out its binary, check invocation, installer and optional
//! configure step in one exhaustive `match`, so adding a variant fails to
//! compile until all of them are answered.

use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Gitleaks,
    Semgrep,
    CargoAudit,
    CargoClippy,
    CargoTest,
    Ruff,
    Pytest,
    NpmAudit,
    ConventionalCommit,
}

/// A program plus its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl ToolCommand {
    const fn new(program: &'static str, args: &'static [&'static str]) -> Self {
        Self { program, args }
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Tool::Gitleaks,
            Tool::Semgrep,
            Tool::CargoAudit,
            Tool::CargoClippy,
            Tool::CargoTest,
            Tool::Ruff,
            Tool::Pytest,
            Tool::NpmAudit,
            Tool::ConventionalCommit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Gitleaks => "gitleaks",
            Tool::Semgrep => "semgrep",
            Tool::CargoAudit => "cargo-audit",
            Tool::CargoClippy => "cargo-clippy",
            Tool::CargoTest => "cargo-test",
            Tool::Ruff => "ruff",
            Tool::Pytest => "pytest",
            Tool::NpmAudit => "npm-audit",
            Tool::ConventionalCommit => "conventional-commit",
        }
    }

    /// Evaluated in-process; never spawns, never remediated.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Tool::ConventionalCommit)
    }

    pub fn check_command(&self) -> Option<ToolCommand> {
        let cmd = match self {
            Tool::Gitleaks => ToolCommand::new(
                "gitleaks",
                &["protect", "--staged", "--redact", "--no-banner"],
            ),
            Tool::Semgrep => ToolCommand::new(
                "semgrep",
                &["scan", "--config", "auto", "--error", "--quiet"],
            ),
            Tool::CargoAudit => ToolCommand::new("cargo", &["audit", "--quiet"]),
            Tool::CargoClippy => {
                ToolCommand::new("cargo", &["clippy", "--quiet", "--", "-D", "warnings"])
            }
            Tool::CargoTest => ToolCommand::new("cargo", &["test", "--quiet"]),
            Tool::Ruff => ToolCommand::new("ruff", &["check", "."]),
            Tool::Pytest => ToolCommand::new("pytest", &["-q"]),
            Tool::NpmAudit => ToolCommand::new("npm", &["audit", "--audit-level=high"]),
            Tool::ConventionalCommit => return None,
        };
        Some(cmd)
    }

    /// Cheap presence check; exit 0 means the tool is installed.
    pub fn detect_command(&self) -> Option<ToolCommand> {
        let cmd = match self {
            Tool::Gitleaks => ToolCommand::new("gitleaks", &["version"]),
            Tool::Semgrep => ToolCommand::new("semgrep", &["--version"]),
            Tool::CargoAudit => ToolCommand::new("cargo", &["audit", "--version"]),
            Tool::CargoClippy => ToolCommand::new("cargo", &["clippy", "--version"]),
            Tool::CargoTest => ToolCommand::new("cargo", &["--version"]),
            Tool::Ruff => ToolCommand::new("ruff", &["--version"]),
            Tool::Pytest => ToolCommand::new("pytest", &["--version"]),
            Tool::NpmAudit => ToolCommand::new("npm", &["--version"]),
            Tool::ConventionalCommit => return None,
        };
        Some(cmd)
    }

    pub fn install_command(&self) -> Option<ToolCommand> {
        match self {
            Tool::Gitleaks => Some(ToolCommand::new(
                "go",
                &["install", "github.com/zricethezav/gitleaks/v8@latest"],
            )),
            Tool::Semgrep => Some(ToolCommand::new("pipx", &["install", "semgrep"])),
            Tool::CargoAudit => Some(ToolCommand::new(
                "cargo",
                &["install", "cargo-audit", "--locked"],
            )),
            Tool::CargoClippy => Some(ToolCommand::new("rustup", &["component", "add", "clippy"])),
            Tool::Ruff => Some(ToolCommand::new("pipx", &["install", "ruff"])),
            Tool::Pytest => Some(ToolCommand::new(
                "python3",
                &["-m", "pip", "install", "--user", "pytest"],
            )),
            Tool::CargoTest | Tool::NpmAudit | Tool::ConventionalCommit => None,
        }
    }

    pub fn configure_command(&self) -> Option<ToolCommand> {
        match self {
            Tool::NpmAudit => Some(ToolCommand::new(
                "npm",
                &["install", "--package-lock-only", "--ignore-scripts"],
            )),
            Tool::CargoAudit => Some(ToolCommand::new("cargo", &["generate-lockfile"])),
            Tool::Gitleaks
            | Tool::Semgrep
            | Tool::CargoClippy
            | Tool::CargoTest
            | Tool::Ruff
            | Tool::Pytest
            | Tool::ConventionalCommit => None,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Tool {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::all()
            .iter()
            .find(|t| t.name() == s)
            .copied()
            .ok_or_else(|| format!("unknown gate tool: {s}"))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stack {
    Rust,
    Python,
    Node,
    Generic,
}

impl Stack {
    /// First marker file found at `root` wins.
    pub fn detect(root: &Path) -> Stack {
        const MARKERS: &[(&str, Stack)] = &[
            ("Cargo.toml", Stack::Rust),
            ("pyproject.toml", Stack::Python),
            ("setup.py", Stack::Python),
            ("requirements.txt", Stack::Python),
            ("package.json", Stack::Node),
        ];
        MARKERS
            .iter()
            .find(|(marker, _)| root.join(marker).is_file())
            .map(|(_, stack)| *stack)
            .unwrap_or(Stack::Generic)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stack::Rust => "rust",
            Stack::Python => "python",
            Stack::Node => "node",
            Stack::Generic => "generic",
        }
    }

    /// Checks for `stage` when no standards layer names any.
    pub fn default_checks(&self, stage: Stage) -> Vec<Tool> {
        match (stage, self) {
            (Stage::CommitMsg, _) => vec![Tool::ConventionalCommit],
            (Stage::PreCommit, Stack::Rust) => vec![Tool::Gitleaks, Tool::CargoClippy],
            (Stage::PreCommit, Stack::Python) => vec![Tool::Gitleaks, Tool::Ruff],
            (Stage::PreCommit, Stack::Node | Stack::Generic) => vec![Tool::Gitleaks],
            (Stage::PrePush, Stack::Rust) => vec![Tool::CargoTest, Tool::CargoAudit],
            (Stage::PrePush, Stack::Python) => vec![Tool::Pytest, Tool::Semgrep],
            (Stage::PrePush, Stack::Node) => vec![Tool::NpmAudit],
            (Stage::PrePush, Stack::Generic) => vec![Tool::Semgrep],
        }
    }
}

impl std::fmt::Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
