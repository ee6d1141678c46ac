//! Subprocess seam for gate checks.
//!
//! The engine only sees `Toolchain`; production runs real binaries through
//! `ProcessToolchain`, tests script outcomes.

use crate::tool::{Tool, ToolCommand};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Output captured from a check is capped so audit payloads stay small.
const MAX_OUTPUT: usize = 8 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
}

impl CheckOutcome {
    pub fn pass(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            exit_code: Some(0),
            output: output.into(),
            timed_out: false,
        }
    }

    pub fn fail(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            passed: false,
            exit_code,
            output: output.into(),
            timed_out: false,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            passed: false,
            exit_code: None,
            output: format!("timed out after {}s", after.as_secs()),
            timed_out: true,
        }
    }
}

#[async_trait::async_trait]
pub trait Toolchain: Send + Sync {
    /// Run `tool`'s check in the repository. Failure to spawn is a failed outcome.
    async fn run_check(&self, tool: Tool) -> CheckOutcome;

    /// Whether `tool` is installed.
    async fn detect(&self, tool: Tool) -> bool;

    async fn install(&self, tool: Tool) -> CheckOutcome;

    async fn configure(&self, tool: Tool) -> CheckOutcome;
}

/// Runs tools as child processes in the repository root.
pub struct ProcessToolchain {
    root: PathBuf,
    timeout: Duration,
}

impl ProcessToolchain {
    pub fn new(root: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            timeout,
        }
    }

    async fn exec(&self, cmd: &ToolCommand) -> CheckOutcome {
        debug!(command = %cmd, timeout_secs = self.timeout.as_secs(), "gate exec");

        // Dropping the `output()` future on timeout drops the child, which kills it.
        let mut command = Command::new(cmd.program);
        command
            .args(cmd.args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let run = command.output();

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => {
                let text = format_output(&output);
                if output.status.success() {
                    CheckOutcome::pass(text)
                } else {
                    CheckOutcome::fail(output.status.code(), text)
                }
            }
            Ok(Err(e)) => {
                CheckOutcome::fail(None, format!("failed to execute {}: {e}", cmd.program))
            }
            Err(_) => CheckOutcome::timeout(self.timeout),
        }
    }
}

#[async_trait::async_trait]
impl Toolchain for ProcessToolchain {
    async fn run_check(&self, tool: Tool) -> CheckOutcome {
        match tool.check_command() {
            Some(cmd) => self.exec(&cmd).await,
            None => CheckOutcome::fail(None, format!("{tool} is built in and has no command")),
        }
    }

    async fn detect(&self, tool: Tool) -> bool {
        match tool.detect_command() {
            Some(cmd) => self.exec(&cmd).await.passed,
            None => true,
        }
    }

    async fn install(&self, tool: Tool) -> CheckOutcome {
        match tool.install_command() {
            Some(cmd) => self.exec(&cmd).await,
            None => CheckOutcome::fail(None, format!("no installer known for {tool}")),
        }
    }

    async fn configure(&self, tool: Tool) -> CheckOutcome {
        match tool.configure_command() {
            Some(cmd) => self.exec(&cmd).await,
            None => CheckOutcome::pass(""),
        }
    }
}

fn format_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = match (stdout.trim(), stderr.trim()) {
        (out, "") => out.to_string(),
        ("", err) => err.to_string(),
        (out, err) => format!("{out}\n{err}"),
    };
    truncate(text)
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_OUTPUT {
        let mut cut = MAX_OUTPUT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        let dropped = text.len() - cut;
        text.truncate(cut);
        text.push_str(&format!("\n... ({dropped} bytes truncated)"));
    }
    text
}
