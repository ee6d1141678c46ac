//! The few git facts the gate needs.

use std::path::Path;
use steward_core::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Current branch name, `HEAD` when detached.
///
/// `rev-parse` fails before the first commit, so an unborn branch is read
/// from the symbolic ref instead.
pub async fn current_branch(root: &Path) -> Result<String> {
    let rev_parse = git(root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    if let Ok(branch) = rev_parse {
        return Ok(branch);
    }
    debug!("rev-parse failed, trying symbolic-ref");
    match git(root, &["symbolic-ref", "--short", "HEAD"]).await? {
        Ok(branch) => Ok(branch),
        Err(stderr) => Err(Error::config(
            root,
            format!(
                "could not determine current branch: {}",
                rev_parse.err().unwrap_or(stderr)
            ),
        )),
    }
}

/// Outer error: git could not be run. Inner error: git's stderr.
async fn git(root: &Path, args: &[&str]) -> Result<std::result::Result<String, String>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .kill_on_drop(true)
        .output()
        .await?;
    if output.status.success() {
        Ok(Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    } else {
        Ok(Err(String::from_utf8_lossy(&output.stderr).trim().to_string()))
    }
}

/// `<root>/.git/hooks`, or `None` outside a plain git checkout.
pub fn hooks_dir(root: &Path) -> Option<std::path::PathBuf> {
    let git = root.join(".git");
    git.is_dir().then(|| git.join("hooks"))
}
