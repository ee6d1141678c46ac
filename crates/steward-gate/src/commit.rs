//! Built-in `conventional-commit` check over the commit message.

use regex::Regex;
use std::sync::OnceLock;

const TYPES: &str = "feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert";

fn subject_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^(?:{TYPES})(?:\([a-z0-9][a-z0-9._/-]*\))?!?: \S.*$")).ok()
    })
    .as_ref()
}

/// First line a human wrote: git comment lines and leading blanks are skipped.
pub fn subject(message: &str) -> Option<&str> {
    message
        .lines()
        .map(str::trim_end)
        .find(|l| !l.trim().is_empty() && !l.starts_with('#'))
}

/// `Ok(())` if the subject follows `type(scope)!: description`.
/// Merge and revert subjects generated by git pass as-is.
pub fn check_message(message: &str) -> Result<(), String> {
    let Some(subject) = subject(message) else {
        return Err("commit message is empty".into());
    };
    if subject.starts_with("Merge ") || subject.starts_with("Revert \"") {
        return Ok(());
    }
    if subject.len() > 100 {
        return Err(format!("subject is {} chars, limit is 100", subject.len()));
    }
    if subject_pattern().is_some_and(|re| re.is_match(subject)) {
        Ok(())
    } else {
        Err(format!(
            "subject \"{subject}\" is not a conventional commit; expected <type>(<scope>): <description> with type one of {}",
            TYPES.replace('|', ", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_subjects() {
        for msg in [
            "feat: add gate engine",
            "fix(update): keep local edits\n\nbody",
            "refactor(core/audit)!: new line format",
            "# Please enter the commit message\n\nchore: bump deps",
            "Merge branch 'x' into main",
        ] {
            assert!(check_message(msg).is_ok(), "{msg}");
        }
    }

    #[test]
    fn rejects_others() {
        for msg in [
            "",
            "# only comments\n",
            "update stuff",
            "feat:missing space",
            "Feat: caps",
            "wip(x): y",
        ] {
            assert!(check_message(msg).is_err(), "{msg:?}");
        }
    }

    #[test]
    fn long_subject_rejected() {
        let msg = format!("feat: {}", "x".repeat(120));
        assert!(check_message(&msg).unwrap_err().contains("limit is 100"));
    }
}
