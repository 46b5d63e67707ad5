//! Git binding for the history backend capability.
//!
//! Shells out to the `git` CLI; artifact identifiers are paths relative to
//! the repository root. Strictly read-only: only `log` and `show` are ever
//! invoked.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::errors::HistoryError;
use crate::history::HistoryBackend;

/// History backend over a local git repository.
pub struct GitBackend {
    repo_root: PathBuf,
}

impl GitBackend {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output, HistoryError> {
        Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .output()
            .map_err(|e| HistoryError::Unreachable(format!("failed to run git: {e}")))
    }
}

/// Reject references that could be parsed as options or redirections.
/// Allows alphanumerics, `-`, `_`, `.`, `/`; must not start with a hyphen.
fn validate_reference(reference: &str) -> Result<(), HistoryError> {
    if reference.is_empty()
        || reference.starts_with('-')
        || !reference
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(HistoryError::InvalidReference(reference.to_string()));
    }
    Ok(())
}

impl HistoryBackend for GitBackend {
    fn list_revisions(&self, artifact_id: &str) -> Result<Vec<String>, HistoryError> {
        validate_reference(artifact_id)?;
        let output = self.git(&["log", "--format=%H", "--", artifact_id])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HistoryError::Unreachable(format!(
                "git log failed: {}",
                stderr.trim()
            )));
        }
        let references: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        debug!(
            artifact = artifact_id,
            commits = references.len(),
            "git history listed"
        );
        Ok(references)
    }

    fn fetch(&self, artifact_id: &str, reference: &str) -> Result<String, HistoryError> {
        validate_reference(artifact_id)?;
        validate_reference(reference)?;
        let spec = format!("{reference}:{artifact_id}");
        let output = self.git(&["show", &spec])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HistoryError::FetchFailed(format!(
                "{spec}: {}",
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| HistoryError::FetchFailed(format!("{spec}: not UTF-8: {e}")))
    }
}
