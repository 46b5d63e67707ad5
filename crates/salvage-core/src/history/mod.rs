//! History mining: enumerate and restore prior revisions of an artifact.
//!
//! The backend is an abstract capability; the engine never mutates it.
//! Restored text lives in a scoped workspace that is reclaimed on all exit
//! paths.

pub mod git;
pub mod workspace;

use tracing::{debug, warn};

use crate::errors::HistoryError;
use crate::guards::clamp_depth;
use crate::models::Revision;

pub use workspace::RevisionWorkspace;

/// Capability contract for a version-history system.
///
/// Implementations must be read-only over the backing store and safe to
/// call concurrently with harness executions.
pub trait HistoryBackend: Sync {
    /// References of prior snapshots of `artifact_id`, most recent first.
    fn list_revisions(&self, artifact_id: &str) -> Result<Vec<String>, HistoryError>;

    /// Restore the content of one snapshot.
    fn fetch(&self, artifact_id: &str, reference: &str) -> Result<String, HistoryError>;
}

/// Enumerate up to `max_depth` prior revisions of an artifact, restoring
/// each into `workspace`.
///
/// Ordinals are assigned `0..n`, most recent first. Fewer snapshots than
/// requested is not an error; no history at all yields an empty vector. A
/// failure restoring one revision drops only that revision.
pub fn enumerate_revisions(
    backend: &dyn HistoryBackend,
    artifact_id: &str,
    max_depth: usize,
    workspace: &RevisionWorkspace,
) -> Result<Vec<Revision>, HistoryError> {
    let depth = clamp_depth(max_depth);
    let references = backend.list_revisions(artifact_id)?;
    let mut revisions = Vec::new();

    for reference in references.into_iter().take(depth) {
        let ordinal = revisions.len();
        let text = match backend.fetch(artifact_id, &reference) {
            Ok(text) => text,
            Err(e) => {
                warn!(%reference, ordinal, "dropping revision, fetch failed: {e}");
                continue;
            }
        };
        if let Err(e) = workspace.materialize(ordinal, &text) {
            warn!(%reference, ordinal, "dropping revision, workspace failure: {e}");
            continue;
        }
        revisions.push(Revision::new(reference, ordinal, text));
    }
    debug!(
        artifact = artifact_id,
        restored = revisions.len(),
        "history enumeration complete"
    );
    Ok(revisions)
}

/// In-memory backend shared by tests across the crate.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::HistoryBackend;
    use crate::errors::HistoryError;

    pub struct MemoryBackend {
        pub snapshots: HashMap<String, Vec<(String, String)>>,
    }

    impl MemoryBackend {
        pub fn single(artifact: &str, revisions: &[(&str, &str)]) -> Self {
            let mut snapshots = HashMap::new();
            snapshots.insert(
                artifact.to_string(),
                revisions
                    .iter()
                    .map(|(r, t)| (r.to_string(), t.to_string()))
                    .collect(),
            );
            Self { snapshots }
        }
    }

    impl HistoryBackend for MemoryBackend {
        fn list_revisions(&self, artifact_id: &str) -> Result<Vec<String>, HistoryError> {
            Ok(self
                .snapshots
                .get(artifact_id)
                .map(|revs| revs.iter().map(|(r, _)| r.clone()).collect())
                .unwrap_or_default())
        }

        fn fetch(&self, artifact_id: &str, reference: &str) -> Result<String, HistoryError> {
            self.snapshots
                .get(artifact_id)
                .and_then(|revs| revs.iter().find(|(r, _)| r == reference))
                .map(|(_, t)| t.clone())
                .ok_or_else(|| HistoryError::FetchFailed(reference.to_string()))
        }
    }
}
