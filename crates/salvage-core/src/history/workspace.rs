//! Scoped workspace for materialized revision text.
//!
//! Backed by a `tempfile::TempDir`: the directory and everything written
//! into it are reclaimed when the workspace drops, on every exit path
//! including panics unwinding through the session.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::errors::{SalvageError, SalvageResult};

/// Auto-reclaimed storage for one recovery session's restored revisions.
pub struct RevisionWorkspace {
    dir: TempDir,
}

impl RevisionWorkspace {
    /// Allocate a fresh workspace. Failure here is one of the few fatal
    /// errors in the engine: without temporary storage nothing can be
    /// restored.
    pub fn create() -> SalvageResult<Self> {
        let dir = TempDir::with_prefix("salvage-")
            .map_err(|e| SalvageError::Workspace(format!("cannot allocate workspace: {e}")))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write one revision's restored text under `revision-<ordinal>.py`.
    ///
    /// A failure here is scoped to the single revision: the caller drops
    /// that revision from ranking and continues.
    pub fn materialize(&self, ordinal: usize, text: &str) -> SalvageResult<PathBuf> {
        let path = self.dir.path().join(format!("revision-{ordinal}.py"));
        std::fs::write(&path, text)
            .map_err(|e| SalvageError::Workspace(format!("cannot write revision {ordinal}: {e}")))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_and_cleanup() {
        let root;
        {
            let ws = RevisionWorkspace::create().unwrap();
            root = ws.root().to_path_buf();
            let p0 = ws.materialize(0, "def a(): pass\n").unwrap();
            let p1 = ws.materialize(1, "def b(): pass\n").unwrap();
            assert_ne!(p0, p1);
            assert_eq!(std::fs::read_to_string(&p0).unwrap(), "def a(): pass\n");
        }
        // Dropped workspace reclaims its storage.
        assert!(!root.exists());
    }
}
