//! Run-scoped scratch workspace for intermediate materialized data.
//!
//! Everything a run materializes (the fetched remote candidates, any
//! other intermediates) lives under one directory that is deleted before
//! the run reports completion — on the success path and on every error
//! path. `keep_intermediate` switches the backing to a plain directory
//! that survives the run, for debugging.

use std::path::{Path, PathBuf};

use crate::WorkflowError;

enum Backing {
    /// Deleted on close, and by `Drop` if the run unwinds first.
    Temp(tempfile::TempDir),
    /// Survives the run; the path is logged at close.
    Kept(PathBuf),
}

/// The scratch directory owned by exactly one run.
pub struct RunWorkspace {
    backing: Backing,
}

impl RunWorkspace {
    /// Creates the workspace for a run.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] if the directory cannot be created.
    pub fn create(run_id: &str, keep_intermediate: bool) -> Result<Self, WorkflowError> {
        let backing = if keep_intermediate {
            let path = std::env::temp_dir().join(format!("pop_scatter_{run_id}"));
            std::fs::create_dir_all(&path)?;
            Backing::Kept(path)
        } else {
            let dir = tempfile::Builder::new()
                .prefix(&format!("pop_scatter_{run_id}_"))
                .tempdir()?;
            Backing::Temp(dir)
        };

        let workspace = Self { backing };
        log::debug!("Run workspace at {}", workspace.path().display());
        Ok(workspace)
    }

    /// Where intermediates are written.
    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Temp(dir) => dir.path(),
            Backing::Kept(path) => path,
        }
    }

    /// Closes the workspace: deletes it, or logs its location when it is
    /// being kept. Errors while deleting are surfaced, not swallowed —
    /// leftover intermediates are a reportable condition.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] if the directory cannot be removed.
    pub fn close(self) -> Result<(), WorkflowError> {
        match self.backing {
            Backing::Temp(dir) => {
                dir.close()?;
                Ok(())
            }
            Backing::Kept(path) => {
                log::info!("Keeping intermediate data at {}", path.display());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_removes_the_workspace() {
        let workspace = RunWorkspace::create("test-close", false).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(path.join("scratch.geojson"), "{}").unwrap();
        assert!(path.exists());

        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_the_workspace_on_unwind_paths() {
        let path;
        {
            let workspace = RunWorkspace::create("test-drop", false).unwrap();
            path = workspace.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn kept_workspace_survives_close() {
        let workspace = RunWorkspace::create("test-keep", true).unwrap();
        let path = workspace.path().to_path_buf();
        workspace.close().unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(&path).unwrap();
    }
}
