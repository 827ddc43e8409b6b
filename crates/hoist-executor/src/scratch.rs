//! Scratch directories for checkpoint images and archives.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ExecResult, ExecutionError};

/// A directory removed on drop, on success and failure paths alike.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `work_dir/hoist-<label>`, replacing a stale one.
    pub fn create(work_dir: &Path, label: &str) -> ExecResult<Self> {
        let path = work_dir.join(format!("hoist-{label}"));
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "failed to clean stale scratch directory");
            }
        }
        std::fs::create_dir_all(&path)
            .map_err(|e| ExecutionError::io(format!("creating {}", path.display()), e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a subdirectory and return its path.
    pub fn subdir(&self, name: &str) -> ExecResult<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| ExecutionError::io(format!("creating {}", dir.display()), e))?;
        Ok(dir)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to clean up scratch directory");
            }
        }
    }
}
