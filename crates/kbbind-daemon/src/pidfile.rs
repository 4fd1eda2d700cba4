//! PID file handling

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Writes the process id on creation and removes the file on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with_pid(path, std::process::id())
    }

    fn create_with_pid(path: &Path, pid: u32) -> Result<Self> {
        std::fs::write(path, format!("{}\n", pid))
            .with_context(|| format!("Unable to write PID file {}", path.display()))?;

        tracing::debug!("Wrote PID file {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Could not delete PID file {}: {}", self.path.display(), e);
        }
    }
}
