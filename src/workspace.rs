//! Scoped temporary workspace for one pipeline run
//!
//! Every intermediate file (the downloaded archive, extracted nested archives,
//! the staged output archive) lives under the workspace root. The root is
//! removed when the [`Workspace`] is closed or dropped, whichever stage failed.

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};
use crate::types::Stage;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const DOWNLOADS_DIR: &str = "downloads";
const EXTRACT_DIR: &str = "extract";
const OUTPUT_DIR: &str = "output";

/// Uniquely-named temporary directory owning all files of a run
#[derive(Debug)]
pub struct Workspace {
    root: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a new workspace under the configured parent directory
    pub fn create(config: &WorkspaceConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&config.prefix);

        let root = match &config.temp_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::io(Stage::Workspace, parent, e))?;
                builder
                    .tempdir_in(parent)
                    .map_err(|e| Error::io(Stage::Workspace, parent, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| Error::io(Stage::Workspace, std::env::temp_dir(), e))?,
        };

        let path = root.path().to_path_buf();
        debug!(?path, "created workspace");

        Ok(Self {
            root: Some(root),
            path,
        })
    }

    /// Workspace root directory
    pub fn root(&self) -> &Path {
        &self.path
    }

    /// Directory holding downloaded archives (created on demand)
    pub fn downloads_dir(&self) -> Result<PathBuf> {
        self.subdir(Stage::Download, Path::new(DOWNLOADS_DIR))
    }

    /// Extraction directory for one source archive (created on demand)
    ///
    /// `stub` must be a single path component.
    pub fn extraction_dir(&self, stub: &str) -> Result<PathBuf> {
        let mut components = Path::new(stub).components();
        match (components.next(), components.next()) {
            (Some(std::path::Component::Normal(_)), None) => {}
            _ => {
                return Err(Error::Config {
                    message: format!("invalid extraction directory name {:?}", stub),
                    key: None,
                });
            }
        }
        self.subdir(Stage::Extract, &Path::new(EXTRACT_DIR).join(stub))
    }

    /// Directory where the output archive is staged before it is moved
    pub fn output_dir(&self) -> Result<PathBuf> {
        self.subdir(Stage::Repackage, Path::new(OUTPUT_DIR))
    }

    fn subdir(&self, stage: Stage, relative: &Path) -> Result<PathBuf> {
        let dir = self.path.join(relative);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(stage, &dir, e))?;
        Ok(dir)
    }

    /// Remove the workspace, reporting cleanup failures
    ///
    /// Dropping the workspace also removes it, but silently.
    pub fn close(mut self) -> Result<()> {
        match self.root.take() {
            Some(root) => {
                debug!(path = ?self.path, "removing workspace");
                root.close()
                    .map_err(|e| Error::io(Stage::Workspace, &self.path, e))
            }
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            if let Err(e) = root.close() {
                warn!(?path, error = %e, "failed to remove workspace");
            } else {
                debug!(?path, "removed workspace");
            }
        }
    }
}
