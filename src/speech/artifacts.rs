//! Per-unit audio files.
//!
//! Every synthesized unit is written to a scoped temp file before decoding.
//! The file is removed when the [`Artifact`] drops, on success and failure
//! alike. With retention enabled, a unit that decoded successfully is promoted
//! into a per-run directory instead, named with a timestamp and the unit index.
//! Attempts that fail never leave a file behind.

use crate::error::{PlainvoiceError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::OnceCell;

/// A unit's audio on disk.
#[derive(Debug)]
pub enum Artifact {
    /// Deleted on drop.
    Scratch(NamedTempFile),
    /// Kept after the run.
    Retained(PathBuf),
}

impl Artifact {
    pub fn path(&self) -> &Path {
        match self {
            Artifact::Scratch(file) => file.path(),
            Artifact::Retained(path) => path,
        }
    }

    pub fn is_retained(&self) -> bool {
        matches!(self, Artifact::Retained(_))
    }
}

/// Decides where unit audio goes.
#[derive(Debug)]
pub struct ArtifactStore {
    run_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    created: OnceCell<()>,
}

impl ArtifactStore {
    /// Store that only writes scratch files in the system temp directory.
    pub fn scratch() -> Self {
        Self {
            run_dir: None,
            scratch_dir: None,
            created: OnceCell::new(),
        }
    }

    /// Store that writes scratch files in `dir`.
    pub fn scratch_in(dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(dir.into()),
            ..Self::scratch()
        }
    }

    /// Store that keeps successful artifacts under `root/<run timestamp>/`.
    ///
    /// The directory is created on the first write, not here.
    pub fn retaining(root: impl Into<PathBuf>) -> Self {
        let run = chrono::Local::now().format("run_%Y%m%d_%H%M%S").to_string();
        Self {
            run_dir: Some(root.into().join(run)),
            ..Self::scratch()
        }
    }

    /// Directory retained artifacts land in, if retention is on.
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// Writes `bytes` for unit `index` to a scratch file.
    ///
    /// With retention on, the scratch file lives in the run directory so that
    /// [`ArtifactStore::keep`] can promote it with a rename.
    ///
    /// # Errors
    /// Returns `Io` if the file or the run directory cannot be written.
    pub async fn store(&self, index: usize, bytes: Vec<u8>, extension: &str) -> Result<Artifact> {
        let dir = match &self.run_dir {
            Some(run_dir) => {
                self.ensure_run_dir(run_dir).await?;
                Some(run_dir.clone())
            }
            None => self.scratch_dir.clone(),
        };

        let prefix = format!(".plainvoice-unit{index}-");
        let suffix = format!(".{extension}");
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix).suffix(&suffix);
            let mut file = match dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| PlainvoiceError::Other(format!("artifact writer task failed: {e}")))??;

        Ok(Artifact::Scratch(file))
    }

    /// Keeps a decoded unit's artifact when retention is on.
    ///
    /// Without retention the artifact is returned untouched and still removed
    /// on drop.
    ///
    /// # Errors
    /// Returns `Io` if the scratch file cannot be renamed into place.
    pub fn keep(&self, index: usize, artifact: Artifact, extension: &str) -> Result<Artifact> {
        let Some(run_dir) = &self.run_dir else {
            return Ok(artifact);
        };
        let file = match artifact {
            Artifact::Scratch(file) => file,
            retained @ Artifact::Retained(_) => return Ok(retained),
        };

        let path = run_dir.join(artifact_name(index, extension));
        file.persist(&path).map_err(|e| PlainvoiceError::Io(e.error))?;
        tracing::debug!(unit = index, path = %path.display(), "retained unit audio");
        Ok(Artifact::Retained(path))
    }

    async fn ensure_run_dir(&self, run_dir: &Path) -> Result<()> {
        self.created
            .get_or_try_init(move || async move {
                tokio::fs::create_dir_all(run_dir).await?;
                tracing::info!(dir = %run_dir.display(), "retaining unit audio");
                Ok::<(), std::io::Error>(())
            })
            .await?;
        Ok(())
    }
}

/// `response_<timestamp>_<index>.<ext>`; the index keeps names unique when two
/// units finish within the same microsecond.
fn artifact_name(index: usize, extension: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
    format!("response_{stamp}_{index:05}.{extension}")
}
