//! Where finished reports go. The assembler hands the bytes to exactly one
//! sink per successful run.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Cannot create exports dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write PDF {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid report filename: {0}")]
    InvalidFilename(String),
}

pub trait ReportSink: Send + Sync {
    /// Persist `bytes` under `filename`; returns the final location.
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// Writes reports into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for DirectorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename == "."
            || filename == ".."
        {
            return Err(ExportError::InvalidFilename(filename.to_string()));
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| ExportError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(filename);
        std::fs::write(&path, bytes).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), size = bytes.len(), "Report saved");
        Ok(path)
    }
}
