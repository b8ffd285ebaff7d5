//! Artifact store: generated images on disk, one file per image.
//!
//! The store is the source of truth for whether an artifact exists. The
//! cache index only holds filenames and has to cope with them going missing.

use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{ProxyError, Result};

pub const ARTIFACT_EXTENSION: &str = "png";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    ///
    /// Nothing else in the store works without it, so callers treat an error
    /// here as fatal.
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!(dir = %self.root.display(), "Cache directory initialized");
        Ok(())
    }

    /// Write `bytes` under a freshly generated filename and return the name.
    pub async fn write(&self, bytes: &[u8]) -> Result<String> {
        let filename = generate_filename(ARTIFACT_EXTENSION);
        self.write_named(&filename, bytes).await?;
        Ok(filename)
    }

    async fn write_named(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(filename);
        if let Err(e) = fs::write(&path, bytes).await {
            // nothing will ever index a partial file, so it has to go now
            if let Err(cleanup) = fs::remove_file(&path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::warn!(%filename, error = %cleanup, "Error removing partial artifact");
                }
            }
            return Err(ProxyError::Storage(e));
        }
        tracing::debug!(%filename, size = bytes.len(), "Artifact written");
        Ok(())
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.path(filename)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProxyError::NotFound(format!("artifact {filename} not found")),
            _ => ProxyError::Storage(e),
        })
    }

    /// Remove an artifact. Already-absent files are not an error.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.path(filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProxyError::Storage(e)),
        }
    }

    pub async fn exists(&self, filename: &str) -> bool {
        match self.path(filename) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    // Filenames come from HTTP paths too; anything that could leave the root
    // is reported as missing.
    fn path(&self, filename: &str) -> Result<PathBuf> {
        let valid = !filename.is_empty()
            && filename != "."
            && filename != ".."
            && !filename.contains(['/', '\\', '\0']);
        if !valid {
            return Err(ProxyError::NotFound(format!("artifact {filename} not found")));
        }
        Ok(self.root.join(filename))
    }
}

// <unix millis>_<12 hex chars>.<ext>
fn generate_filename(extension: &str) -> String {
    let mut suffix = [0u8; 6];
    rand::thread_rng().fill(&mut suffix);
    let hex: String = suffix.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}_{}.{}",
        chrono::Utc::now().timestamp_millis(),
        hex,
        extension
    )
}
