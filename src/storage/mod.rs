//! Output destinations for CSV results.
//!
//! The batch driver only needs two things from a destination: "does this
//! name already exist?" and "write this text under this name". [`OutputSink`]
//! captures exactly that, with a local-directory implementation here and a
//! Google Drive implementation in [`drive`].

pub mod drive;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub use drive::{DriveClient, DriveFile, DriveSink};

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Access token expired or revoked (HTTP 401 or `invalid_grant`).
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// The token lacks the scopes needed for the operation.
    #[error("insufficient permissions: {0}")]
    PermissionDenied(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An output with this name is already present.
    #[error("'{0}' already exists")]
    AlreadyExists(String),
}

impl StorageError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, StorageError::SessionExpired(_))
    }
}

/// A place CSV outputs are written to.
///
/// Names are plain file names (`report_page1.csv`); the sink decides where
/// they live. Implementations never overwrite an existing output.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Human-readable location of `name`, used in reports and logs.
    fn location(&self, name: &str) -> String;

    /// True if an output named `name` already exists.
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Persist `contents` under `name` and return its location.
    async fn write(&self, name: &str, contents: &str) -> Result<String, StorageError>;
}

/// Writes outputs into a local directory, creating it on first write.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl OutputSink for LocalDirSink {
    fn location(&self, name: &str) -> String {
        self.path(name).display().to_string()
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path(name)).await?)
    }

    /// Atomic write: temp file in the same directory, then rename.
    async fn write(&self, name: &str, contents: &str) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path(name);
        if tokio::fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(self.location(name)));
        }

        let tmp_path = self.dir.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp_path, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_sink_creates_dir_and_writes() {
        let tmp = TempDir::new().unwrap();
        let sink = LocalDirSink::new(tmp.path().join("csv"));

        assert!(!sink.exists("a.csv").await.unwrap());
        let loc = sink.write("a.csv", "x,y\n1,2").await.unwrap();
        assert!(loc.ends_with("a.csv"));
        assert!(sink.exists("a.csv").await.unwrap());

        let written = std::fs::read_to_string(tmp.path().join("csv/a.csv")).unwrap();
        assert_eq!(written, "x,y\n1,2");
        assert!(!tmp.path().join("csv/.a.csv.tmp").exists());
    }

    #[tokio::test]
    async fn local_sink_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let sink = LocalDirSink::new(tmp.path());
        std::fs::write(tmp.path().join("a.csv"), "old").unwrap();

        let err = sink.write("a.csv", "new").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.csv")).unwrap(), "old");
    }
}
