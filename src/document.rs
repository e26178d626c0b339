//! Input-side data model: source files, loaded documents and page units.

use crate::error::UnitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Declared media type of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Jpeg,
}

impl MediaType {
    /// Infer the media type from a file extension (case-insensitive).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MediaType::Pdf),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Infer the media type from a MIME string as reported by cloud storage.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(MediaType::Pdf),
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    /// Short label used in the extraction prompt.
    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Pdf => "PDF",
            MediaType::Jpeg => "JPG",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the batch worklist. Bytes are read lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Local path the bytes are read from.
    pub path: PathBuf,
    /// Originating file name, used for output naming.
    ///
    /// Usually the path's file name; differs for files downloaded from
    /// cloud storage into a temporary location.
    pub name: String,
    pub media_type: MediaType,
}

impl SourceFile {
    /// Build a worklist entry from a local path, inferring the media type.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let media_type = MediaType::from_path(&path)?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            path,
            name,
            media_type,
        })
    }

    /// Read the file into an immutable [`SourceDocument`].
    pub async fn read(&self) -> Result<SourceDocument, UnitError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| UnitError::ReadFailed {
                source_name: self.name.clone(),
                detail: e.to_string(),
            })?;
        Ok(SourceDocument::new(self.name.clone(), self.media_type, bytes))
    }
}

/// An immutable document buffer with its declared type and origin name.
#[derive(Clone)]
pub struct SourceDocument {
    name: String,
    media_type: MediaType,
    bytes: Arc<[u8]>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, media_type: MediaType, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A single-page derivative of a [`SourceDocument`].
///
/// `(source_name, page_index)` identifies the unit and maps to exactly one
/// output name.
#[derive(Clone)]
pub struct PageUnit {
    /// Self-contained bytes in the source's encoding.
    pub bytes: Vec<u8>,
    /// 0-based page index; `None` for single-image sources.
    pub page_index: Option<usize>,
    pub source_name: String,
    pub media_type: MediaType,
}

impl PageUnit {
    /// Human-readable label such as `report.pdf p3` or `scan.jpg`.
    pub fn label(&self) -> String {
        match self.page_index {
            Some(idx) => format!("{} p{}", self.source_name, idx + 1),
            None => self.source_name.clone(),
        }
    }
}

impl fmt::Debug for PageUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageUnit")
            .field("source_name", &self.source_name)
            .field("page_index", &self.page_index)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_extension() {
        assert_eq!(MediaType::from_path("a/report.PDF"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_path("scan.jpeg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_path("scan.JPG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_path("notes.txt"), None);
        assert_eq!(MediaType::from_path("no_extension"), None);
    }

    #[test]
    fn media_type_from_mime() {
        assert_eq!(MediaType::from_mime("application/pdf"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_mime("image/jpeg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("image/png"), None);
    }

    #[test]
    fn unit_label() {
        let unit = PageUnit {
            bytes: vec![],
            page_index: Some(2),
            source_name: "report.pdf".into(),
            media_type: MediaType::Pdf,
        };
        assert_eq!(unit.label(), "report.pdf p3");
    }

    #[tokio::test]
    async fn read_missing_file_is_unit_error() {
        let src = SourceFile::from_path("/definitely/not/here.pdf").unwrap();
        let err = src.read().await.unwrap_err();
        assert!(matches!(err, UnitError::ReadFailed { .. }));
    }
}
