//! Page splitting: one source document → independently submittable units.
//!
//! A PDF becomes one standalone single-page PDF per page, so each model call
//! sees exactly one page and the output maps 1:1 to a CSV file. A JPEG is
//! passed through unchanged as a single unit.
//!
//! pdfium wraps a C++ library with thread-local state, so all pdfium work
//! happens inside `tokio::task::spawn_blocking` (see [`split_document`] and
//! [`count_pages`]). Splitting is eager and fails fast: a source that cannot
//! be parsed yields no partial pages.

use crate::document::{MediaType, PageUnit, SourceDocument};
use crate::error::UnitError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable pointing at the pdfium shared library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Splits a document into page units. Implementations are blocking.
pub trait PageSplitter: Send + Sync {
    /// Number of units `split` would produce, without producing them.
    fn page_count(&self, doc: &SourceDocument) -> Result<usize, UnitError>;

    /// Produce every unit of `doc`, in page order.
    fn split(&self, doc: &SourceDocument) -> Result<Vec<PageUnit>, UnitError>;
}

/// Run [`PageSplitter::split`] on the blocking pool.
pub async fn split_document(
    splitter: Arc<dyn PageSplitter>,
    doc: SourceDocument,
) -> Result<Vec<PageUnit>, UnitError> {
    let name = doc.name().to_string();
    tokio::task::spawn_blocking(move || splitter.split(&doc))
        .await
        .map_err(|e| UnitError::SplitFailed {
            source_name: name,
            detail: format!("split task panicked: {e}"),
        })?
}

/// Run [`PageSplitter::page_count`] on the blocking pool.
pub async fn count_pages(
    splitter: Arc<dyn PageSplitter>,
    doc: SourceDocument,
) -> Result<usize, UnitError> {
    let name = doc.name().to_string();
    tokio::task::spawn_blocking(move || splitter.page_count(&doc))
        .await
        .map_err(|e| UnitError::SplitFailed {
            source_name: name,
            detail: format!("page count task panicked: {e}"),
        })?
}

/// Validate a JPEG and wrap it as the single unit of its source.
pub fn split_image(doc: &SourceDocument) -> Result<Vec<PageUnit>, UnitError> {
    image::load_from_memory_with_format(doc.bytes(), ImageFormat::Jpeg).map_err(|e| {
        UnitError::SplitFailed {
            source_name: doc.name().to_string(),
            detail: format!("invalid JPEG: {e}"),
        }
    })?;
    Ok(vec![PageUnit {
        bytes: doc.bytes().to_vec(),
        page_index: None,
        source_name: doc.name().to_string(),
        media_type: MediaType::Jpeg,
    }])
}

/// [`PageSplitter`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumSplitter {
    library_path: Option<PathBuf>,
}

impl PdfiumSplitter {
    /// Bind to the library named by `PDFIUM_LIB_PATH`, else the system library.
    pub fn new() -> Self {
        Self {
            library_path: std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from),
        }
    }

    /// Bind to an explicit library file or the directory containing it.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self, source_name: &str) -> Result<Pdfium, UnitError> {
        let bindings = match &self.library_path {
            Some(p) if p.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
            }
            Some(p) => Pdfium::bind_to_library(p),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| UnitError::SplitFailed {
            source_name: source_name.to_string(),
            detail: format!("pdfium library unavailable: {e:?}"),
        })?;
        Ok(Pdfium::new(bindings))
    }

    fn load<'a>(pdfium: &'a Pdfium, doc: &'a SourceDocument) -> Result<PdfDocument<'a>, UnitError> {
        pdfium
            .load_pdf_from_byte_slice(doc.bytes(), None)
            .map_err(|e| split_err(doc, e))
    }
}

fn split_err(doc: &SourceDocument, e: PdfiumError) -> UnitError {
    UnitError::SplitFailed {
        source_name: doc.name().to_string(),
        detail: format!("{e:?}"),
    }
}

impl PageSplitter for PdfiumSplitter {
    fn page_count(&self, doc: &SourceDocument) -> Result<usize, UnitError> {
        match doc.media_type() {
            MediaType::Jpeg => Ok(1),
            MediaType::Pdf => {
                let pdfium = self.bind(doc.name())?;
                let source = Self::load(&pdfium, doc)?;
                Ok(source.pages().len() as usize)
            }
        }
    }

    fn split(&self, doc: &SourceDocument) -> Result<Vec<PageUnit>, UnitError> {
        if doc.media_type() == MediaType::Jpeg {
            return split_image(doc);
        }

        let pdfium = self.bind(doc.name())?;
        let source = Self::load(&pdfium, doc)?;
        let total = source.pages().len();
        if total == 0 {
            return Err(UnitError::SplitFailed {
                source_name: doc.name().to_string(),
                detail: "document has no pages".into(),
            });
        }
        info!("{}: {} pages", doc.name(), total);

        let mut units = Vec::with_capacity(total as usize);
        for idx in 0..total {
            let mut single = pdfium.create_new_pdf().map_err(|e| split_err(doc, e))?;
            single
                .pages_mut()
                .copy_page_from_document(&source, idx, 0)
                .map_err(|e| split_err(doc, e))?;
            let bytes = single.save_to_bytes().map_err(|e| split_err(doc, e))?;
            debug!("{}: page {} → {} bytes", doc.name(), idx + 1, bytes.len());
            units.push(PageUnit {
                bytes,
                page_index: Some(idx as usize),
                source_name: doc.name().to_string(),
                media_type: MediaType::Pdf,
            });
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn tiny_jpeg() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .expect("encode jpeg");
        buf
    }

    #[test]
    fn jpeg_is_single_unit_with_unchanged_bytes() {
        let bytes = tiny_jpeg();
        let doc = SourceDocument::new("scan.jpg", MediaType::Jpeg, bytes.clone());
        let units = split_image(&doc).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].page_index, None);
        assert_eq!(units[0].bytes, bytes);
    }

    #[test]
    fn corrupt_jpeg_is_split_failure() {
        let doc = SourceDocument::new("bad.jpg", MediaType::Jpeg, b"not a jpeg".to_vec());
        let err = split_image(&doc).unwrap_err();
        assert!(matches!(err, UnitError::SplitFailed { ref source_name, .. } if source_name == "bad.jpg"));
    }

    #[test]
    fn jpeg_page_count_needs_no_library() {
        let splitter = PdfiumSplitter::with_library_path("/nonexistent/libpdfium.so");
        let doc = SourceDocument::new("scan.jpg", MediaType::Jpeg, tiny_jpeg());
        assert_eq!(splitter.page_count(&doc).unwrap(), 1);
        assert_eq!(splitter.split(&doc).unwrap().len(), 1);
    }

    #[test]
    fn missing_library_is_split_failure_not_panic() {
        let splitter = PdfiumSplitter::with_library_path("/nonexistent/libpdfium.so");
        let doc = SourceDocument::new("a.pdf", MediaType::Pdf, b"%PDF-1.7".to_vec());
        assert!(matches!(
            splitter.split(&doc),
            Err(UnitError::SplitFailed { .. })
        ));
    }

    #[tokio::test]
    async fn split_document_runs_on_blocking_pool() {
        let splitter: Arc<dyn PageSplitter> = Arc::new(PdfiumSplitter::default());
        let doc = SourceDocument::new("scan.jpg", MediaType::Jpeg, tiny_jpeg());
        let units = split_document(splitter, doc).await.unwrap();
        assert_eq!(units[0].source_name, "scan.jpg");
    }
}
