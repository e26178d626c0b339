//! Input enumeration: build the batch worklist from a directory.
//!
//! Local directories are listed directly. Drive folders are downloaded into
//! a [`TempDir`] first, because pdfium and the splitter work on local bytes;
//! the temp directory lives as long as the returned [`DriveInput`] and is
//! removed when it is dropped, even if the batch panics.

use crate::document::{MediaType, SourceFile};
use crate::error::Pdf2CsvError;
use crate::storage::{DriveClient, StorageError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Name of the default output sub-directory.
pub const DEFAULT_OUTPUT_SUBDIR: &str = "csv";

/// `<input_dir>/csv`.
pub fn default_output_dir(input_dir: &Path) -> PathBuf {
    input_dir.join(DEFAULT_OUTPUT_SUBDIR)
}

/// List supported files (`.pdf`, `.jpg`, `.jpeg`, any case) directly inside
/// `dir`, sorted by file name. Sub-directories are not descended into.
pub fn list_local_sources(dir: &Path) -> Result<Vec<SourceFile>, Pdf2CsvError> {
    if !dir.exists() {
        return Err(Pdf2CsvError::InputNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(Pdf2CsvError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        Pdf2CsvError::Internal(format!("Failed to read '{}': {}", dir.display(), e))
    })?;

    let mut sources: Vec<SourceFile> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(SourceFile::from_path)
        .collect();
    sources.sort_by(|a, b| a.name.cmp(&b.name));

    debug!("Found {} source files in {}", sources.len(), dir.display());
    Ok(sources)
}

/// Drive sources downloaded to a temporary directory.
pub struct DriveInput {
    pub sources: Vec<SourceFile>,
    _temp_dir: TempDir,
}

/// Download every PDF and JPEG of a Drive folder for processing.
///
/// A file that fails to download stays in the worklist; reading it later
/// fails and the batch records that file as failed. An expired session
/// aborts immediately.
pub async fn download_drive_sources(
    client: &DriveClient,
    folder_id: &str,
    recursive: bool,
) -> Result<DriveInput, Pdf2CsvError> {
    let mut files: Vec<_> = client
        .list_files(folder_id, None, recursive)
        .await?
        .into_iter()
        .filter(|f| !f.is_folder())
        .filter_map(|f| {
            let media = MediaType::from_mime(&f.mime_type).or_else(|| MediaType::from_path(&f.name))?;
            Some((f, media))
        })
        .collect();
    files.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
    info!("Drive folder {}: {} source files", folder_id, files.len());
    for name in duplicate_names(files.iter().map(|(f, _)| f.name.as_str())) {
        warn!(
            "Several Drive files are named '{}'; they map to the same outputs, \
             so only the first one processed is written",
            name
        );
    }

    let temp_dir = TempDir::new().map_err(|e| Pdf2CsvError::Internal(format!("tempdir: {e}")))?;
    let mut sources = Vec::with_capacity(files.len());
    for (file, media_type) in files {
        // Prefix with the id: names are not unique across nested folders.
        let path = temp_dir.path().join(format!("{}_{}", file.id, file.name));
        match client.download_file(&file.id, &path).await {
            Ok(()) => {}
            Err(StorageError::SessionExpired(detail)) => {
                return Err(Pdf2CsvError::SessionExpired { detail });
            }
            Err(e) => warn!("Failed to download '{}': {}", file.name, e),
        }
        sources.push(SourceFile {
            path,
            name: file.name,
            media_type,
        });
    }

    Ok(DriveInput {
        sources,
        _temp_dir: temp_dir,
    })
}

/// Names occurring more than once, each reported once, in first-seen order.
fn duplicate_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.contains(&name) {
            dups.push(name);
        }
    }
    dups
}
