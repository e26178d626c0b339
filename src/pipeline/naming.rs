//! Output naming and idempotency checks.
//!
//! Every unit maps to exactly one output name derived from its source name
//! and page index, so a re-run over the same inputs finds the outputs of the
//! previous run and skips them. Existing outputs are never overwritten.

use crate::config::NamingStrategy;
use crate::pipeline::sanitize::CollectionMetadata;
use crate::storage::{OutputSink, StorageError};
use std::path::{Path, PathBuf};

/// Output file name for a unit: `<base>[_page<N>].csv`.
///
/// `page_index` is 0-based; the name carries the 1-based page number.
/// PDF units always carry the suffix, even for single-page documents.
pub fn output_file_name(source_name: &str, page_index: Option<usize>) -> String {
    let base = base_name(source_name);
    match page_index {
        Some(idx) => format!("{base}_page{}.csv", idx + 1),
        None => format!("{base}.csv"),
    }
}

/// Output file name under a [`NamingStrategy`].
///
/// For [`NamingStrategy::WithMetadata`] the non-empty date and station are
/// inserted before the page suffix, e.g. `report_2023-10_ABC_page1.csv`.
pub fn output_file_name_with(
    strategy: NamingStrategy,
    source_name: &str,
    page_index: Option<usize>,
    metadata: Option<&CollectionMetadata>,
) -> String {
    let meta = match (strategy, metadata) {
        (NamingStrategy::WithMetadata, Some(m)) => m,
        _ => return output_file_name(source_name, page_index),
    };

    let mut name = base_name(source_name).to_string();
    for field in [&meta.collection_date, &meta.station_code] {
        let safe = filename_safe(field);
        if !safe.is_empty() {
            name.push('_');
            name.push_str(&safe);
        }
    }
    if let Some(idx) = page_index {
        name.push_str(&format!("_page{}", idx + 1));
    }
    name.push_str(".csv");
    name
}

/// Destination path of a unit inside `output_dir`. Pure.
pub fn resolve_output_path(
    source_name: &str,
    page_index: Option<usize>,
    output_dir: &Path,
) -> PathBuf {
    output_dir.join(output_file_name(source_name, page_index))
}

/// True iff a file already exists at `path`.
pub fn should_skip(path: &Path) -> bool {
    path.is_file()
}

/// True iff every page output of a `page_count`-page PDF exists in `output_dir`.
///
/// A zero page count is never "complete".
pub fn all_pages_exist(source_name: &str, page_count: usize, output_dir: &Path) -> bool {
    page_count > 0
        && (0..page_count).all(|idx| should_skip(&resolve_output_path(source_name, Some(idx), output_dir)))
}

/// [`all_pages_exist`] against any output sink.
pub async fn all_units_exist(
    sink: &dyn OutputSink,
    source_name: &str,
    page_indices: &[Option<usize>],
) -> Result<bool, StorageError> {
    if page_indices.is_empty() {
        return Ok(false);
    }
    for idx in page_indices {
        if !sink.exists(&output_file_name(source_name, *idx)).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Source name without its final extension.
fn base_name(source_name: &str) -> &str {
    let file = Path::new(source_name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(source_name);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    }
}

/// Keep alphanumerics, `-` and `.`; map everything else to `-`.
fn filename_safe(s: &str) -> String {
    let mapped: String = s
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect();
    mapped.trim_matches(|c| c == '-' || c == '.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pdf_page_names_are_one_based() {
        assert_eq!(output_file_name("report.pdf", Some(0)), "report_page1.csv");
        assert_eq!(output_file_name("report.pdf", Some(9)), "report_page10.csv");
    }

    #[test]
    fn image_name_has_no_suffix() {
        assert_eq!(output_file_name("scan.jpg", None), "scan.csv");
        assert_eq!(output_file_name("scan.JPEG", None), "scan.csv");
    }

    #[test]
    fn only_final_extension_is_removed() {
        assert_eq!(output_file_name("site.2020.pdf", Some(1)), "site.2020_page2.csv");
        assert_eq!(output_file_name("noext", None), "noext.csv");
    }

    #[test]
    fn resolve_is_deterministic() {
        let dir = Path::new("/out");
        let a = resolve_output_path("report.pdf", Some(2), dir);
        let b = resolve_output_path("report.pdf", Some(2), dir);
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/out/report_page3.csv"));
    }

    #[test]
    fn metadata_naming_inserts_fields() {
        let meta = CollectionMetadata {
            collection_date: "2023-10".into(),
            station_code: "ABC".into(),
        };
        let name =
            output_file_name_with(NamingStrategy::WithMetadata, "report.pdf", Some(0), Some(&meta));
        assert_eq!(name, "report_2023-10_ABC_page1.csv");
    }

    #[test]
    fn metadata_naming_skips_empty_fields_and_sanitises() {
        let meta = CollectionMetadata {
            collection_date: String::new(),
            station_code: "North/1".into(),
        };
        let name = output_file_name_with(NamingStrategy::WithMetadata, "scan.jpg", None, Some(&meta));
        assert_eq!(name, "scan_North-1.csv");
    }

    #[test]
    fn source_strategy_ignores_metadata() {
        let meta = CollectionMetadata {
            collection_date: "2023-10".into(),
            station_code: "ABC".into(),
        };
        let name =
            output_file_name_with(NamingStrategy::SourceName, "report.pdf", Some(0), Some(&meta));
        assert_eq!(name, "report_page1.csv");
    }

    #[test]
    fn skip_and_all_pages() {
        let dir = TempDir::new().unwrap();
        assert!(!should_skip(&resolve_output_path("r.pdf", Some(0), dir.path())));
        assert!(!all_pages_exist("r.pdf", 2, dir.path()));

        std::fs::write(resolve_output_path("r.pdf", Some(0), dir.path()), "a").unwrap();
        assert!(should_skip(&resolve_output_path("r.pdf", Some(0), dir.path())));
        assert!(!all_pages_exist("r.pdf", 2, dir.path()));

        std::fs::write(resolve_output_path("r.pdf", Some(1), dir.path()), "a").unwrap();
        assert!(all_pages_exist("r.pdf", 2, dir.path()));
        assert!(!all_pages_exist("r.pdf", 0, dir.path()));
    }
}
