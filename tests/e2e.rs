//! End-to-end tests against real pdfium and the live Gemini API.
//!
//! Gated behind `E2E_ENABLED` so they never run in CI by accident. Put a few
//! scanned tables into `./test_cases/` (any mix of .pdf / .jpg) and run:
//!
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! The Drive test additionally needs `GOOGLE_DRIVE_ACCESS_TOKEN`,
//! `E2E_DRIVE_INPUT` and `E2E_DRIVE_OUTPUT` (folder IDs).

use edgequake_pdf2csv::pipeline::input::list_local_sources;
use edgequake_pdf2csv::pipeline::split::count_pages;
use edgequake_pdf2csv::{
    convert_directory, convert_drive_folder, DriveClient, ExtractionConfig, MediaType,
    PageSplitter, PdfiumSplitter, UnitStatus,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E is enabled and `test_cases/` holds at least one source.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let dir = test_cases_dir();
        match list_local_sources(&dir) {
            Ok(sources) if !sources.is_empty() => sources,
            _ => {
                println!("SKIP: no .pdf/.jpg files in {}", dir.display());
                return;
            }
        }
    }};
}

/// Basic CSV shape checks: no fences, at least a header and one row.
fn assert_csv_quality(csv: &str, context: &str) {
    assert!(!csv.trim().is_empty(), "[{context}] CSV is empty");
    assert!(
        !csv.contains("```"),
        "[{context}] CSV still contains a code fence"
    );
    let rows: Vec<&str> = csv
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with("#METADATA:"))
        .collect();
    assert!(rows.len() >= 2, "[{context}] expected header + rows, got {rows:?}");
    assert!(
        rows[0].contains(','),
        "[{context}] header has no delimiter: {:?}",
        rows[0]
    );
}

// ── pdfium ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_split_real_documents() {
    let sources = e2e_skip_unless_ready!();
    let splitter = Arc::new(PdfiumSplitter::new());

    for source in sources {
        let doc = source.read().await.expect("read source");
        let expected = count_pages(splitter.clone(), doc.clone())
            .await
            .expect("count pages");
        let units = splitter.split(&doc).expect("split");
        assert_eq!(units.len(), expected, "{}", source.name);
        if source.media_type == MediaType::Pdf {
            for (i, unit) in units.iter().enumerate() {
                assert_eq!(unit.page_index, Some(i));
                assert!(unit.bytes.starts_with(b"%PDF"), "{} p{}", source.name, i + 1);
            }
        }
    }
}

// ── Gemini ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_test_cases_directory() {
    let sources = e2e_skip_unless_ready!();
    let out = tempfile::TempDir::new().unwrap();
    let config = ExtractionConfig::builder().build().unwrap();

    let report = convert_directory(test_cases_dir(), Some(out.path()), &config)
        .await
        .expect("batch should start");

    println!(
        "{} files: {} written, {} skipped, {} failed, {} model calls",
        sources.len(),
        report.processed,
        report.skipped,
        report.failed,
        report.model_calls
    );
    assert!(report.processed > 0, "no CSV written: {report:#?}");
    for unit in report.files.iter().flat_map(|f| f.units.iter()) {
        if let UnitStatus::Written(record) = &unit.status {
            let on_disk = std::fs::read_to_string(&record.location).unwrap();
            assert_eq!(on_disk, record.csv);
            assert_csv_quality(&on_disk, &record.location);
        }
    }

    // Re-running the same batch must not call the model again.
    let again = convert_directory(test_cases_dir(), Some(out.path()), &config)
        .await
        .unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.skipped, report.processed + report.skipped);
}

// ── Google Drive ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_drive_round_trip() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let (Ok(input), Ok(output)) = (
        std::env::var("E2E_DRIVE_INPUT"),
        std::env::var("E2E_DRIVE_OUTPUT"),
    ) else {
        println!("SKIP: set E2E_DRIVE_INPUT and E2E_DRIVE_OUTPUT");
        return;
    };
    let Some(drive) = DriveClient::from_env() else {
        println!("SKIP: GOOGLE_DRIVE_ACCESS_TOKEN not set");
        return;
    };
    let drive = Arc::new(drive.expect("drive client"));
    let config = ExtractionConfig::builder().build().unwrap();

    let report = convert_drive_folder(drive.clone(), &input, &output, false, &config)
        .await
        .expect("drive batch should start");
    assert!(!report.session_expired());

    for location in report.output_locations() {
        let name = location.rsplit('/').next().unwrap();
        let found = drive.find_file(name, &output).await.unwrap();
        assert!(found.is_some(), "{location} missing from Drive");
    }
}
