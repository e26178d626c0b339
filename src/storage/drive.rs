//! Google Drive v3 collaborator.
//!
//! A thin REST client over the handful of Drive endpoints the batch needs:
//! folder browsing and creation, file listing, download and multipart
//! upload. Authentication is an already-issued OAuth access token; token
//! exchange and refresh are the caller's business.
//!
//! Failures that need the user to reconnect (HTTP 401, `invalid_grant`) are
//! reported as [`StorageError::SessionExpired`] so the caller can prompt for
//! re-authentication instead of showing a generic error.

use super::{OutputSink, StorageError};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Environment variable holding the OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_DRIVE_ACCESS_TOKEN";

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

const FILE_FIELDS: &str = "id, name, mimeType, parents";
const PAGE_SIZE: &str = "1000";
const BOUNDARY: &str = "pdf2csv_multipart_boundary";
// Guards against cycles in malformed parent chains.
const MAX_FOLDER_DEPTH: usize = 64;

/// File or folder metadata as returned by Drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Authenticated Drive REST client.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    token: String,
    api_base: String,
    upload_base: String,
}

impl fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClient")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .finish()
    }
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, StorageError> {
        Self::with_base_urls(access_token, DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE)
    }

    /// Client against custom endpoints (proxies, tests).
    pub fn with_base_urls(
        access_token: impl Into<String>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let http = Client::builder()
            .user_agent(concat!("edgequake-pdf2csv/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            token: access_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client from [`ACCESS_TOKEN_ENV`], if set and non-blank.
    pub fn from_env() -> Option<Result<Self, StorageError>> {
        let token = std::env::var(ACCESS_TOKEN_ENV).ok()?;
        if token.trim().is_empty() {
            return None;
        }
        Some(Self::new(token))
    }

    // ── Folders ──────────────────────────────────────────────────────────

    /// Folders under `parent_id`, or every visible folder when `None`.
    pub async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<DriveFile>, StorageError> {
        let mut q = format!("mimeType = '{FOLDER_MIME}' and trashed = false");
        if let Some(parent) = parent_id {
            q.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }
        self.list(&q).await
    }

    /// Create a folder and return its id.
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String, StorageError> {
        let mut meta = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent_id {
            meta["parents"] = json!([parent]);
        }
        let resp = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&meta)
            .send()
            .await?;
        let created: CreatedFile = parse_json(check(resp).await?).await?;
        info!("Created Drive folder '{}' ({})", name, created.id);
        Ok(created.id)
    }

    /// Walk `parts` below `parent_id`, reusing existing folders and creating
    /// missing ones. Returns the id of the last folder.
    pub async fn create_folder_path(
        &self,
        parts: &[&str],
        parent_id: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        let mut current = parent_id.map(str::to_string);
        for part in parts {
            let mut q = format!(
                "name = '{}' and mimeType = '{FOLDER_MIME}' and trashed = false",
                escape_query(part)
            );
            if let Some(parent) = &current {
                q.push_str(&format!(" and '{}' in parents", escape_query(parent)));
            }
            let existing = self.list(&q).await?;
            current = Some(match existing.into_iter().next() {
                Some(folder) => folder.id,
                None => self.create_folder(part, current.as_deref()).await?,
            });
        }
        Ok(current)
    }

    /// The chain of folders from the root down to `folder_id`, inclusive.
    pub async fn folder_path(&self, folder_id: &str) -> Result<Vec<DriveFile>, StorageError> {
        let mut path = Vec::new();
        let mut current = Some(folder_id.to_string());
        while let Some(id) = current {
            if path.len() >= MAX_FOLDER_DEPTH {
                break;
            }
            let file = self.get_file(&id).await?;
            current = file.parents.first().cloned();
            path.push(file);
        }
        path.reverse();
        Ok(path)
    }

    // ── Files ────────────────────────────────────────────────────────────

    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile, StorageError> {
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&self.token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;
        parse_json(check(resp).await?).await
    }

    /// Files in `folder_id`, optionally filtered by MIME type.
    ///
    /// With `recursive`, files of every nested folder are included too.
    pub async fn list_files(
        &self,
        folder_id: &str,
        mime_type: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<DriveFile>, StorageError> {
        let mut out = Vec::new();
        let mut pending = vec![folder_id.to_string()];
        while let Some(folder) = pending.pop() {
            let q = format!("'{}' in parents and trashed = false", escape_query(&folder));
            for file in self.list(&q).await? {
                if recursive && file.is_folder() {
                    pending.push(file.id.clone());
                }
                if mime_type.is_none_or(|m| file.mime_type == m) {
                    out.push(file);
                }
            }
        }
        Ok(out)
    }

    /// The first non-trashed file named `name` inside `parent_id`.
    pub async fn find_file(&self, name: &str, parent_id: &str) -> Result<Option<DriveFile>, StorageError> {
        let q = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(parent_id)
        );
        Ok(self.list(&q).await?.into_iter().next())
    }

    /// Download file content to `local_path`.
    pub async fn download_file(&self, file_id: &str, local_path: &Path) -> Result<(), StorageError> {
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let bytes = check(resp).await?.bytes().await?;
        tokio::fs::write(local_path, &bytes).await?;
        debug!("Downloaded {} ({} bytes) → {}", file_id, bytes.len(), local_path.display());
        Ok(())
    }

    /// Upload a local file; the Drive name defaults to the local file name.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        parent_id: Option<&str>,
        new_name: Option<&str>,
    ) -> Result<String, StorageError> {
        let name = match new_name {
            Some(n) => n.to_string(),
            None => local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    StorageError::InvalidResponse(format!("'{}' has no file name", local_path.display()))
                })?,
        };
        let bytes = tokio::fs::read(local_path).await?;
        let mime = guess_mime(&name);
        self.upload_bytes(&name, &bytes, mime, parent_id).await
    }

    /// Multipart upload of in-memory content. Returns the new file id.
    pub async fn upload_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
        parent_id: Option<&str>,
    ) -> Result<String, StorageError> {
        let mut meta = json!({ "name": name });
        if let Some(parent) = parent_id {
            meta["parents"] = json!([parent]);
        }
        let body = multipart_body(&meta, bytes, mime_type);
        let resp = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let created: CreatedFile = parse_json(check(resp).await?).await?;
        info!("Uploaded '{}' to Drive ({})", name, created.id);
        Ok(created.id)
    }

    /// Run a `files.list` query, following `nextPageToken` to the end.
    async fn list(&self, q: &str) -> Result<Vec<DriveFile>, StorageError> {
        let fields = format!("nextPageToken, files({FILE_FIELDS})");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(&self.token)
                .query(&[
                    ("q", q),
                    ("spaces", "drive"),
                    ("fields", fields.as_str()),
                    ("pageSize", PAGE_SIZE),
                ]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let page: FileList = parse_json(check(req.send().await?).await?).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => StorageError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => StorageError::InvalidResponse(e.to_string()),
        }
    }
}

/// Map a non-success response onto the storage error taxonomy.
async fn check(resp: Response) -> Result<Response, StorageError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify(status.as_u16(), body))
}

fn classify(status: u16, body: String) -> StorageError {
    if status == 401 || body.contains("invalid_grant") {
        StorageError::SessionExpired(body)
    } else if body.contains("insufficientPermissions") {
        StorageError::PermissionDenied(body)
    } else {
        StorageError::Http { status, body }
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, StorageError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| StorageError::InvalidResponse(format!("{e}: {text}")))
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn guess_mime(name: &str) -> &'static str {
    match Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn multipart_body(meta: &serde_json::Value, bytes: &[u8], mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

// ── Output sink ──────────────────────────────────────────────────────────

/// Uploads CSV outputs into a Drive folder.
#[derive(Debug, Clone)]
pub struct DriveSink {
    client: Arc<DriveClient>,
    folder_id: String,
}

impl DriveSink {
    pub fn new(client: Arc<DriveClient>, folder_id: impl Into<String>) -> Self {
        Self {
            client,
            folder_id: folder_id.into(),
        }
    }
}

#[async_trait]
impl OutputSink for DriveSink {
    fn location(&self, name: &str) -> String {
        format!("drive://{}/{}", self.folder_id, name)
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.client.find_file(name, &self.folder_id).await?.is_some())
    }

    async fn write(&self, name: &str, contents: &str) -> Result<String, StorageError> {
        if self.exists(name).await? {
            return Err(StorageError::AlreadyExists(self.location(name)));
        }
        self.client
            .upload_bytes(name, contents.as_bytes(), "text/csv", Some(&self.folder_id))
            .await?;
        Ok(self.location(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use tempfile::TempDir;

    fn client(server: &MockServer) -> DriveClient {
        DriveClient::with_base_urls("test-token", server.url("/drive/v3"), server.url("/upload/drive/v3"))
            .expect("client")
    }

    #[tokio::test]
    async fn list_folders_sends_folder_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/drive/v3/files")
                    .header("authorization", "Bearer test-token")
                    .query_param(
                        "q",
                        "mimeType = 'application/vnd.google-apps.folder' and trashed = false and 'root' in parents",
                    )
                    .query_param("pageSize", "1000");
                then.status(200).json_body(json!({
                    "files": [
                        { "id": "f1", "name": "Scans", "mimeType": FOLDER_MIME, "parents": ["root"] }
                    ]
                }));
            })
            .await;

        let folders = client(&server).list_folders(Some("root")).await.expect("folders");
        mock.assert();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Scans");
        assert!(folders[0].is_folder());
    }

    #[tokio::test]
    async fn unauthorized_is_session_expired() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/drive/v3/files");
                then.status(401).body("{\"error\":\"unauthorized\"}");
            })
            .await;

        let err = client(&server).list_folders(None).await.unwrap_err();
        assert!(err.is_session_expired(), "{err:?}");
    }

    #[tokio::test]
    async fn invalid_grant_is_session_expired() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/drive/v3/files");
                then.status(400).body("{\"error\":\"invalid_grant\"}");
            })
            .await;

        let err = client(&server).list_folders(None).await.unwrap_err();
        assert!(err.is_session_expired());
    }

    #[tokio::test]
    async fn insufficient_permissions_is_distinct() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/drive/v3/files");
                then.status(403).body("{\"reason\":\"insufficientPermissions\"}");
            })
            .await;

        let err = client(&server).list_folders(None).await.unwrap_err();
        assert!(matches!(err, StorageError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn create_folder_returns_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/drive/v3/files")
                    .body_contains("\"name\":\"csv\"")
                    .body_contains("\"parents\":[\"p1\"]");
                then.status(200).json_body(json!({ "id": "new-folder" }));
            })
            .await;

        let id = client(&server).create_folder("csv", Some("p1")).await.expect("id");
        mock.assert();
        assert_eq!(id, "new-folder");
    }

    #[tokio::test]
    async fn upload_bytes_is_multipart() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/upload/drive/v3/files")
                    .query_param("uploadType", "multipart")
                    .header_exists("content-type")
                    .body_contains("\"name\":\"scan.csv\"")
                    .body_contains("a,b\n1,2");
                then.status(200).json_body(json!({ "id": "uploaded" }));
            })
            .await;

        let id = client(&server)
            .upload_bytes("scan.csv", b"a,b\n1,2", "text/csv", Some("out"))
            .await
            .expect("upload");
        mock.assert();
        assert_eq!(id, "uploaded");
    }

    #[tokio::test]
    async fn download_writes_local_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/drive/v3/files/abc").query_param("alt", "media");
                then.status(200).body("%PDF-1.7 bytes");
            })
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("a.pdf");
        client(&server).download_file("abc", &dest).await.expect("download");
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7 bytes");
    }

    #[tokio::test]
    async fn list_files_filters_by_mime() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/drive/v3/files");
                then.status(200).json_body(json!({
                    "files": [
                        { "id": "1", "name": "a.pdf", "mimeType": "application/pdf" },
                        { "id": "2", "name": "b.jpg", "mimeType": "image/jpeg" }
                    ]
                }));
            })
            .await;

        let files = client(&server)
            .list_files("folder", Some("application/pdf"), false)
            .await
            .expect("files");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.pdf");
    }

    #[tokio::test]
    async fn drive_sink_exists_uses_name_query() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/drive/v3/files").query_param(
                    "q",
                    "name = 'r_page1.csv' and 'out' in parents and trashed = false",
                );
                then.status(200).json_body(json!({
                    "files": [{ "id": "x", "name": "r_page1.csv", "mimeType": "text/csv" }]
                }));
            })
            .await;

        let sink = DriveSink::new(Arc::new(client(&server)), "out");
        assert!(sink.exists("r_page1.csv").await.expect("exists"));
        assert_eq!(sink.location("r_page1.csv"), "drive://out/r_page1.csv");
    }

    #[test]
    fn query_literals_are_escaped() {
        assert_eq!(escape_query("O'Brien"), "O\\'Brien");
    }

    #[test]
    fn classify_maps_statuses() {
        assert!(classify(401, String::new()).is_session_expired());
        assert!(matches!(classify(500, "boom".into()), StorageError::Http { status: 500, .. }));
    }
}
