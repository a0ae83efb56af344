//! Google Drive v3 HTTP client
//!
//! Wraps `reqwest::Client` with bearer authentication, a single token
//! refresh on HTTP 401, and exponential backoff for transient failures.
//! Only the handful of endpoints a folder mirror needs are exposed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drivemirror_core::domain::RemoteId;
//! use drivemirror_gdrive::client::DriveClient;
//! use drivemirror_gdrive::token::StaticTokenSource;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DriveClient::new(Arc::new(StaticTokenSource::new("access-token")))?;
//! let files = client.list_folder(&RemoteId::new("folder-id".into())?).await?;
//! println!("{} files", files.len());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use drivemirror_core::domain::{FileName, RemoteId};
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::retry::RetryPolicy;
use crate::token::AccessTokenSource;
use crate::DriveError;

/// Base URL for Drive v3 metadata and media requests
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Base URL for Drive v3 upload requests
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Default resumable upload chunk size (8 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Fields requested for every file resource
pub(crate) const FILE_FIELDS: &str = "id,name,mimeType";

const PAGE_SIZE: &str = "1000";

const USER_AGENT: &str = concat!("drivemirror/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Drive API response types
// ============================================================================

/// File resource as returned by Drive v3 (only the requested fields)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
}

impl DriveFile {
    /// Google Docs, Sheets and friends have no binary content to download
    pub fn is_google_native(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("application/vnd.google-apps."))
    }
}

/// One page of a `files.list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Google Drive v3 calls
pub struct DriveClient {
    /// Client for metadata and media requests
    http: Client,
    /// Client for resumable upload sessions; never follows redirects, since
    /// Drive answers an incomplete chunk with `308` and no `Location`
    upload_http: Client,
    api_base: String,
    upload_base: String,
    tokens: Arc<dyn AccessTokenSource>,
    retry: RetryPolicy,
    chunk_size: usize,
}

impl DriveClient {
    /// Creates a client against the public Drive endpoints
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Result<Self, DriveError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        let upload_http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            upload_http,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            tokens,
            retry: RetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Points the client at different endpoints (useful for testing)
    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the resumable upload chunk size in bytes
    ///
    /// Drive requires every chunk except the last to be a multiple of 256 KiB.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    pub(crate) fn upload_url(&self, path: &str) -> String {
        format!("{}{}", self.upload_base, path)
    }

    pub(crate) fn upload_http(&self) -> &Client {
        &self.upload_http
    }

    /// Sends one request with a bearer token
    ///
    /// A 401 invalidates the token and the request is sent once more with a
    /// fresh one. Success statuses and `308` (resumable upload incomplete)
    /// are returned as `Ok`; everything else is classified into a
    /// [`DriveError`].
    pub(crate) async fn send_authorized<B>(
        &self,
        http: &Client,
        build: &B,
    ) -> Result<Response, DriveError>
    where
        B: Fn(&Client) -> RequestBuilder + Sync,
    {
        let token = self.tokens.access_token().await?;
        let mut response = build(http).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Access token rejected, refreshing and retrying once");
            self.tokens.invalidate().await;
            let token = self.tokens.access_token().await?;
            response = build(http).bearer_auth(&token).send().await?;
        }

        let status = response.status();
        if status.is_success() || status == StatusCode::PERMANENT_REDIRECT {
            Ok(response)
        } else {
            Err(DriveError::from_response(response).await)
        }
    }

    /// Sends a request through the retry policy
    pub(crate) async fn execute<B>(&self, operation: &str, build: B) -> Result<Response, DriveError>
    where
        B: Fn(&Client) -> RequestBuilder + Sync,
    {
        let build = &build;
        self.retry
            .run(operation, move || self.send_authorized(&self.http, build))
            .await
    }

    /// Lists the non-folder, non-trashed children of a folder
    ///
    /// Follows `nextPageToken` until the listing is exhausted.
    pub async fn list_folder(&self, folder_id: &RemoteId) -> Result<Vec<DriveFile>, DriveError> {
        let query = format!(
            "'{}' in parents and trashed = false and mimeType != '{}'",
            folder_id.as_str(),
            FOLDER_MIME_TYPE
        );
        self.list_query(&query).await
    }

    /// Finds non-trashed files in a folder whose name matches exactly
    ///
    /// Drive allows duplicate names, so more than one file may come back.
    pub async fn find_by_name(
        &self,
        folder_id: &RemoteId,
        name: &FileName,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false and mimeType != '{}'",
            folder_id.as_str(),
            escape_query_literal(name.as_str()),
            FOLDER_MIME_TYPE
        );
        self.list_query(&query).await
    }

    async fn list_query(&self, query: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = self.api_url("/files");
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let response = self
                .execute("files.list", |http| {
                    let mut params = vec![
                        ("q", query),
                        ("fields", fields.as_str()),
                        ("pageSize", PAGE_SIZE),
                    ];
                    if let Some(token) = page_token.as_deref() {
                        params.push(("pageToken", token));
                    }
                    http.get(&url).query(&params)
                })
                .await?;

            let page: FileList = response.json().await?;
            pages += 1;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(query, pages, count = files.len(), "Listed files");
        Ok(files)
    }

    /// Streams a file's content into `dest`, truncating it first
    ///
    /// A failure while streaming restarts the download from scratch.
    ///
    /// # Returns
    /// The number of bytes written
    pub async fn download(&self, id: &RemoteId, dest: &Path) -> Result<u64, DriveError> {
        let bytes = self
            .retry
            .run("files.get media", move || self.download_once(id, dest))
            .await?;
        info!(id = %id, dest = %dest.display(), bytes, "Downloaded file");
        Ok(bytes)
    }

    async fn download_once(&self, id: &RemoteId, dest: &Path) -> Result<u64, DriveError> {
        let url = self.api_url(&format!("/files/{}", id.as_str()));
        let response = self
            .send_authorized(&self.http, &|http: &Client| {
                http.get(&url).query(&[("alt", "media")])
            })
            .await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Permanently deletes a file (bypassing the trash)
    pub async fn delete(&self, id: &RemoteId) -> Result<(), DriveError> {
        let url = self.api_url(&format!("/files/{}", id.as_str()));
        self.execute("files.delete", |http| http.delete(&url)).await?;
        info!(id = %id, "Deleted remote file");
        Ok(())
    }
}

/// Escapes a value for use inside a single-quoted Drive query literal
pub fn escape_query_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
