//! Shared test helpers for Drive API integration tests
//!
//! Provides wiremock-based mock server setup for the Drive v3 endpoints.
//! Each helper mounts the necessary mock endpoints; [`setup_drive_mock`]
//! returns a [`DriveClient`] pointing at the mock server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemirror_core::domain::RemoteId;
use drivemirror_gdrive::client::DriveClient;
use drivemirror_gdrive::retry::RetryPolicy;
use drivemirror_gdrive::token::{AccessTokenSource, StaticTokenSource};
use drivemirror_gdrive::DriveError;

pub const FOLDER_ID: &str = "folder-test-001";

pub const FOLDER_QUERY: &str = "'folder-test-001' in parents and trashed = false \
     and mimeType != 'application/vnd.google-apps.folder'";

/// Client for `server` with a fixed token and millisecond backoff
pub fn client_for(server: &MockServer, tokens: Arc<dyn AccessTokenSource>) -> DriveClient {
    DriveClient::new(tokens)
        .unwrap()
        .with_base_urls(server.uri(), format!("{}/upload", server.uri()))
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
}

/// Starts a mock server and returns a (MockServer, DriveClient) tuple.
pub async fn setup_drive_mock() -> (MockServer, DriveClient) {
    let server = MockServer::start().await;
    let client = client_for(&server, Arc::new(StaticTokenSource::new("test-access-token")));
    (server, client)
}

pub fn folder_id() -> RemoteId {
    RemoteId::new(FOLDER_ID.to_string()).unwrap()
}

pub fn file_json(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "mimeType": "text/plain"
    })
}

/// Mounts a `files.list` endpoint answering a single page.
pub async fn mount_list_single_page(server: &MockServer, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", FOLDER_QUERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": files
        })))
        .mount(server)
        .await;
}

/// Mounts a resumable session endpoint for new files.
///
/// The session URL handed back is `{server}/session/{session}`.
pub async fn mount_create_session(server: &MockServer, session: &str) {
    Mock::given(method("POST"))
        .and(path("/upload/files"))
        .and(query_param("uploadType", "resumable"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/session/{}", server.uri(), session).as_str()),
        )
        .mount(server)
        .await;
}

/// Mounts a chunk endpoint answering `308` with the given acknowledged range.
pub async fn mount_chunk_incomplete(
    server: &MockServer,
    session: &str,
    content_range: &str,
    acknowledged: &str,
) {
    Mock::given(method("PUT"))
        .and(path(format!("/session/{session}")))
        .and(header("Content-Range", content_range))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", acknowledged))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
}

/// Mounts a chunk endpoint that completes the upload.
pub async fn mount_chunk_complete(
    server: &MockServer,
    session: &str,
    content_range: &str,
    id: &str,
    name: &str,
) {
    Mock::given(method("PUT"))
        .and(path(format!("/session/{session}")))
        .and(header("Content-Range", content_range))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(id, name)))
        .expect(1)
        .mount(server)
        .await;
}

/// Token source that hands out `token-1`, then `token-2` after the first
/// invalidation, and so on.
#[derive(Default)]
pub struct RotatingTokenSource {
    generation: AtomicU32,
    pub invalidations: AtomicU32,
}

#[async_trait::async_trait]
impl AccessTokenSource for RotatingTokenSource {
    async fn access_token(&self) -> Result<String, DriveError> {
        Ok(format!("token-{}", self.generation.load(Ordering::SeqCst) + 1))
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
