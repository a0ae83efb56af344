//! Resumable uploads to Google Drive
//!
//! Every upload, whatever its size, goes through a resumable session:
//!
//! 1. `POST` (new file) or `PATCH` (new revision) on the upload endpoint
//!    with `uploadType=resumable` opens a session; its URL comes back in
//!    the `Location` header.
//! 2. The file is sent in chunks with `Content-Range: bytes {start}-{end}/{total}`.
//!    Drive answers `308` while incomplete, with a `Range` header telling
//!    how much it has, and `200`/`201` with the file resource when done.
//! 3. After a transient failure the session is queried with
//!    `Content-Range: bytes */{total}` and the upload resumes from the
//!    offset Drive reports.

use std::path::Path;

use drivemirror_core::domain::{FileName, RemoteId};
use reqwest::{Client, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::client::{DriveClient, DriveFile, FILE_FIELDS};
use crate::DriveError;

/// What the upload writes to
#[derive(Debug, Clone)]
pub enum UploadTarget<'a> {
    /// A new file in `folder_id`
    Create {
        folder_id: &'a RemoteId,
        name: &'a FileName,
    },
    /// A new revision of an existing file
    Update { id: &'a RemoteId },
}

/// Server state of an upload session after a chunk or status query
#[derive(Debug, PartialEq, Eq)]
enum SessionState {
    /// Drive holds bytes `0..next_offset`
    Incomplete { next_offset: u64 },
    /// The upload finished and produced this file
    Complete(DriveFile),
}

/// Uploads a local file through a resumable session
///
/// # Returns
/// The resulting Drive file resource
pub async fn upload_file(
    client: &DriveClient,
    target: UploadTarget<'_>,
    local_path: &Path,
) -> Result<DriveFile, DriveError> {
    let mut file = tokio::fs::File::open(local_path).await?;
    let total = file.metadata().await?.len();

    let session_url = create_session(client, &target, total).await?;
    debug!(path = %local_path.display(), total, "Upload session created");

    let retry = client.retry_policy();
    let chunk_size = client.chunk_size() as u64;
    let mut offset = 0u64;
    let mut failures = 0u32;
    let mut stalls = 0u32;
    let mut last_logged = None;

    loop {
        let result = if total == 0 {
            put_bytes(client, &session_url, "bytes */0".to_string(), Vec::new()).await
        } else {
            let len = chunk_size.min(total - offset);
            let mut chunk = vec![0u8; len as usize];
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;
            let range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);
            put_bytes(client, &session_url, range, chunk).await
        };

        let mut resumed = false;
        let state = match result {
            Ok(state) => {
                failures = 0;
                state
            }
            Err(err) if err.is_transient() && failures < retry.max_retries() => {
                let delay = err.retry_after().unwrap_or_else(|| retry.delay_for(failures));
                warn!(
                    path = %local_path.display(),
                    offset,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Chunk upload failed, resuming session"
                );
                tokio::time::sleep(delay).await;
                failures += 1;
                resumed = true;
                let status_range = format!("bytes */{total}");
                let (url, range) = (session_url.as_str(), status_range.as_str());
                retry
                    .run("upload status", move || {
                        put_bytes(client, url, range.to_string(), Vec::new())
                    })
                    .await?
            }
            Err(err) => return Err(err),
        };

        match state {
            SessionState::Complete(drive_file) => {
                info!(
                    path = %local_path.display(),
                    id = %drive_file.id,
                    bytes = total,
                    "Upload complete"
                );
                return Ok(drive_file);
            }
            SessionState::Incomplete { next_offset } => {
                if next_offset > total {
                    return Err(DriveError::InvalidResponse(format!(
                        "upload session reports {next_offset} of {total} bytes"
                    )));
                }
                // A chunk that was accepted without moving the offset
                if !resumed && next_offset <= offset {
                    stalls += 1;
                    if stalls > retry.max_retries() {
                        return Err(DriveError::InvalidResponse(format!(
                            "upload session stuck at {next_offset} of {total} bytes"
                        )));
                    }
                    debug!(
                        path = %local_path.display(),
                        offset,
                        stalls,
                        "Chunk not acknowledged, resending"
                    );
                } else {
                    stalls = 0;
                }
                offset = next_offset;
                let percent = offset * 100 / total.max(1);
                if last_logged != Some(percent) {
                    info!(path = %local_path.display(), percent, "Upload progress");
                    last_logged = Some(percent);
                }
            }
        }
    }
}

/// Opens a resumable session and returns its URL
async fn create_session(
    client: &DriveClient,
    target: &UploadTarget<'_>,
    total: u64,
) -> Result<String, DriveError> {
    let (url, metadata, create) = match target {
        UploadTarget::Create { folder_id, name } => (
            client.upload_url("/files"),
            serde_json::json!({
                "name": name.as_str(),
                "parents": [folder_id.as_str()],
            }),
            true,
        ),
        UploadTarget::Update { id } => (
            client.upload_url(&format!("/files/{}", id.as_str())),
            serde_json::json!({}),
            false,
        ),
    };

    let response = client
        .execute("upload session", |http: &Client| {
            let request = if create {
                http.post(&url)
            } else {
                http.patch(&url)
            };
            request
                .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
                .header("X-Upload-Content-Length", total.to_string())
                .json(&metadata)
        })
        .await?;

    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            DriveError::InvalidResponse("upload session response has no Location header".into())
        })
}

/// Sends one `PUT` to the session URL
async fn put_bytes(
    client: &DriveClient,
    session_url: &str,
    content_range: String,
    body: Vec<u8>,
) -> Result<SessionState, DriveError> {
    let response = client
        .send_authorized(client.upload_http(), &|http: &Client| {
            http.put(session_url)
                .header(reqwest::header::CONTENT_RANGE, content_range.as_str())
                .body(body.clone())
        })
        .await?;
    session_state(response).await
}

async fn session_state(response: Response) -> Result<SessionState, DriveError> {
    if response.status() == StatusCode::PERMANENT_REDIRECT {
        let next_offset = response
            .headers()
            .get(reqwest::header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(parse_range_end)
            .transpose()?
            .map_or(0, |end| end + 1);
        return Ok(SessionState::Incomplete { next_offset });
    }

    let file: DriveFile = response.json().await?;
    Ok(SessionState::Complete(file))
}

/// Parses the inclusive end of a `Range: bytes=0-N` header
fn parse_range_end(value: &str) -> Result<u64, DriveError> {
    value
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.trim().parse::<u64>().ok())
        .ok_or_else(|| DriveError::InvalidResponse(format!("malformed Range header `{value}`")))
}
