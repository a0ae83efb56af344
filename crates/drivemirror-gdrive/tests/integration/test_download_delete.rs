//! Integration tests for media download, delete and the 401 refresh path

use std::sync::atomic::Ordering;
use std::sync::Arc;

use drivemirror_core::domain::RemoteId;
use drivemirror_gdrive::DriveError;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_download_streams_to_file() {
    let (server, client) = common::setup_drive_mock().await;
    let content: Vec<u8> = (0..1_048_576u32).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/files/file-001"))
        .and(query_param("alt", "media"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.clone())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("download.bin");
    std::fs::write(&dest, b"stale content that must be replaced").unwrap();

    let id = RemoteId::new("file-001".to_string()).unwrap();
    let bytes = client.download(&id, &dest).await.unwrap();

    assert_eq!(bytes, content.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

#[tokio::test]
async fn test_download_google_doc_is_forbidden() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/doc-001"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {
                "code": 403,
                "message": "Only files with binary content can be downloaded. Use Export with Docs Editors files.",
                "errors": [{ "reason": "fileNotDownloadable" }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let id = RemoteId::new("doc-001".to_string()).unwrap();
    let err = client
        .download(&id, &dir.path().join("doc"))
        .await
        .unwrap_err();

    assert!(matches!(err, DriveError::Forbidden { ref reason, .. } if reason == "fileNotDownloadable"));
}

#[tokio::test]
async fn test_delete_file() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/files/file-002"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let id = RemoteId::new("file-002".to_string()).unwrap();
    client.delete(&id).await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_refreshes_token_once() {
    let server = wiremock::MockServer::start().await;
    let tokens = Arc::new(common::RotatingTokenSource::default());
    let client = common::client_for(&server, tokens.clone());

    Mock::given(method("DELETE"))
        .and(path("/files/file-003"))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/file-003"))
        .and(header("Authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let id = RemoteId::new("file-003".to_string()).unwrap();
    client.delete(&id).await.unwrap();
    assert_eq!(tokens.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_unauthorized_is_an_error() {
    let server = wiremock::MockServer::start().await;
    let tokens = Arc::new(common::RotatingTokenSource::default());
    let client = common::client_for(&server, tokens.clone());

    Mock::given(method("DELETE"))
        .and(path("/files/file-004"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let id = RemoteId::new("file-004".to_string()).unwrap();
    let err = client.delete(&id).await.unwrap_err();
    assert!(matches!(err, DriveError::Unauthorized(_)));
}
