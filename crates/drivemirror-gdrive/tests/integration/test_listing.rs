//! Integration tests for folder listing and name lookup
//!
//! Verifies pagination, query construction, retry on transient failures
//! and error classification against a wiremock-based Drive mock server.

use drivemirror_core::domain::FileName;
use drivemirror_core::ports::IRemoteStore;
use drivemirror_gdrive::provider::DriveRemoteStore;
use drivemirror_gdrive::DriveError;
use wiremock::{
    matchers::{method, path, query_param, query_param_is_missing},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_list_single_page() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_list_single_page(
        &server,
        serde_json::json!([
            common::file_json("id-a", "a.txt"),
            common::file_json("id-b", "b.txt"),
        ]),
    )
    .await;

    let files = client.list_folder(&common::folder_id()).await.unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_list_follows_page_tokens() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "page-2",
            "files": [common::file_json("id-1", "one.txt")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::file_json("id-2", "two.txt")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let files = client.list_folder(&common::folder_id()).await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[1].id, "id-2");
}

#[tokio::test]
async fn test_list_sends_bearer_and_fields() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(wiremock::matchers::header(
            "Authorization",
            "Bearer test-access-token",
        ))
        .and(query_param("fields", "nextPageToken,files(id,name,mimeType)"))
        .and(query_param("pageSize", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.list_folder(&common::folder_id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_by_name_escapes_quotes() {
    let (server, client) = common::setup_drive_mock().await;

    let expected_query = "'folder-test-001' in parents and name = 'it\\'s.txt' \
         and trashed = false and mimeType != 'application/vnd.google-apps.folder'";
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", expected_query))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                common::file_json("dup-1", "it's.txt"),
                common::file_json("dup-2", "it's.txt"),
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let name = FileName::new("it's.txt".to_string()).unwrap();
    let matches = client.find_by_name(&common::folder_id(), &name).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "dup-1");
}

#[tokio::test]
async fn test_list_retries_server_error() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    common::mount_list_single_page(&server, serde_json::json!([common::file_json("id-a", "a.txt")]))
        .await;

    let files = client.list_folder(&common::folder_id()).await.unwrap();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_list_retries_rate_limit_403() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {
                "code": 403,
                "message": "User Rate Limit Exceeded",
                "errors": [{ "reason": "userRateLimitExceeded" }]
            }
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    common::mount_list_single_page(&server, serde_json::json!([])).await;

    assert!(client.list_folder(&common::folder_id()).await.is_ok());
}

#[tokio::test]
async fn test_list_not_found_is_not_retried() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "code": 404, "message": "File not found: folder-test-001." }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.list_folder(&common::folder_id()).await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)));
}

#[tokio::test]
async fn test_remote_store_list_maps_entries() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_list_single_page(
        &server,
        serde_json::json!([
            common::file_json("id-a", "a.txt"),
            common::file_json("id-bad", "nested/name.txt"),
        ]),
    )
    .await;

    let store = DriveRemoteStore::new(client);
    let files = store.list(&common::folder_id()).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name.as_str(), "a.txt");
    assert_eq!(files[0].id.as_str(), "id-a");
}
