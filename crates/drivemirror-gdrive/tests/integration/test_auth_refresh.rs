//! Integration tests for token refresh against a mock OAuth token endpoint

use std::sync::Arc;

use chrono::{Duration, Utc};
use drivemirror_core::ports::{IRemoteStore, RemoteAuthError};
use drivemirror_gdrive::auth::{OAuth2Config, PKCEFlow};
use drivemirror_gdrive::provider::DriveRemoteStore;
use drivemirror_gdrive::token::{AccessTokenSource, FileTokenStorage, RefreshingTokenSource, Tokens};
use drivemirror_gdrive::DriveError;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

fn flow_for(server: &MockServer) -> PKCEFlow {
    let config = OAuth2Config::new("test-client-id").with_token_url(format!("{}/token", server.uri()));
    PKCEFlow::new(&config).unwrap()
}

fn expired_tokens() -> Tokens {
    Tokens {
        access_token: "stale".into(),
        refresh_token: Some("1//refresh".into()),
        expires_at: Utc::now() - Duration::minutes(5),
    }
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("token.json"));
    let source = RefreshingTokenSource::new(flow_for(&server), storage.clone(), expired_tokens());

    assert_eq!(source.access_token().await.unwrap(), "fresh");
    // Still valid, so no second refresh.
    assert_eq!(source.access_token().await.unwrap(), "fresh");

    let stored = storage.load().unwrap().unwrap();
    assert_eq!(stored.access_token, "fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
    assert!(!stored.is_expired());
}

#[tokio::test]
async fn test_load_without_token_file_asks_for_login() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("missing.json"));

    let err = RefreshingTokenSource::load(flow_for(&server), storage)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("auth login"));
}

#[tokio::test]
async fn test_revoked_refresh_token_surfaces_as_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("token.json"));
    let source = Arc::new(RefreshingTokenSource::new(
        flow_for(&server),
        storage,
        expired_tokens(),
    ));

    assert!(matches!(source.access_token().await, Err(DriveError::Token(_))));

    let store = DriveRemoteStore::new(common::client_for(&server, source));
    let err = store.list(&common::folder_id()).await.unwrap_err();
    assert!(err.downcast_ref::<RemoteAuthError>().is_some());
}
