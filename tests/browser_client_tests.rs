//! Tests for the long-lived client's refresh-and-retry behavior.
//!
//! Tests cover:
//! - Concurrent 401s coalesce onto exactly one refresh
//! - A failed refresh rejects every waiter, clears credentials, and redirects
//! - A retried request that fails again is not refreshed a second time
//! - Login, logout, locale, and downloads

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{EMAIL, MockBackend, NUMERIC_UID, PASSWORD, ROLE, UID};
use directory_portal::auth::{Credentials, HttpBackend, SessionError};
use directory_portal::client::{
    ApiRequest, BrowserClient, ClientError, FileStore, Navigator, TokenStore, USER_ROLE_KEY,
};
use directory_portal::locale::Locale;
use futures::future::join_all;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;

/// Navigator that records every redirect.
#[derive(Default)]
struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_string());
    }
}

fn credentials() -> Credentials {
    Credentials {
        email: EMAIL.to_string(),
        password: PASSWORD.to_string(),
    }
}

fn build_client(backend: &MockBackend, navigator: Arc<RecordingNavigator>) -> BrowserClient {
    let session_backend = Arc::new(HttpBackend::new(backend.base.clone()));
    BrowserClient::builder(backend.base.clone(), session_backend)
        .navigator(navigator)
        .build()
        .expect("Failed to build client")
}

async fn logged_in_client(backend: &MockBackend) -> (BrowserClient, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let client = build_client(backend, navigator.clone());
    client.login(&credentials()).await.expect("Login failed");
    (client, navigator)
}

// ============================================================================
// Coalesced refresh
// ============================================================================

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let backend = MockBackend::start().await;
    let (client, navigator) = logged_in_client(&backend).await;
    let old_token = client.store().access_token().unwrap();

    backend.state.revoke_access_tokens();
    backend.state.set_refresh_delay(Duration::from_millis(200));

    let results = join_all((0..5).map(|_| {
        let client = client.clone();
        async move { client.get_json::<Value>("profile").await }
    }))
    .await;

    for result in &results {
        assert_eq!(result.as_ref().unwrap()["uid"], UID);
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert!(navigator.redirects().is_empty());

    let new_token = client.store().access_token().unwrap();
    assert_ne!(new_token, old_token);

    // Every retry carried the single refreshed token.
    let tokens = backend.state.authorized_tokens();
    assert_eq!(tokens.len(), 5);
    assert!(tokens.iter().all(|t| t == new_token.as_str()));
}

#[tokio::test]
async fn test_failed_refresh_rejects_all_waiters() {
    let backend = MockBackend::start().await;
    let (client, navigator) = logged_in_client(&backend).await;

    backend.state.revoke_access_tokens();
    backend.state.reject_refresh.store(true, Ordering::SeqCst);
    backend.state.set_refresh_delay(Duration::from_millis(200));

    let results = join_all((0..3).map(|_| {
        let client = client.clone();
        async move { client.get_json::<Value>("institution").await }
    }))
    .await;

    let errors: Vec<ClientError> = results.into_iter().map(|r| r.unwrap_err()).collect();
    for error in &errors {
        assert!(matches!(
            error,
            ClientError::Session(SessionError::RefreshFailed(_))
        ));
        assert_eq!(error.to_string(), errors[0].to_string());
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(navigator.redirects(), vec!["/en/login".to_string()]);
    assert!(client.store().access_token().is_none());
    assert!(client.store().user_role().is_none());
    assert!(!client.has_session());
}

#[tokio::test]
async fn test_retried_request_is_not_refreshed_again() {
    let backend = MockBackend::start().await;
    let (client, navigator) = logged_in_client(&backend).await;

    let err = client.get_json::<Value>("locked").await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(err.is_unauthorized());
    assert_eq!(backend.refresh_calls(), 1);
    assert!(navigator.redirects().is_empty());
    // The session itself is still usable.
    assert!(client.has_session());
    assert!(client.get_json::<Value>("profile").await.is_ok());
}

#[tokio::test]
async fn test_non_auth_errors_pass_through() {
    let backend = MockBackend::start().await;
    let (client, _) = logged_in_client(&backend).await;

    let request = ApiRequest::get("personnel")
        .query("department", "restricted");
    let err = client.send(request).await.unwrap_err();

    assert_eq!(err.status(), Some(403));
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_refresh_endpoint_401_is_not_refreshed() {
    let backend = MockBackend::start().await;
    let (client, navigator) = logged_in_client(&backend).await;

    for path in ["auth/refresh", "/auth/refresh"] {
        let request = ApiRequest::post(path)
            .json(&json!({ "refreshToken": "unknown" }))
            .unwrap();
        let err = client.send(request).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    // Only the two direct calls reached the endpoint.
    assert_eq!(backend.refresh_calls(), 2);
    assert!(navigator.redirects().is_empty());
    assert!(client.has_session());
}

#[tokio::test]
async fn test_request_already_retried_is_not_refreshed() {
    let backend = MockBackend::start().await;
    let (client, navigator) = logged_in_client(&backend).await;
    let token = client.store().access_token().unwrap();
    backend.state.revoke_access_tokens();

    let err = client
        .send(ApiRequest::get("profile").into_retry())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(backend.refresh_calls(), 0);
    assert!(navigator.redirects().is_empty());
    assert_eq!(client.store().access_token(), Some(token));
}

// ============================================================================
// Session management
// ============================================================================

#[tokio::test]
async fn test_login_and_logout() {
    let backend = MockBackend::start().await;
    let navigator = Arc::new(RecordingNavigator::default());
    let client = build_client(&backend, navigator);
    assert!(!client.has_session());

    let outcome = client.login(&credentials()).await.unwrap();
    assert_eq!(outcome.uid, UID);
    assert_eq!(outcome.user_role, ROLE);
    assert_eq!(outcome.token_type, "Bearer");
    assert!(client.has_session());
    assert!(client.store().access_token().is_some());
    assert_eq!(client.store().get(USER_ROLE_KEY).as_deref(), Some(ROLE));

    client.logout().await;
    assert_eq!(backend.logout_calls(), 1);
    assert!(!client.has_session());
    assert!(client.store().access_token().is_none());
    assert!(client.store().user_role().is_none());
}

#[tokio::test]
async fn test_login_with_numeric_uid() {
    let backend = MockBackend::start().await;
    backend.state.numeric_uid.store(true, Ordering::SeqCst);
    let client = build_client(&backend, Arc::new(RecordingNavigator::default()));

    let outcome = client.login(&credentials()).await.unwrap();

    assert_eq!(outcome.uid, NUMERIC_UID);
    assert!(client.has_session());
}

#[tokio::test]
async fn test_login_rejected() {
    let backend = MockBackend::start().await;
    let client = build_client(&backend, Arc::new(RecordingNavigator::default()));

    let err = client
        .login(&Credentials {
            email: EMAIL.to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(!client.has_session());
}

#[tokio::test]
async fn test_logout_clears_local_state_when_backend_fails() {
    let backend = MockBackend::start().await;
    let (client, _) = logged_in_client(&backend).await;
    backend.state.fail_logout.store(true, Ordering::SeqCst);

    client.logout().await;

    assert_eq!(backend.logout_calls(), 1);
    assert!(!client.has_session());
    assert!(client.store().access_token().is_none());
}

#[tokio::test]
async fn test_locale_sent_and_used_for_redirect() {
    let backend = MockBackend::start().await;
    let (client, navigator) = logged_in_client(&backend).await;
    client.set_locale(&Locale::parse("tr").unwrap()).unwrap();

    client.get_json::<Value>("profile").await.unwrap();
    assert_eq!(backend.state.last_language().as_deref(), Some("tr"));

    backend.state.revoke_access_tokens();
    backend.state.reject_refresh.store(true, Ordering::SeqCst);
    assert!(client.get_json::<Value>("profile").await.is_err());
    assert_eq!(navigator.redirects(), vec!["/tr/login".to_string()]);
}

#[tokio::test]
async fn test_download_keeps_file_metadata() {
    let backend = MockBackend::start().await;
    let (client, _) = logged_in_client(&backend).await;

    let download = client.download("reports/7/download").await.unwrap();

    assert_eq!(download.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(download.file_name.as_deref(), Some("report-7.pdf"));
    assert_eq!(&download.bytes[..], b"%PDF-1.4 report 7");
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let backend = MockBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let store = Arc::new(FileStore::open(&path).unwrap());
    let session_backend = Arc::new(HttpBackend::new(backend.base.clone()));
    let client = BrowserClient::builder(backend.base.clone(), session_backend)
        .store(store)
        .build()
        .unwrap();
    client.login(&credentials()).await.unwrap();
    let token = client.store().access_token().unwrap();

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.access_token(), Some(token));
    assert_eq!(reopened.user_role().as_deref(), Some(ROLE));
}
