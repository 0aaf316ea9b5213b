#![allow(dead_code)]

//! In-process mock of the backend API plus helpers for driving the portal.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use directory_portal::{
    PortalConfig, create_app,
    locale::{Locale, LocaleSet},
    token::unix_now,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

pub const EMAIL: &str = "ada@example.edu";
pub const PASSWORD: &str = "correct-password";
pub const UID: &str = "42";
pub const NUMERIC_UID: u64 = 17;
pub const ROLE: &str = "ADMIN";
pub const PERSONNEL_TOTAL: u64 = 45;

// ============================================================================
// Token minting
// ============================================================================

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: u64,
    iat: u64,
    role: String,
    jti: u64,
}

/// Mint a signed JWT expiring at `exp`. Every call yields a distinct token.
pub fn mint_token(exp: u64) -> String {
    let claims = Claims {
        sub: UID.to_string(),
        exp,
        iat: unix_now(),
        role: ROLE.to_string(),
        jti: TOKEN_SEQ.fetch_add(1, Ordering::SeqCst),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"mock-backend-secret"),
    )
    .expect("Failed to mint token")
}

pub fn fresh_access_token() -> String {
    mint_token(unix_now() + 3600)
}

pub fn expired_access_token() -> String {
    mint_token(unix_now() - 60)
}

pub fn new_refresh_token() -> String {
    format!("refresh-{}", TOKEN_SEQ.fetch_add(1, Ordering::SeqCst))
}

// ============================================================================
// Mock backend
// ============================================================================

#[derive(Default)]
pub struct MockState {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub api_calls: AtomicUsize,
    pub reject_refresh: AtomicBool,
    pub fail_logout: AtomicBool,
    /// Send `uid` as a JSON number instead of a string.
    pub numeric_uid: AtomicBool,
    refresh_delay_ms: AtomicU64,
    valid_access: Mutex<HashSet<String>>,
    valid_refresh: Mutex<HashSet<String>>,
    authorized_tokens: Mutex<Vec<String>>,
    last_query: Mutex<Option<HashMap<String, String>>>,
    last_language: Mutex<Option<String>>,
}

impl MockState {
    /// Issue a registered `(access, refresh)` pair.
    pub fn issue_pair(&self) -> (String, String) {
        let access = fresh_access_token();
        let refresh = new_refresh_token();
        self.valid_access.lock().unwrap().insert(access.clone());
        self.valid_refresh.lock().unwrap().insert(refresh.clone());
        (access, refresh)
    }

    /// Register a refresh token without an access token.
    pub fn register_refresh(&self) -> String {
        let refresh = new_refresh_token();
        self.valid_refresh.lock().unwrap().insert(refresh.clone());
        refresh
    }

    /// Make every access token issued so far fail with 401.
    pub fn revoke_access_tokens(&self) {
        self.valid_access.lock().unwrap().clear();
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Bearer tokens of every authorized API call, in arrival order.
    pub fn authorized_tokens(&self) -> Vec<String> {
        self.authorized_tokens.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<HashMap<String, String>> {
        self.last_query.lock().unwrap().clone()
    }

    pub fn last_language(&self) -> Option<String> {
        self.last_language.lock().unwrap().clone()
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        self.api_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_language.lock().unwrap() = headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);

        match token {
            Some(token) if self.valid_access.lock().unwrap().contains(&token) => {
                self.authorized_tokens.lock().unwrap().push(token);
                Ok(())
            }
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Token expired" })),
            )
                .into_response()),
        }
    }
}

pub struct MockBackend {
    pub state: Arc<MockState>,
    /// API base URL, e.g. `http://127.0.0.1:PORT/api/`
    pub base: Url,
    pub addr: SocketAddr,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/auth/login", post(mock_login))
            .route("/api/auth/refresh", post(mock_refresh))
            .route("/api/auth/logout", post(mock_logout))
            .route("/api/personnel", get(mock_personnel))
            .route("/api/profile", get(mock_profile))
            .route("/api/institution", get(mock_institution))
            .route("/api/reports/{id}/download", get(mock_report))
            .route("/api/locked", get(mock_locked))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to get local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let base = Url::parse(&format!("http://{}/api/", addr)).expect("Invalid URL");
        Self { state, base, addr }
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.state.logout_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.state.login_calls.load(Ordering::SeqCst)
    }
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: String,
}

async fn mock_login(State(state): State<Arc<MockState>>, Json(body): Json<LoginBody>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if body.email != EMAIL || body.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid credentials" })),
        )
            .into_response();
    }

    let (access, refresh) = state.issue_pair();
    let uid = if state.numeric_uid.load(Ordering::SeqCst) {
        json!(NUMERIC_UID)
    } else {
        json!(UID)
    };
    Json(json!({
        "accessToken": access,
        "refreshToken": refresh,
        "tokenType": "Bearer",
        "uid": uid,
        "userRole": ROLE,
    }))
    .into_response()
}

async fn mock_refresh(
    State(state): State<Arc<MockState>>,
    Json(body): Json<RefreshBody>,
) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let known = state
        .valid_refresh
        .lock()
        .unwrap()
        .remove(&body.refresh_token);
    if !known || state.reject_refresh.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid refresh token" })),
        )
            .into_response();
    }

    let (access, refresh) = state.issue_pair();
    Json(json!({ "accessToken": access, "refreshToken": refresh })).into_response()
}

async fn mock_logout(
    State(state): State<Arc<MockState>>,
    Json(body): Json<RefreshBody>,
) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_logout.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state
        .valid_refresh
        .lock()
        .unwrap()
        .remove(&body.refresh_token);
    StatusCode::NO_CONTENT
}

async fn mock_personnel(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = state.authorize(&headers) {
        return response;
    }
    *state.last_query.lock().unwrap() = Some(query.clone());

    if query.get("department").map(String::as_str) == Some("restricted") {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Department is restricted" })),
        )
            .into_response();
    }

    Json(json!({
        "items": [
            { "id": 1, "name": "Ada Lovelace", "department": "mathematics" },
            { "id": 2, "name": "Grace Hopper", "department": "computing" },
        ],
        "total": PERSONNEL_TOTAL,
    }))
    .into_response()
}

async fn mock_profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(response) = state.authorize(&headers) {
        return response;
    }
    Json(json!({ "uid": UID, "name": "Ada Lovelace", "role": ROLE })).into_response()
}

async fn mock_institution(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(response) = state.authorize(&headers) {
        return response;
    }
    Json(json!({ "name": "Example University", "city": "Ankara" })).into_response()
}

async fn mock_report(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = state.authorize(&headers) {
        return response;
    }
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"report-{}.pdf\"", id),
            ),
        ],
        format!("%PDF-1.4 report {}", id),
    )
        .into_response()
}

/// Rejects every caller, even with a valid token.
async fn mock_locked(State(state): State<Arc<MockState>>) -> Response {
    state.api_calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Locked" })),
    )
        .into_response()
}

// ============================================================================
// Portal helpers
// ============================================================================

pub fn test_locales() -> LocaleSet {
    LocaleSet::new(
        vec![Locale::parse("en").unwrap(), Locale::parse("tr").unwrap()],
        Locale::parse("en").unwrap(),
    )
}

pub fn portal_config(backend: &MockBackend, production: bool) -> PortalConfig {
    PortalConfig {
        backend_url: backend.base.clone(),
        production,
        locales: test_locales(),
        access_max_age: 3600,
        refresh_max_age: 604800,
        trust_proxy: false,
    }
}

/// Create a portal app talking to `backend`.
pub fn create_test_app(backend: &MockBackend) -> Router {
    create_app(&portal_config(backend, false))
}

/// Client address as the real server would attach it.
pub fn client_addr() -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
}

pub fn session_cookies(access: &str, refresh: &str) -> String {
    format!("accessToken={}; refreshToken={}", access, refresh)
}

/// Extract all Set-Cookie headers from a response.
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The Set-Cookie header that sets `name` to a non-empty value.
pub fn find_set_cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find(|c| c.starts_with(&prefix) && !c.starts_with(&format!("{};", prefix)))
}

/// Value set for cookie `name`, if any.
pub fn set_cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let cookie = find_set_cookie(cookies, name)?;
    let value = cookie.split(';').next()?.split_once('=')?.1;
    Some(value.to_string())
}

/// Check if a cookie with the given name is cleared (empty value, Max-Age=0).
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", name)) && c.contains("Max-Age=0"))
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response.headers().get(header::LOCATION)?.to_str().ok()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
