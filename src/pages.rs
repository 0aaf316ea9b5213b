//! Locale-prefixed page routes rendered from backend data.
//!
//! Every route runs behind [`edge_filter`], so an expired access token has
//! already been rotated before a handler starts. Handlers fetch through the
//! server-render client and fall back to one refresh-and-retry on a 401.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, header},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::ApiError;
use crate::auth::{CookiePolicy, EdgeState, RequestCookies, SessionBackend, edge_filter};
use crate::client::{ApiRequest, ApiResponse, ClientError, ServerClientFactory};
use crate::locale::{Locale, LocaleSet};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct PagesState {
    pub backend: Arc<dyn SessionBackend>,
    pub clients: ServerClientFactory,
    pub policy: CookiePolicy,
    pub locales: Arc<LocaleSet>,
}

pub fn router(state: PagesState) -> Router {
    let edge = EdgeState {
        backend: state.backend.clone(),
        policy: state.policy,
        locales: state.locales.clone(),
    };

    Router::new()
        .route("/{locale}/login", get(login_page))
        .route("/{locale}/personnel", get(personnel_page))
        .route("/{locale}/profile", get(profile_page))
        .route("/{locale}/institution", get(institution_page))
        .route("/{locale}/reports/{report_id}", get(report_download))
        .with_state(state)
        .layer(middleware::from_fn_with_state(edge, edge_filter))
}

#[derive(Serialize)]
struct LoginPage {
    page: &'static str,
    locale: Locale,
}

#[derive(Serialize)]
struct DataPage {
    page: &'static str,
    locale: Locale,
    data: Value,
}

/// Personnel directory query, as sent by the browser.
#[derive(Debug, Default, Deserialize)]
pub struct PersonnelQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub search: Option<String>,
    pub department: Option<String>,
}

impl PersonnelQuery {
    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn size(&self) -> u32 {
        self.size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn department(&self) -> Option<&str> {
        self.department
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn to_request(&self) -> ApiRequest {
        ApiRequest::get("personnel")
            .query("page", self.page())
            .query("size", self.size())
            .query_opt("search", self.search())
            .query_opt("department", self.department())
    }
}

/// One page of the personnel directory as returned by the backend.
#[derive(Debug, Deserialize)]
struct PersonnelListing {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    total: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonnelPage {
    locale: Locale,
    items: Vec<Value>,
    page: u32,
    size: u32,
    total: u64,
    total_pages: u64,
}

pub fn total_pages(total: u64, size: u32) -> u64 {
    total.div_ceil(u64::from(size.max(1)))
}

fn resolve_locale(state: &PagesState, tag: &str) -> Result<Locale, ApiError> {
    state
        .locales
        .resolve(tag)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Unsupported locale: {}", tag)))
}

/// Fetch `request` for a page, refreshing once on 401.
///
/// On failure the returned response is final: a redirect to login when the
/// session has ended, or the backend error passed through. Cookie changes
/// are carried either way.
async fn fetch(
    state: &PagesState,
    locale: &Locale,
    headers: &HeaderMap,
    request: ApiRequest,
) -> Result<(ApiResponse, RequestCookies), Response> {
    let mut cookies = RequestCookies::from_headers(headers, state.policy);

    match state
        .clients
        .send_with_refresh(state.backend.as_ref(), &request, &mut cookies, locale)
        .await
    {
        Ok(response) => Ok((response, cookies)),
        Err(ClientError::Session(e)) => {
            info!(error = %e, path = request.path(), "Session ended during render");
            let mut response = Redirect::to(&locale.login_path()).into_response();
            cookies.apply(&mut response);
            Err(response)
        }
        Err(e) => {
            debug!(error = %e, path = request.path(), "Backend request failed during render");
            let mut response = ApiError::from(e).into_response();
            cookies.apply(&mut response);
            Err(response)
        }
    }
}

fn with_cookies(mut response: Response, cookies: &RequestCookies) -> Response {
    cookies.apply(&mut response);
    response
}

async fn login_page(
    State(state): State<PagesState>,
    Path(tag): Path<String>,
) -> Result<Json<LoginPage>, ApiError> {
    let locale = resolve_locale(&state, &tag)?;
    Ok(Json(LoginPage {
        page: "login",
        locale,
    }))
}

async fn personnel_page(
    State(state): State<PagesState>,
    Path(tag): Path<String>,
    Query(query): Query<PersonnelQuery>,
    headers: HeaderMap,
) -> Response {
    let locale = match resolve_locale(&state, &tag) {
        Ok(locale) => locale,
        Err(e) => return e.into_response(),
    };

    let (response, cookies) = match fetch(&state, &locale, &headers, query.to_request()).await {
        Ok(fetched) => fetched,
        Err(response) => return response,
    };

    let listing: PersonnelListing = match response.json() {
        Ok(listing) => listing,
        Err(e) => return with_cookies(ApiError::from(e).into_response(), &cookies),
    };

    let size = query.size();
    let body = PersonnelPage {
        locale,
        items: listing.items,
        page: query.page(),
        size,
        total: listing.total,
        total_pages: total_pages(listing.total, size),
    };
    with_cookies(Json(body).into_response(), &cookies)
}

async fn render_data_page(
    state: PagesState,
    tag: String,
    headers: HeaderMap,
    page: &'static str,
    backend_path: &'static str,
) -> Response {
    let locale = match resolve_locale(&state, &tag) {
        Ok(locale) => locale,
        Err(e) => return e.into_response(),
    };

    let (response, cookies) =
        match fetch(&state, &locale, &headers, ApiRequest::get(backend_path)).await {
            Ok(fetched) => fetched,
            Err(response) => return response,
        };

    match response.json::<Value>() {
        Ok(data) => with_cookies(Json(DataPage { page, locale, data }).into_response(), &cookies),
        Err(e) => with_cookies(ApiError::from(e).into_response(), &cookies),
    }
}

async fn profile_page(
    State(state): State<PagesState>,
    Path(tag): Path<String>,
    headers: HeaderMap,
) -> Response {
    render_data_page(state, tag, headers, "profile", "profile").await
}

async fn institution_page(
    State(state): State<PagesState>,
    Path(tag): Path<String>,
    headers: HeaderMap,
) -> Response {
    render_data_page(state, tag, headers, "institution", "institution").await
}

async fn report_download(
    State(state): State<PagesState>,
    Path((tag, report_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let locale = match resolve_locale(&state, &tag) {
        Ok(locale) => locale,
        Err(e) => return e.into_response(),
    };
    let valid_id = report_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if report_id.is_empty() || !valid_id {
        return ApiError::bad_request("Invalid report id").into_response();
    }

    let request = ApiRequest::get(format!("reports/{}/download", report_id));
    let (response, cookies) = match fetch(&state, &locale, &headers, request).await {
        Ok(fetched) => fetched,
        Err(response) => return response,
    };

    let content_type = response
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let disposition = response.content_disposition().map(str::to_string);

    let mut out = response.body.into_response();
    let out_headers = out.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        out_headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = disposition.and_then(|d| HeaderValue::from_str(&d).ok()) {
        out_headers.insert(header::CONTENT_DISPOSITION, value);
    }
    with_cookies(out, &cookies)
}
