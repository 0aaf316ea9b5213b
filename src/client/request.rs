//! Request and response types shared by the browser and server-render clients.

use axum::body::Bytes;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::store::StoreError;
use crate::auth::{BackendError, SessionError, error_message};
use crate::token::AccessToken;

/// An API call relative to the backend base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter only when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL, without a leading slash.
    pub fn path(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    /// Whether this request is already a retry after a session refresh.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// The same request, marked as a retry.
    pub fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }

    fn url(&self, base: &Url) -> Result<Url, ClientError> {
        base.join(self.path())
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.path, e)))
    }
}

/// A successful API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.headers.get(CONTENT_DISPOSITION)?.to_str().ok()
    }

    /// File name from `Content-Disposition: attachment; filename="..."`.
    pub fn file_name(&self) -> Option<String> {
        self.content_disposition()?
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("filename="))
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    }
}

/// Errors from an API call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The backend answered with a non-success status.
    #[error("request failed with status {status}")]
    Status { status: u16, message: Option<String> },
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("client store error: {0}")]
    Store(String),
    /// A 401 could not be recovered because the session has ended.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<BackendError> for ClientError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Rejected { status, message } => Self::Status { status, message },
            BackendError::Transport(e) => Self::Transport(e),
            BackendError::Decode(e) => Self::Decode(e),
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Session(e) => Some(e.status_code().as_u16()),
            _ => None,
        }
    }

    /// A plain 401 from the backend, eligible for refresh-and-retry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::UNAUTHORIZED.as_u16())
    }
}

/// Send `request` with the bearer and locale headers, mapping non-success
/// statuses to [`ClientError::Status`].
pub(crate) async fn execute(
    http: &reqwest::Client,
    base: &Url,
    request: &ApiRequest,
    bearer: Option<&AccessToken>,
    locale: &str,
) -> Result<ApiResponse, ClientError> {
    let mut builder = http
        .request(request.method.clone(), request.url(base)?)
        .header(ACCEPT_LANGUAGE, locale);

    if let Some(token) = bearer {
        builder = builder.bearer_auth(token.as_str());
    }
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = error_message(response).await;
        tracing::debug!(
            method = %request.method,
            path = request.path(),
            status = status.as_u16(),
            "API request failed"
        );
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}
