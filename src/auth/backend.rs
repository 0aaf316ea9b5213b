//! Backend authentication endpoints: login, refresh, logout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::token::{AccessToken, RefreshToken, TokenPair};

/// Backend login path, relative to the API base URL.
pub const LOGIN_PATH: &str = "auth/login";

/// Backend refresh path, relative to the API base URL.
pub const REFRESH_PATH: &str = "auth/refresh";

/// Backend logout path, relative to the API base URL.
pub const LOGOUT_PATH: &str = "auth/logout";

/// Login form submitted by the user.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Successful login response from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub token_type: String,
    /// User id, string or number, exactly as the backend sent it.
    pub uid: serde_json::Value,
    pub user_role: String,
}

impl LoginResponse {
    pub fn pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Errors from calling a backend endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The backend answered with a non-success status.
    #[error("backend rejected request with status {status}")]
    Rejected { status: u16, message: Option<String> },
    /// The request never produced a response.
    #[error("backend unreachable: {0}")]
    Transport(String),
    /// The response body did not have the expected shape.
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The backend's session endpoints. Implemented over HTTP by [`HttpBackend`];
/// tests substitute their own.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Exchange credentials for a new session.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, BackendError>;

    /// Exchange a refresh token for a rotated pair.
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenPair, BackendError>;

    /// Invalidate a refresh token.
    async fn logout(&self, refresh_token: &RefreshToken) -> Result<(), BackendError>;
}

/// [`SessionBackend`] over the remote HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(http: reqwest::Client, base: Url) -> Self {
        Self {
            http,
            base: normalize_base(base),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, BackendError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        tracing::debug!(path, status = status.as_u16(), "Backend rejected request");
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, BackendError> {
        self.post(LOGIN_PATH, credentials)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenPair, BackendError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.as_str(),
        };
        self.post(REFRESH_PATH, &body)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn logout(&self, refresh_token: &RefreshToken) -> Result<(), BackendError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.as_str(),
        };
        self.post(LOGOUT_PATH, &body).await.map(|_| ())
    }
}

/// Ensure the base URL ends with `/` so relative joins append to its path.
pub fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// Best-effort `{"message": ..}` or `{"error": ..}` from an error body.
pub(crate) async fn error_message(response: reqwest::Response) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    let body: ErrorBody = response.json().await.ok()?;
    body.message.or(body.error)
}
