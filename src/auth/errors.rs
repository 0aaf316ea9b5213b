//! Session error types.

use axum::http::StatusCode;

use super::backend::BackendError;

/// Why a session could not be continued.
///
/// Every variant means the same thing to callers: the session has ended and
/// the user must log in again. The distinction is kept for logging.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// No refresh token is available, so no refresh was attempted.
    #[error("authentication required")]
    AuthenticationRequired,
    /// The backend refused to rotate the session, or could not be reached.
    #[error("session refresh failed: {0}")]
    RefreshFailed(#[source] BackendError),
}

impl SessionError {
    /// Status to report when the error ends an API call.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    /// Whether a network call to the backend was made before failing.
    pub fn reached_backend(&self) -> bool {
        matches!(self, Self::RefreshFailed(_))
    }
}
