mod error;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::auth::{CookiePolicy, SessionBackend};
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;
pub use session::SessionState;

/// Create the API router.
pub fn create_api_router(
    backend: Arc<dyn SessionBackend>,
    policy: CookiePolicy,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let session_state = SessionState { backend, policy };

    Router::new().nest("/auth", session::router(session_state, rate_limit))
}
