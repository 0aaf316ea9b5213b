//! Session endpoints.
//!
//! - POST `/login` - Exchange credentials for a session, set both cookies
//! - POST `/refresh` - Rotate the session from the refresh cookie
//! - POST `/logout` - Invalidate the refresh token and clear cookies

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::{info, warn};

use super::error::ApiError;
use crate::auth::{BackendError, CookiePolicy, Credentials, RequestCookies, SessionBackend, rotate_session};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};
use crate::token::AccessToken;

#[derive(Clone)]
pub struct SessionState {
    pub backend: Arc<dyn SessionBackend>,
    pub policy: CookiePolicy,
}

pub fn router(state: SessionState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let login_route = Router::new()
        .route("/login", post(login))
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_login))
        .with_state(state.clone());

    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state)
        .merge(login_route)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    access_token: AccessToken,
    token_type: String,
    uid: serde_json::Value,
    user_role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    access_token: AccessToken,
}

async fn login(
    State(state): State<SessionState>,
    headers: HeaderMap,
    Json(credentials): Json<Credentials>,
) -> Result<Response, ApiError> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let login = match state.backend.login(&credentials).await {
        Ok(login) => login,
        Err(BackendError::Rejected { status, message }) if (400..500).contains(&status) => {
            info!(status, "Login rejected");
            return Err(ApiError::unauthorized(
                message.unwrap_or_else(|| "Invalid email or password".into()),
            ));
        }
        Err(e) => return Err(ApiError::upstream_error("Login failed", e)),
    };

    let mut cookies = RequestCookies::from_headers(&headers, state.policy);
    cookies.set_pair(&login.pair());

    info!(uid = %login.uid, role = %login.user_role, "User logged in");
    let mut response = Json(LoginBody {
        access_token: login.access_token,
        token_type: login.token_type,
        uid: login.uid,
        user_role: login.user_role,
    })
    .into_response();
    cookies.apply(&mut response);
    Ok(response)
}

async fn refresh(State(state): State<SessionState>, headers: HeaderMap) -> Response {
    let mut cookies = RequestCookies::from_headers(&headers, state.policy);

    let mut response = match rotate_session(state.backend.as_ref(), &mut cookies).await {
        Ok(pair) => Json(RefreshBody {
            access_token: pair.access_token,
        })
        .into_response(),
        Err(e) => ApiError::unauthorized(e.to_string()).into_response(),
    };
    cookies.apply(&mut response);
    response
}

async fn logout(State(state): State<SessionState>, headers: HeaderMap) -> Response {
    let mut cookies = RequestCookies::from_headers(&headers, state.policy);

    if let Some(refresh_token) = cookies.refresh_token() {
        if let Err(e) = state.backend.logout(&refresh_token).await {
            warn!(error = %e, "Backend logout failed, clearing session cookies anyway");
        }
    }

    cookies.delete_access();
    cookies.delete_refresh();

    let mut response = StatusCode::NO_CONTENT.into_response();
    cookies.apply(&mut response);
    response
}
