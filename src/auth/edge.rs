//! Edge request filter: pre-emptive session refresh before page rendering.
//!
//! The access token's `exp` claim is decoded without signature verification.
//! That is enough to decide *when to refresh*; it is never an authorization
//! decision. The backend verifies the token on every API call.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info};

use super::backend::SessionBackend;
use super::cookie::{CookiePolicy, RequestCookies};
use super::rotation::{SessionCookies, rotate_session};
use crate::locale::LocaleSet;
use crate::token::{decode_claims, unix_now};

/// State for [`edge_filter`].
#[derive(Clone)]
pub struct EdgeState {
    pub backend: Arc<dyn SessionBackend>,
    pub policy: CookiePolicy,
    pub locales: Arc<LocaleSet>,
}

/// Why a request was forced back to the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    MalformedToken,
    MissingRefreshToken,
    RefreshRejected,
}

/// Outcome of evaluating one request's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDecision {
    /// No access token: pass through untouched.
    Anonymous,
    /// Access token not yet expired: pass through untouched.
    Valid,
    /// Access token expired and the session was rotated.
    Refreshed,
    /// Delete credentials and redirect to login.
    ForceLogout(LogoutReason),
}

/// Decide what to do with a request, mutating `cookies` for any rotation or
/// deletion. Makes at most one backend call.
pub async fn evaluate(
    backend: &dyn SessionBackend,
    cookies: &mut RequestCookies,
    now: u64,
) -> EdgeDecision {
    let Some(access_token) = cookies.access_token() else {
        return EdgeDecision::Anonymous;
    };

    let claims = match decode_claims(access_token.as_str()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Undecodable access token");
            cookies.clear_access();
            cookies.clear_refresh();
            return EdgeDecision::ForceLogout(LogoutReason::MalformedToken);
        }
    };

    if !claims.is_expired_at(now) {
        return EdgeDecision::Valid;
    }

    debug!(sub = %claims.sub, exp = claims.exp, "Access token expired");
    match rotate_session(backend, cookies).await {
        Ok(_) => EdgeDecision::Refreshed,
        Err(e) if e.reached_backend() => EdgeDecision::ForceLogout(LogoutReason::RefreshRejected),
        Err(_) => EdgeDecision::ForceLogout(LogoutReason::MissingRefreshToken),
    }
}

/// Middleware run in front of every page route.
pub async fn edge_filter(
    State(state): State<EdgeState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut cookies = RequestCookies::from_headers(request.headers(), state.policy);

    match evaluate(state.backend.as_ref(), &mut cookies, unix_now()).await {
        EdgeDecision::Anonymous | EdgeDecision::Valid => next.run(request).await,
        EdgeDecision::Refreshed => {
            // Rendering must see the rotated credentials, not the expired ones.
            cookies.rewrite_request_headers(request.headers_mut());
            let mut response = next.run(request).await;
            cookies.apply_beneath(&mut response);
            response
        }
        EdgeDecision::ForceLogout(reason) => {
            let login_path = state.locales.from_path(request.uri().path()).login_path();
            info!(?reason, path = %request.uri().path(), "Forcing logout");
            let mut response = Redirect::temporary(&login_path).into_response();
            cookies.apply(&mut response);
            response
        }
    }
}
