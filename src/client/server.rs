//! Per-request API clients for server-side rendering.
//!
//! A [`ServerClient`] is bound to one incoming request's cookies and locale.
//! It never refreshes on its own: a 401 comes back to the page, which may
//! call [`ServerClientFactory::refresh_and_retry`] once.

use tracing::debug;
use url::Url;

use super::request::{ApiRequest, ApiResponse, ClientError, execute};
use crate::auth::{RequestCookies, SessionBackend, normalize_base, rotate_session};
use crate::locale::Locale;
use crate::token::AccessToken;

/// Builds [`ServerClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct ServerClientFactory {
    http: reqwest::Client,
    base: Url,
}

impl ServerClientFactory {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self {
            http,
            base: normalize_base(base),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// A client carrying the request's current access token and `locale`.
    pub fn for_request(&self, cookies: &RequestCookies, locale: &Locale) -> ServerClient {
        ServerClient {
            http: self.http.clone(),
            base: self.base.clone(),
            access_token: cookies.access_token(),
            locale: locale.clone(),
        }
    }

    /// Rotate the session through the backend, then retry `request` exactly
    /// once with a client bound to the rotated cookies. Cookie changes are
    /// left in `cookies` for the caller to apply to its response.
    pub async fn refresh_and_retry(
        &self,
        backend: &dyn SessionBackend,
        request: &ApiRequest,
        cookies: &mut RequestCookies,
        locale: &Locale,
    ) -> Result<ApiResponse, ClientError> {
        rotate_session(backend, cookies).await?;
        debug!(path = request.path(), "Retrying after session refresh");

        let retry = request.clone().into_retry();
        self.for_request(cookies, locale).send(&retry).await
    }

    /// Send `request`; on 401, refresh and retry once.
    pub async fn send_with_refresh(
        &self,
        backend: &dyn SessionBackend,
        request: &ApiRequest,
        cookies: &mut RequestCookies,
        locale: &Locale,
    ) -> Result<ApiResponse, ClientError> {
        match self.for_request(cookies, locale).send(request).await {
            Err(e) if e.is_unauthorized() && !request.is_retry() => {
                self.refresh_and_retry(backend, request, cookies, locale)
                    .await
            }
            other => other,
        }
    }
}

/// API client bound to one render request.
#[derive(Clone)]
pub struct ServerClient {
    http: reqwest::Client,
    base: Url,
    access_token: Option<AccessToken>,
    locale: Locale,
}

impl ServerClient {
    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Send without any retry; a 401 is returned as-is.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        execute(
            &self.http,
            &self.base,
            request,
            self.access_token.as_ref(),
            self.locale.as_str(),
        )
        .await
    }
}
