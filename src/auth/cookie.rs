//! Session cookie parsing, formatting, and a per-request cookie accessor.
//!
//! One policy for every call site: `accessToken` is readable by script so it
//! can be mirrored into the client's persistent store, `refreshToken` is
//! always HTTP-only. Both get `Secure` in production.

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::Response;

use crate::token::{AccessToken, RefreshToken, TokenPair};

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Default access cookie lifetime: 1 hour
pub const DEFAULT_ACCESS_MAX_AGE_SECS: u64 = 60 * 60;

/// Default refresh cookie lifetime: 7 days
pub const DEFAULT_REFRESH_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie_header| find_cookie(cookie_header, name))
}

/// Find a cookie value in a `name=value; name2=value2` string.
pub fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// How session cookies are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    /// Set the Secure flag (production)
    pub secure: bool,
    /// Max-Age of the access token cookie, in seconds
    pub access_max_age: u64,
    /// Max-Age of the refresh token cookie, in seconds
    pub refresh_max_age: u64,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            secure: false,
            access_max_age: DEFAULT_ACCESS_MAX_AGE_SECS,
            refresh_max_age: DEFAULT_REFRESH_MAX_AGE_SECS,
        }
    }
}

impl CookiePolicy {
    pub fn production(secure: bool) -> Self {
        Self {
            secure,
            ..Self::default()
        }
    }

    fn format(&self, name: &str, value: &str, http_only: bool, max_age: u64) -> String {
        let http_only = if http_only { "; HttpOnly" } else { "" };
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}{}; SameSite=Lax; Path=/; Max-Age={}{}",
            name, value, http_only, max_age, secure
        )
    }

    /// `Set-Cookie` value for a new access token.
    pub fn access_cookie(&self, token: &AccessToken) -> String {
        self.format(
            ACCESS_COOKIE_NAME,
            token.as_str(),
            false,
            self.access_max_age,
        )
    }

    /// `Set-Cookie` value for a new refresh token.
    pub fn refresh_cookie(&self, token: &RefreshToken) -> String {
        self.format(
            REFRESH_COOKIE_NAME,
            token.as_str(),
            true,
            self.refresh_max_age,
        )
    }

    /// `Set-Cookie` value deleting the access token.
    pub fn clear_access_cookie(&self) -> String {
        self.format(ACCESS_COOKIE_NAME, "", false, 0)
    }

    /// `Set-Cookie` value deleting the refresh token.
    pub fn clear_refresh_cookie(&self) -> String {
        self.format(REFRESH_COOKIE_NAME, "", true, 0)
    }
}

/// Cookie state of one in-flight request: what the client sent, overlaid
/// with whatever this request has decided to set or delete.
///
/// Reads see pending writes, so a client built after a refresh picks up the
/// rotated access token.
#[derive(Debug, Clone)]
pub struct RequestCookies {
    policy: CookiePolicy,
    access: Option<String>,
    refresh: Option<String>,
    set_cookies: Vec<String>,
}

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap, policy: CookiePolicy) -> Self {
        Self {
            policy,
            access: get_cookie(headers, ACCESS_COOKIE_NAME).map(str::to_string),
            refresh: get_cookie(headers, REFRESH_COOKIE_NAME).map(str::to_string),
            set_cookies: Vec::new(),
        }
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.access.clone().map(AccessToken::new)
    }

    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.refresh.clone().map(RefreshToken::new)
    }

    /// Store a rotated pair, queueing both `Set-Cookie` headers.
    pub fn set_pair(&mut self, pair: &TokenPair) {
        self.set_cookies
            .push(self.policy.access_cookie(&pair.access_token));
        self.set_cookies
            .push(self.policy.refresh_cookie(&pair.refresh_token));
        self.access = Some(pair.access_token.as_str().to_string());
        self.refresh = Some(pair.refresh_token.as_str().to_string());
    }

    pub fn delete_access(&mut self) {
        self.set_cookies.push(self.policy.clear_access_cookie());
        self.access = None;
    }

    pub fn delete_refresh(&mut self) {
        self.set_cookies.push(self.policy.clear_refresh_cookie());
        self.refresh = None;
    }

    /// Pending `Set-Cookie` values, in the order they were queued.
    pub fn set_cookies(&self) -> &[String] {
        &self.set_cookies
    }

    pub fn is_modified(&self) -> bool {
        !self.set_cookies.is_empty()
    }

    /// `Cookie` header value reflecting the current state, for forwarding
    /// the request downstream with rotated credentials.
    pub fn request_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(access) = &self.access {
            parts.push(format!("{}={}", ACCESS_COOKIE_NAME, access));
        }
        if let Some(refresh) = &self.refresh {
            parts.push(format!("{}={}", REFRESH_COOKIE_NAME, refresh));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }

    /// Rewrite the session cookies in a request's `Cookie` header, keeping
    /// any unrelated cookies.
    pub fn rewrite_request_headers(&self, headers: &mut HeaderMap) {
        let others: Vec<String> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .filter(|part| {
                let name = part.split_once('=').map_or(*part, |(k, _)| k).trim();
                !part.is_empty() && name != ACCESS_COOKIE_NAME && name != REFRESH_COOKIE_NAME
            })
            .map(str::to_string)
            .collect();

        headers.remove(header::COOKIE);

        let mut combined = others;
        if let Some(session) = self.request_header() {
            combined.push(session);
        }
        if combined.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&combined.join("; ")) {
            headers.insert(header::COOKIE, value);
        }
    }

    /// Append the pending `Set-Cookie` headers to a response.
    pub fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        for cookie in &self.set_cookies {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(header::SET_COOKIE, value);
            }
        }
    }

    /// Like [`apply`](Self::apply), but skips any cookie the response already
    /// sets. A handler that rotated again owns the newer value.
    pub fn apply_beneath(&self, response: &mut Response) {
        let already_set: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(set_cookie_name)
            .map(str::to_string)
            .collect();

        let headers = response.headers_mut();
        for cookie in &self.set_cookies {
            let shadowed = set_cookie_name(cookie)
                .is_some_and(|name| already_set.iter().any(|set| set == name));
            if shadowed {
                continue;
            }
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(header::SET_COOKIE, value);
            }
        }
    }
}

/// Cookie name of a `Set-Cookie` value.
fn set_cookie_name(set_cookie: &str) -> Option<&str> {
    set_cookie
        .split_once('=')
        .map(|(name, _)| name.trim())
        .filter(|name| !name.is_empty())
}
