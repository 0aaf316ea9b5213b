//! Session token lifecycle on the server side.
//!
//! Access tokens are short-lived bearer credentials, readable by the client.
//! Refresh tokens are long-lived and live only in HTTP-only cookies. Both are
//! issued and verified by the backend; this module only moves them around,
//! decodes expiry, and rotates them through the backend refresh endpoint.

mod backend;
mod cookie;
mod edge;
mod errors;
mod ip;
mod rotation;

pub use backend::{
    BackendError, Credentials, HttpBackend, LOGIN_PATH, LOGOUT_PATH, LoginResponse, REFRESH_PATH,
    SessionBackend, normalize_base,
};
pub(crate) use backend::error_message;
pub use cookie::{
    ACCESS_COOKIE_NAME, CookiePolicy, DEFAULT_ACCESS_MAX_AGE_SECS, DEFAULT_REFRESH_MAX_AGE_SECS,
    REFRESH_COOKIE_NAME, RequestCookies, find_cookie, get_cookie,
};
pub use edge::{EdgeDecision, EdgeState, LogoutReason, edge_filter, evaluate};
pub use errors::SessionError;
pub use ip::extract_client_ip;
pub use rotation::{SessionCookies, rotate_session};
