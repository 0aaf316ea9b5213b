//! Session rotation shared by every call site.
//!
//! The edge filter, the server-render refresh helper, and the client's
//! refresh coordinator all rotate a session the same way: read the refresh
//! token, call the backend once, then either store the new pair or drop both
//! credentials. They differ only in where credentials live, which is what
//! [`SessionCookies`] abstracts.

use tracing::{info, warn};

use super::backend::SessionBackend;
use super::cookie::RequestCookies;
use super::errors::SessionError;
use crate::token::{RefreshToken, TokenPair};

/// Read/write access to the credentials of one session.
pub trait SessionCookies {
    fn refresh_token(&self) -> Option<RefreshToken>;

    /// Store a freshly rotated pair.
    fn store_pair(&mut self, pair: &TokenPair);

    fn clear_access(&mut self);

    fn clear_refresh(&mut self);
}

impl SessionCookies for RequestCookies {
    fn refresh_token(&self) -> Option<RefreshToken> {
        RequestCookies::refresh_token(self)
    }

    fn store_pair(&mut self, pair: &TokenPair) {
        self.set_pair(pair);
    }

    fn clear_access(&mut self) {
        self.delete_access();
    }

    fn clear_refresh(&mut self) {
        self.delete_refresh();
    }
}

/// Rotate the session once.
///
/// - No refresh token: the stale access token is dropped and no network call
///   is made.
/// - Backend failure (rejection or transport): both credentials are dropped.
///   Not retried.
/// - Success: both new credentials are stored and returned.
pub async fn rotate_session<C>(
    backend: &dyn SessionBackend,
    cookies: &mut C,
) -> Result<TokenPair, SessionError>
where
    C: SessionCookies + ?Sized,
{
    let Some(refresh_token) = cookies.refresh_token() else {
        cookies.clear_access();
        return Err(SessionError::AuthenticationRequired);
    };

    match backend.refresh(&refresh_token).await {
        Ok(pair) => {
            cookies.store_pair(&pair);
            info!("Session rotated");
            Ok(pair)
        }
        Err(e) => {
            warn!(error = %e, "Session refresh failed, ending session");
            cookies.clear_access();
            cookies.clear_refresh();
            Err(SessionError::RefreshFailed(e))
        }
    }
}
