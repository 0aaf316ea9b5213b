//! Long-lived API client with transparent refresh-and-retry on 401.
//!
//! At most one refresh is in flight per client. The first request to see a
//! 401 installs a shared refresh future in a single slot; every other request
//! that fails while it is pending awaits the same future and retries with the
//! token it yields, or rejects with the same error. The future empties the
//! slot itself when it settles, so it is driven to completion by whichever
//! waiter is still around.

use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::cookie::{CookieStore, Jar};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::request::{ApiRequest, ApiResponse, ClientError, execute};
use super::store::{ACCESS_TOKEN_KEY, CURRENT_LOCALE_KEY, MemoryStore, TokenStore, USER_ROLE_KEY};
use crate::auth::{
    CookiePolicy, Credentials, REFRESH_COOKIE_NAME, REFRESH_PATH, SessionBackend, SessionCookies,
    SessionError, find_cookie, normalize_base, rotate_session,
};
use crate::locale::Locale;
use crate::token::{AccessToken, RefreshToken, TokenPair};

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, SessionError>>>;
type RefreshSlot = Mutex<Option<RefreshFuture>>;

/// Where the client sends the user when the session ends.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Navigator for headless use: records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, path: &str) {
        info!(path, "Session ended, redirecting to login");
    }
}

/// What a successful login exposes to the caller. The refresh token stays
/// in the cookie jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub uid: serde_json::Value,
    pub user_role: String,
    pub token_type: String,
}

/// A downloaded file.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: axum::body::Bytes,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

/// Client credentials: access token in the persistent store, refresh token
/// in the cookie jar.
#[derive(Clone)]
struct ClientSession {
    store: Arc<dyn TokenStore>,
    jar: Arc<Jar>,
    origin: Url,
    policy: CookiePolicy,
}

impl ClientSession {
    fn remember(&self, pair: &TokenPair) {
        if let Err(e) = self.store.set_access_token(&pair.access_token) {
            warn!(error = %e, "Failed to persist access token");
        }
        self.jar
            .add_cookie_str(&self.policy.access_cookie(&pair.access_token), &self.origin);
        self.jar
            .add_cookie_str(&self.policy.refresh_cookie(&pair.refresh_token), &self.origin);
    }

    fn forget(&self) {
        for key in [ACCESS_TOKEN_KEY, USER_ROLE_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to clear stored credential");
            }
        }
        self.jar
            .add_cookie_str(&self.policy.clear_access_cookie(), &self.origin);
        self.jar
            .add_cookie_str(&self.policy.clear_refresh_cookie(), &self.origin);
    }
}

impl SessionCookies for ClientSession {
    fn refresh_token(&self) -> Option<RefreshToken> {
        let header = self.jar.cookies(&self.origin)?;
        let cookies = header.to_str().ok()?;
        find_cookie(cookies, REFRESH_COOKIE_NAME).map(RefreshToken::new)
    }

    fn store_pair(&mut self, pair: &TokenPair) {
        self.remember(pair);
    }

    fn clear_access(&mut self) {
        if let Err(e) = self.store.remove(ACCESS_TOKEN_KEY) {
            warn!(error = %e, "Failed to clear access token");
        }
        self.jar
            .add_cookie_str(&self.policy.clear_access_cookie(), &self.origin);
    }

    fn clear_refresh(&mut self) {
        self.jar
            .add_cookie_str(&self.policy.clear_refresh_cookie(), &self.origin);
    }
}

/// Builder for [`BrowserClient`].
pub struct BrowserClientBuilder {
    base: Url,
    backend: Arc<dyn SessionBackend>,
    store: Option<Arc<dyn TokenStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    default_locale: Option<Locale>,
}

impl BrowserClientBuilder {
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = Some(locale);
        self
    }

    pub fn build(self) -> Result<BrowserClient, ClientError> {
        let base = normalize_base(self.base);
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let default_locale = self.default_locale.unwrap_or_default();

        let session = ClientSession {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            jar,
            origin: base.clone(),
            policy: CookiePolicy::production(base.scheme() == "https"),
        };

        Ok(BrowserClient {
            inner: Arc::new(Inner {
                http,
                base,
                backend: self.backend,
                session,
                navigator: self.navigator.unwrap_or_else(|| Arc::new(LogNavigator)),
                default_locale,
                refresh: Arc::new(Mutex::new(None)),
            }),
        })
    }
}

struct Inner {
    http: reqwest::Client,
    base: Url,
    backend: Arc<dyn SessionBackend>,
    session: ClientSession,
    navigator: Arc<dyn Navigator>,
    default_locale: Locale,
    refresh: Arc<RefreshSlot>,
}

/// API client holding one user's session.
///
/// Cheap to clone; clones share the session and the refresh slot. Separate
/// instances built from separate builders are fully independent.
#[derive(Clone)]
pub struct BrowserClient {
    inner: Arc<Inner>,
}

impl BrowserClient {
    pub fn builder(base: Url, backend: Arc<dyn SessionBackend>) -> BrowserClientBuilder {
        BrowserClientBuilder {
            base,
            backend,
            store: None,
            navigator: None,
            default_locale: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.session.store
    }

    /// Active locale: the stored preference, or the default.
    pub fn locale(&self) -> Locale {
        self.inner
            .session
            .store
            .locale()
            .unwrap_or_else(|| self.inner.default_locale.clone())
    }

    pub fn set_locale(&self, locale: &Locale) -> Result<(), ClientError> {
        self.inner
            .session
            .store
            .set(CURRENT_LOCALE_KEY, locale.as_str())
            .map_err(ClientError::from)
    }

    /// Whether a refresh token is held.
    pub fn has_session(&self) -> bool {
        self.inner.session.refresh_token().is_some()
    }

    /// Log in and keep the new session.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ClientError> {
        let response = self.inner.backend.login(credentials).await?;

        let session = &self.inner.session;
        session.remember(&response.pair());
        if let Err(e) = session.store.set(USER_ROLE_KEY, &response.user_role) {
            warn!(error = %e, "Failed to persist user role");
        }

        info!(uid = %response.uid, "Logged in");
        Ok(LoginOutcome {
            uid: response.uid,
            user_role: response.user_role,
            token_type: response.token_type,
        })
    }

    /// Invalidate the refresh token on the backend and drop local
    /// credentials. Local state is cleared even if the backend call fails.
    pub async fn logout(&self) {
        let session = &self.inner.session;
        if let Some(refresh_token) = session.refresh_token() {
            if let Err(e) = self.inner.backend.logout(&refresh_token).await {
                warn!(error = %e, "Backend logout failed");
            }
        }
        session.forget();
    }

    /// Send a request, refreshing the session once on 401.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let sent_with = self.inner.session.store.access_token();

        match self.execute(&request, sent_with.as_ref()).await {
            Err(e) if e.is_unauthorized() && self.can_retry(&request) => {
                let retry = request.into_retry();
                let token = self.fresh_token(sent_with.as_ref()).await?;
                self.execute(&retry, Some(&token)).await
            }
            other => other,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// Send `body` as JSON and decode the JSON response.
    pub async fn send_json<B, T>(&self, request: ApiRequest, body: &B) -> Result<T, ClientError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.send(request.json(body)?).await?.json()
    }

    pub async fn download(&self, path: &str) -> Result<Download, ClientError> {
        let response = self.send(ApiRequest::get(path)).await?;
        Ok(Download {
            content_type: response.content_type().map(str::to_string),
            file_name: response.file_name(),
            bytes: response.body,
        })
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<ApiResponse, ClientError> {
        let locale = self.locale();
        execute(
            &self.inner.http,
            &self.inner.base,
            request,
            token,
            locale.as_str(),
        )
        .await
    }

    fn can_retry(&self, request: &ApiRequest) -> bool {
        !request.is_retry() && request.path() != REFRESH_PATH
    }

    /// A token newer than `stale`: the one already stored if another request
    /// refreshed in the meantime, otherwise the result of the shared refresh.
    async fn fresh_token(&self, stale: Option<&AccessToken>) -> Result<AccessToken, ClientError> {
        let pending = {
            let mut slot = self.inner.refresh.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Refresh in flight, waiting for it");
                    pending.clone()
                }
                None => {
                    if let Some(current) = self.inner.session.store.access_token() {
                        if Some(&current) != stale {
                            return Ok(current);
                        }
                    }
                    let refresh = self.start_refresh();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        pending.await.map_err(ClientError::from)
    }

    fn start_refresh(&self) -> RefreshFuture {
        let backend = self.inner.backend.clone();
        let mut session = self.inner.session.clone();
        let navigator = self.inner.navigator.clone();
        let default_locale = self.inner.default_locale.clone();
        let slot: Weak<RefreshSlot> = Arc::downgrade(&self.inner.refresh);

        debug!("Starting session refresh");
        async move {
            let result = rotate_session(backend.as_ref(), &mut session)
                .await
                .map(|pair| pair.access_token);

            if result.is_err() {
                session.forget();
                let locale = session.store.locale().unwrap_or(default_locale);
                navigator.redirect(&locale.login_path());
            }

            if let Some(slot) = slot.upgrade() {
                slot.lock().await.take();
            }
            result
        }
        .boxed()
        .shared()
    }
}
