pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod locale;
pub mod pages;
pub mod rate_limit;
pub mod token;

use api::create_api_router;
use auth::{CookiePolicy, HttpBackend, SessionBackend};
use axum::{Router, response::Redirect, routing::get};
use client::ServerClientFactory;
use locale::LocaleSet;
use pages::PagesState;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

pub struct PortalConfig {
    /// Base URL of the remote API (e.g., "https://api.example.com/v1/")
    pub backend_url: Url,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub production: bool,
    /// Locales served under `/{locale}/...`
    pub locales: LocaleSet,
    /// Access token cookie lifetime in seconds
    pub access_max_age: u64,
    /// Refresh token cookie lifetime in seconds
    pub refresh_max_age: u64,
    /// Take the client IP from `X-Forwarded-For` (requires running behind a proxy)
    pub trust_proxy: bool,
}

impl PortalConfig {
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: self.production,
            access_max_age: self.access_max_age,
            refresh_max_age: self.refresh_max_age,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &PortalConfig) -> Router {
    let http = reqwest::Client::new();
    let backend = Arc::new(HttpBackend::with_client(
        http.clone(),
        config.backend_url.clone(),
    ));
    build_app(config, backend, http)
}

/// Create the application router with a custom session backend. Page data is
/// still fetched from `config.backend_url`.
pub fn create_app_with_backend(config: &PortalConfig, backend: Arc<dyn SessionBackend>) -> Router {
    build_app(config, backend, reqwest::Client::new())
}

fn build_app(
    config: &PortalConfig,
    backend: Arc<dyn SessionBackend>,
    http: reqwest::Client,
) -> Router {
    let policy = config.cookie_policy();
    let locales = Arc::new(config.locales.clone());
    let rate_limit = Arc::new(RateLimitConfig::new(config.trust_proxy));

    let api_router = create_api_router(backend.clone(), policy, rate_limit);

    let pages_state = PagesState {
        backend,
        clients: ServerClientFactory::new(http, config.backend_url.clone()),
        policy,
        locales: locales.clone(),
    };

    let home = format!("/{}/personnel", locales.default_locale());

    Router::new()
        .route("/", get(Redirect::temporary(&home)))
        .nest("/api", api_router)
        .merge(pages::router(pages_state))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: PortalConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: PortalConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
