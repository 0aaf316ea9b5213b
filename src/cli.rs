//! CLI argument parsing, validation, and startup helpers.

use crate::PortalConfig;
use crate::auth::{DEFAULT_ACCESS_MAX_AGE_SECS, DEFAULT_REFRESH_MAX_AGE_SECS};
use crate::locale::{Locale, LocaleSet};
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "directory-portal",
    about = "Localized staff directory portal in front of a token-authenticated API"
)]
pub struct Args {
    /// Base URL of the backend API
    #[arg(long, env = "PORTAL_BACKEND_URL", default_value = "http://localhost:8080/api/")]
    pub backend_url: String,

    /// Port to listen on
    #[arg(short, long, env = "PORTAL_PORT", default_value = "7300")]
    pub port: u16,

    /// Production mode: session cookies get the Secure flag
    #[arg(long, env = "PORTAL_PRODUCTION")]
    pub production: bool,

    /// Comma-separated list of supported locales
    #[arg(long, env = "PORTAL_LOCALES", default_value = "en,tr")]
    pub locales: String,

    /// Locale used when a request carries none
    #[arg(long, env = "PORTAL_DEFAULT_LOCALE", default_value = "en")]
    pub default_locale: String,

    /// Access token cookie lifetime in seconds
    #[arg(long, env = "PORTAL_ACCESS_MAX_AGE", default_value_t = DEFAULT_ACCESS_MAX_AGE_SECS)]
    pub access_max_age: u64,

    /// Refresh token cookie lifetime in seconds
    #[arg(long, env = "PORTAL_REFRESH_MAX_AGE", default_value_t = DEFAULT_REFRESH_MAX_AGE_SECS)]
    pub refresh_max_age: u64,

    /// Take the client IP from X-Forwarded-For. Only enable behind a proxy that sets it
    #[arg(long, env = "PORTAL_TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Log output format
    #[arg(short, long, env = "PORTAL_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str, production: bool) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %backend_url, "Backend URL must use http or https");
        return None;
    }

    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));
    if production && url.scheme() != "https" && !is_localhost {
        warn!(url = %backend_url, "Backend URL is not HTTPS in production mode");
    }

    Some(url)
}

/// Parse the supported locale list and default locale.
/// Returns None and logs an error if any tag is invalid.
pub fn parse_locales(locales: &str, default_locale: &str) -> Option<LocaleSet> {
    let Some(default) = Locale::parse(default_locale) else {
        error!(locale = %default_locale, "Invalid default locale");
        return None;
    };

    let mut supported = Vec::new();
    for tag in locales.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match Locale::parse(tag) {
            Some(locale) => supported.push(locale),
            None => {
                error!(locale = %tag, "Invalid locale in supported list");
                return None;
            }
        }
    }

    Some(LocaleSet::new(supported, default))
}

/// Build PortalConfig from validated arguments.
pub fn build_config(args: &Args, backend_url: Url, locales: LocaleSet) -> PortalConfig {
    if args.access_max_age >= args.refresh_max_age {
        warn!(
            access_max_age = args.access_max_age,
            refresh_max_age = args.refresh_max_age,
            "Access cookie outlives refresh cookie"
        );
    }

    info!(
        backend = %backend_url,
        production = args.production,
        default_locale = %locales.default_locale(),
        "Portal configured"
    );

    PortalConfig {
        backend_url,
        production: args.production,
        locales,
        access_max_age: args.access_max_age,
        refresh_max_age: args.refresh_max_age,
        trust_proxy: args.trust_proxy,
    }
}
