//! Supported locales and locale-prefixed routes.

use std::fmt;

use serde::Serialize;

/// A locale tag such as `en` or `tr`, used as the first path segment and as
/// the `Accept-Language` value sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    /// Parse a locale tag. Accepts ASCII letters with an optional `-REGION`.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        let (lang, region) = match tag.split_once('-') {
            Some((lang, region)) => (lang, Some(region)),
            None => (tag, None),
        };

        let lang_ok = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic());
        let region_ok = region.is_none_or(|r| {
            (2..=3).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphanumeric())
        });

        if !lang_ok || !region_ok {
            return None;
        }

        Some(Self(tag.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Login route for this locale.
    pub fn login_path(&self) -> String {
        format!("/{}/login", self.0)
    }
}

/// English.
impl Default for Locale {
    fn default() -> Self {
        Self("en".to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The locales the portal serves, with a default used when a request
/// carries no recognizable locale.
#[derive(Debug, Clone)]
pub struct LocaleSet {
    supported: Vec<Locale>,
    default: Locale,
}

impl LocaleSet {
    /// Build a locale set. The default is added to `supported` if missing.
    pub fn new(mut supported: Vec<Locale>, default: Locale) -> Self {
        if !supported.contains(&default) {
            supported.push(default.clone());
        }
        Self { supported, default }
    }

    pub fn default_locale(&self) -> &Locale {
        &self.default
    }

    pub fn supported(&self) -> &[Locale] {
        &self.supported
    }

    /// Resolve a tag against the supported set.
    pub fn resolve(&self, tag: &str) -> Option<&Locale> {
        let wanted = Locale::parse(tag)?;
        self.supported.iter().find(|l| **l == wanted)
    }

    /// Locale named by the first segment of `path`, or the default.
    pub fn from_path(&self, path: &str) -> &Locale {
        path.trim_start_matches('/')
            .split('/')
            .next()
            .and_then(|segment| self.resolve(segment))
            .unwrap_or(&self.default)
    }
}
