use crate::base::opterror::OptOutError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Represents a cookie as the cookie store reports it.
/// Modeled after Chromium's `net::CanonicalCookie`, with the field layout of
/// the extension cookie API so recorded change events deserialize directly.
///
/// Domain cookies carry a leading `.` in `domain`; host-only cookies don't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::timestamp")]
    pub creation_time: OffsetDateTime,
    #[serde(
        default,
        rename = "expirationDate",
        with = "time::serde::timestamp::option"
    )]
    pub expiration_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub host_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    #[default]
    Unspecified,
    NoRestriction,
    Lax,
    Strict,
}

fn default_path() -> String {
    "/".to_string()
}

/// Normalize a cookie domain to the dotted, lowercase form used as a
/// registry and lock key: `www.Example.com` becomes `.www.example.com`.
pub fn canonical_domain(domain: &str) -> String {
    let lower = domain.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

impl CanonicalCookie {
    pub fn new(
        name: String,
        value: String,
        domain: String,
        path: String,
        creation_time: OffsetDateTime,
        expiration_time: Option<OffsetDateTime>,
    ) -> Self {
        let host_only = !domain.starts_with('.');
        Self {
            name,
            value,
            domain,
            path,
            creation_time,
            expiration_time,
            secure: false,
            http_only: false,
            host_only,
            same_site: SameSite::Unspecified,
        }
    }

    /// Shorthand for a session cookie created now.
    pub fn session(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self::new(
            name.into(),
            value.into(),
            domain.into(),
            default_path(),
            OffsetDateTime::now_utc(),
            None,
        )
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        if let Some(expiry) = self.expiration_time {
            expiry < current_time
        } else {
            false
        }
    }

    /// Dotted, lowercase form of this cookie's domain.
    pub fn canonical_domain(&self) -> String {
        canonical_domain(&self.domain)
    }

    /// The URL the cookie store addresses this cookie by:
    /// `http://` + domain without its leading dot + path.
    pub fn url(&self) -> Result<Url, OptOutError> {
        let raw = format!(
            "http://{}{}",
            self.domain.trim_start_matches('.'),
            self.path
        );
        Url::parse(&raw).map_err(|_| OptOutError::InvalidCookieUrl(raw))
    }
}
