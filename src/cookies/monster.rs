use crate::base::opterror::{OptOutError, StoreOp};
use crate::cookies::canonical_cookie::{CanonicalCookie, SameSite};
use crate::cookies::store::{
    ChangeCause, CookieChange, CookieEvent, CookieFilter, CookieStore, StoreFuture,
};
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use url::Url;

/// Maximum cookies per domain (Chromium default).
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Default capacity of the change notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// In-memory cookie store with change notifications.
/// Modeled after Chromium's `net::CookieMonster`, reporting changes the way
/// the extension cookie API does: an overwrite is delivered as a removal of
/// the old cookie followed by an addition of the new one.
///
/// Cloning yields another handle to the same jar.
#[derive(Clone)]
pub struct CookieMonster {
    // Store: Map<Domain without leading dot, List<Cookie>>
    store: Arc<DashMap<String, Vec<CanonicalCookie>>>,
    events: broadcast::Sender<CookieEvent>,
}

impl Default for CookieMonster {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieMonster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a store whose subscribers buffer up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            store: Arc::new(DashMap::new()),
            events,
        }
    }

    fn domain_key(domain: &str) -> String {
        domain.trim_start_matches('.').to_lowercase()
    }

    fn notify(&self, event: CookieEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Insert or replace a cookie, emitting change notifications.
    pub fn set_canonical_cookie(&self, cookie: CanonicalCookie) {
        let now = OffsetDateTime::now_utc();
        let mut changes = Vec::new();

        {
            let mut entry = self
                .store
                .entry(Self::domain_key(&cookie.domain))
                .or_default();

            // Remove existing if name/domain/path match
            if let Some(idx) = entry.iter().position(|c| {
                c.name == cookie.name && c.path == cookie.path && c.domain == cookie.domain
            }) {
                let old = entry.remove(idx);
                let cause = if cookie.is_expired(now) {
                    ChangeCause::ExpiredOverwrite
                } else {
                    ChangeCause::Overwrite
                };
                changes.push(CookieChange::removed(old, cause));
            }

            if !cookie.is_expired(now) {
                // Enforce per-domain limit with LRU eviction
                while entry.len() >= MAX_COOKIES_PER_DOMAIN {
                    if let Some(oldest_idx) = entry
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, c)| c.creation_time)
                        .map(|(i, _)| i)
                    {
                        let evicted = entry.remove(oldest_idx);
                        changes.push(CookieChange::removed(evicted, ChangeCause::Evicted));
                    } else {
                        break;
                    }
                }

                entry.push(cookie.clone());
                changes.push(CookieChange::added(cookie));
            }
        } // Release shard lock before notifying

        for change in changes {
            self.notify(change.into());
        }
    }

    /// Get cookies matching the URL with proper domain suffix matching.
    pub fn get_cookies_for_url(&self, url: &Url) -> Vec<CanonicalCookie> {
        let mut result = Vec::new();
        let host = url.host_str().unwrap_or("");
        let now = OffsetDateTime::now_utc();

        for domain in Self::get_matching_domains(host) {
            if let Some(entry) = self.store.get(&domain) {
                for cookie in entry.iter() {
                    if !Self::domain_matches(&cookie.domain, host, cookie.host_only) {
                        continue;
                    }

                    if !Self::path_matches(&cookie.path, url.path()) {
                        continue;
                    }

                    if cookie.secure && url.scheme() != "https" {
                        continue;
                    }

                    if cookie.is_expired(now) {
                        continue;
                    }

                    result.push(cookie.clone());
                }
            }
        }

        // Sort by path length (longest first) then creation time
        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });

        result
    }

    /// Remove the cookie named `name` that would be sent to `url`. When
    /// several match, the one `get` would return goes: longest path, then
    /// oldest. Returns whether a cookie was removed.
    pub fn remove_cookie(&self, name: &str, url: &Url) -> bool {
        let Some(target) = self
            .get_cookies_for_url(url)
            .into_iter()
            .find(|c| c.name == name)
        else {
            return false;
        };

        let removed = self
            .store
            .get_mut(&Self::domain_key(&target.domain))
            .and_then(|mut entry| {
                let idx = entry.iter().position(|c| {
                    c.name == target.name && c.domain == target.domain && c.path == target.path
                })?;
                Some(entry.remove(idx))
            });

        match removed {
            Some(cookie) => {
                self.notify(CookieChange::removed(cookie, ChangeCause::Explicit).into());
                true
            }
            None => false,
        }
    }

    /// Check if cookie domain matches request host.
    /// Implements RFC 6265 domain matching.
    fn domain_matches(cookie_domain: &str, request_host: &str, host_only: bool) -> bool {
        if host_only {
            // Host-only cookie: exact match required
            return cookie_domain.eq_ignore_ascii_case(request_host);
        }

        // Domain cookie: suffix match
        let cookie_domain = cookie_domain.trim_start_matches('.');

        if request_host.eq_ignore_ascii_case(cookie_domain) {
            return true;
        }

        // Check if request_host ends with .cookie_domain
        if request_host.len() > cookie_domain.len() {
            let split = request_host.len() - cookie_domain.len();
            if let Some(suffix) = request_host.get(split..) {
                if suffix.eq_ignore_ascii_case(cookie_domain) {
                    return request_host.as_bytes()[split - 1] == b'.';
                }
            }
        }

        false
    }

    /// Check if request path matches cookie path.
    /// Implements RFC 6265 path matching.
    fn path_matches(cookie_path: &str, request_path: &str) -> bool {
        if request_path == cookie_path {
            return true;
        }

        if request_path.starts_with(cookie_path) {
            // Cookie path is a prefix
            if cookie_path.ends_with('/') {
                return true;
            }
            // Check that the next character in request_path is '/'
            return request_path.as_bytes().get(cookie_path.len()) == Some(&b'/');
        }

        false
    }

    /// Get all domains to check for a given host.
    /// Returns the host itself and all parent domains.
    fn get_matching_domains(host: &str) -> Vec<String> {
        let host = host.to_lowercase();
        let mut domains = vec![host.clone()];

        // Add parent domains (e.g., for "foo.bar.example.com", add "bar.example.com", "example.com")
        let parts: Vec<&str> = host.split('.').collect();
        for i in 1..parts.len().saturating_sub(1) {
            domains.push(parts[i..].join("."));
        }

        domains
    }

    /// Parse a `Set-Cookie` line as if `url` had sent it and store the result.
    /// Used to simulate sites writing cookies.
    pub fn parse_and_save_cookie(&self, url: &Url, cookie_line: &str) {
        use cookie::Cookie;

        let parsed = match Cookie::parse(cookie_line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(line = %cookie_line, error = %e, "Failed to parse cookie");
                return;
            }
        };

        let host = url.host_str().unwrap_or("").to_lowercase();
        let domain = if let Some(d) = parsed.domain() {
            let d = d.trim_start_matches('.').to_lowercase();

            // PSL validation: reject cookies set on public suffixes
            if !crate::cookies::psl::is_valid_cookie_domain(&d, &host) {
                tracing::debug!(domain = %d, host = %host, "Rejected cookie domain");
                return;
            }

            format!(".{}", d)
        } else {
            host
        };

        let same_site = match parsed.same_site() {
            Some(cookie::SameSite::Lax) => SameSite::Lax,
            Some(cookie::SameSite::Strict) => SameSite::Strict,
            Some(cookie::SameSite::None) => SameSite::NoRestriction,
            None => SameSite::Unspecified,
        };

        let mut c = CanonicalCookie::new(
            parsed.name().to_string(),
            parsed.value().to_string(),
            domain,
            parsed.path().unwrap_or("/").to_string(),
            OffsetDateTime::now_utc(),
            parsed.expires().and_then(|e| e.datetime()),
        );
        c.secure = parsed.secure().unwrap_or(false);
        c.http_only = parsed.http_only().unwrap_or(false);
        c.same_site = same_site;

        self.set_canonical_cookie(c);
    }

    /// Remove every cookie for `domain` and its subdomains, reported as
    /// one batch. Returns the number of cookies removed.
    pub fn clear_domain(&self, domain: &str) -> usize {
        let key = Self::domain_key(domain);
        let suffix = format!(".{}", key);
        let keys: Vec<String> = self
            .store
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| *k == key || k.ends_with(&suffix))
            .collect();

        let mut removed = Vec::new();
        for k in keys {
            if let Some((_, cookies)) = self.store.remove(&k) {
                removed.extend(cookies);
            }
        }

        let count = removed.len();
        if count > 0 {
            self.notify(CookieEvent::BatchRemoved(removed));
        }
        count
    }

    /// Get total cookie count.
    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    /// Clear all cookies.
    pub fn clear(&self) {
        self.store.clear();
        self.notify(CookieEvent::Cleared);
    }

    /// Iterate over all cookies.
    pub fn iter_all_cookies(&self) -> impl Iterator<Item = CanonicalCookie> + '_ {
        self.store.iter().flat_map(|entry| entry.value().clone())
    }
}

impl CookieStore for CookieMonster {
    fn get_all(&self, filter: &CookieFilter) -> StoreFuture<'_, Vec<CanonicalCookie>> {
        let now = OffsetDateTime::now_utc();
        let cookies: Vec<CanonicalCookie> = self
            .iter_all_cookies()
            .filter(|c| !c.is_expired(now) && filter.matches(c))
            .collect();
        Box::pin(std::future::ready(Ok(cookies)))
    }

    fn get(&self, name: &str, url: &Url) -> StoreFuture<'_, Option<CanonicalCookie>> {
        let found = self
            .get_cookies_for_url(url)
            .into_iter()
            .find(|c| c.name == name);
        Box::pin(std::future::ready(Ok(found)))
    }

    fn set(&self, url: &Url, cookie: CanonicalCookie) -> StoreFuture<'_, ()> {
        let host = url.host_str().unwrap_or("");
        let result = if crate::cookies::psl::is_valid_cookie_domain(&cookie.domain, host) {
            self.set_canonical_cookie(cookie);
            Ok(())
        } else {
            Err(OptOutError::store(
                StoreOp::Set,
                format!("domain {} is not valid for {}", cookie.domain, url),
            ))
        };
        Box::pin(std::future::ready(result))
    }

    fn remove(&self, name: &str, url: &Url) -> StoreFuture<'_, ()> {
        self.remove_cookie(name, url);
        Box::pin(std::future::ready(Ok(())))
    }

    fn subscribe(&self) -> broadcast::Receiver<CookieEvent> {
        self.events.subscribe()
    }
}
