//! Cookie store capability.
//!
//! The reconciliation engine never talks to a browser directly. It consumes
//! the [`CookieStore`] trait: enumerate, get, set, remove, and a change
//! subscription. A browser binding implements it on top of the platform's
//! cookie API; [`CookieMonster`](crate::cookies::monster::CookieMonster)
//! implements it in memory.
//!
//! # Design Notes
//!
//! - Operations return boxed futures so the trait stays object-safe.
//! - Uses `&self`; implementations synchronize internally.
//! - Change notifications are not atomic replaces: overwriting a cookie is
//!   reported as a removal of the old value followed by an addition of the
//!   new one.

use crate::base::opterror::OptOutError;
use crate::cookies::canonical_cookie::{canonical_domain, CanonicalCookie};
use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::sync::broadcast;
use url::Url;

/// Alias for the `Future` type returned by cookie store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, OptOutError>> + Send + 'a>>;

/// Why the store changed a cookie (mirrors the extension API's `OnChangedCause`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// Inserted or removed by an explicit call.
    #[default]
    Explicit,
    /// Removed because a write replaced it.
    Overwrite,
    /// Removed because it expired.
    Expired,
    /// Evicted by garbage collection.
    Evicted,
    /// Overwritten with an already-expired expiration date.
    ExpiredOverwrite,
}

/// A single cookie addition or removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieChange {
    pub cookie: CanonicalCookie,
    pub removed: bool,
    #[serde(default)]
    pub cause: ChangeCause,
}

impl CookieChange {
    pub fn added(cookie: CanonicalCookie) -> Self {
        Self {
            cookie,
            removed: false,
            cause: ChangeCause::Explicit,
        }
    }

    pub fn removed(cookie: CanonicalCookie, cause: ChangeCause) -> Self {
        Self {
            cookie,
            removed: true,
            cause,
        }
    }
}

/// Notification delivered to store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieEvent {
    /// One cookie was added or removed.
    Changed(CookieChange),
    /// Several cookies were purged at once (e.g. site data cleared).
    BatchRemoved(Vec<CanonicalCookie>),
    /// The whole store was wiped or reloaded.
    Cleared,
}

impl From<CookieChange> for CookieEvent {
    fn from(change: CookieChange) -> Self {
        CookieEvent::Changed(change)
    }
}

/// Filter for [`CookieStore::get_all`]. The default filter matches every
/// cookie visible to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieFilter {
    /// Restrict to cookies whose domain equals or is a subdomain of this one.
    pub domain: Option<String>,
    /// Restrict to cookies with this exact name.
    pub name: Option<String>,
}

impl CookieFilter {
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether `cookie` passes this filter.
    pub fn matches(&self, cookie: &CanonicalCookie) -> bool {
        if let Some(name) = &self.name {
            if &cookie.name != name {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            let wanted = canonical_domain(domain);
            let have = cookie.canonical_domain();
            if have != wanted && !have.ends_with(&wanted) {
                return false;
            }
        }
        true
    }
}

/// Trait for cookie stores.
///
/// This is the capability interface the core consumes, equivalent to the
/// browser's `chrome.cookies` namespace. Implementations must be thread-safe.
pub trait CookieStore: Send + Sync {
    /// Enumerate all cookies matching `filter`.
    fn get_all(&self, filter: &CookieFilter) -> StoreFuture<'_, Vec<CanonicalCookie>>;

    /// Look up the cookie named `name` that would be sent to `url`.
    /// When several match, the one with the longest path wins.
    fn get(&self, name: &str, url: &Url) -> StoreFuture<'_, Option<CanonicalCookie>>;

    /// Write `cookie` in the context of `url`.
    fn set(&self, url: &Url, cookie: CanonicalCookie) -> StoreFuture<'_, ()>;

    /// Delete the cookie named `name` that would be sent to `url`.
    fn remove(&self, name: &str, url: &Url) -> StoreFuture<'_, ()>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<CookieEvent>;
}

/// Blanket implementation for Arc-wrapped stores.
impl<S: CookieStore + ?Sized> CookieStore for Arc<S> {
    fn get_all(&self, filter: &CookieFilter) -> StoreFuture<'_, Vec<CanonicalCookie>> {
        (**self).get_all(filter)
    }

    fn get(&self, name: &str, url: &Url) -> StoreFuture<'_, Option<CanonicalCookie>> {
        (**self).get(name, url)
    }

    fn set(&self, url: &Url, cookie: CanonicalCookie) -> StoreFuture<'_, ()> {
        (**self).set(url, cookie)
    }

    fn remove(&self, name: &str, url: &Url) -> StoreFuture<'_, ()> {
        (**self).remove(name, url)
    }

    fn subscribe(&self) -> broadcast::Receiver<CookieEvent> {
        (**self).subscribe()
    }
}
