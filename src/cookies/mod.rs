//! Cookie representation and the cookie store capability.
//!
//! # Architecture
//!
//! This mirrors the split between Chromium's cookie jar and the extension
//! cookie API that sits on top of it:
//!
//! | Chromium | optoutkeeper | Responsibility |
//! |----------|--------------|----------------|
//! | `net::CanonicalCookie` | [`CanonicalCookie`](canonical_cookie::CanonicalCookie) | Single cookie representation |
//! | `chrome.cookies` | [`CookieStore`](store::CookieStore) | Enumerate, get, set, remove, subscribe |
//! | `net::CookieMonster` | [`CookieMonster`](monster::CookieMonster) | In-memory jar with change notifications |
//!
//! # Simulating a site
//!
//! ```rust
//! use optoutkeeper::cookies::monster::CookieMonster;
//! use url::Url;
//!
//! let jar = CookieMonster::new();
//! let url = Url::parse("http://ad.doubleclick.net/").unwrap();
//! jar.parse_and_save_cookie(&url, "id=OPT_OUT; Domain=doubleclick.net; Path=/");
//! assert_eq!(jar.total_cookie_count(), 1);
//! ```

pub mod canonical_cookie;
pub mod monster;
pub mod psl;
pub mod store;
