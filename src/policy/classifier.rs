//! Classification of observed cookies against the policy registry.

use crate::cookies::canonical_cookie::CanonicalCookie;
use crate::policy::registry::PolicyRegistry;
use std::cell::OnceCell;

/// Verdict for one observed cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Name and value match the deciding policy.
    Valid,
    /// Name is governed by a policy but the value differs.
    Invalid,
    /// No policy covers this domain or name.
    Irrelevant,
}

impl Classification {
    pub fn is_valid(self) -> bool {
        self == Classification::Valid
    }

    pub fn is_invalid(self) -> bool {
        self == Classification::Invalid
    }
}

/// Wraps one observed cookie for the duration of a single event or sweep
/// step. The verdict is computed on first use and cached on the instance;
/// an empty cell means "not computed yet".
#[derive(Debug)]
pub struct CookieClassifier<'c> {
    cookie: &'c CanonicalCookie,
    verdict: OnceCell<Classification>,
}

impl<'c> CookieClassifier<'c> {
    pub fn new(cookie: &'c CanonicalCookie) -> Self {
        Self {
            cookie,
            verdict: OnceCell::new(),
        }
    }

    pub fn cookie(&self) -> &'c CanonicalCookie {
        self.cookie
    }

    /// Classify against `registry`. Later calls return the cached verdict
    /// even if given a different registry.
    pub fn classify(&self, registry: &PolicyRegistry) -> Classification {
        *self
            .verdict
            .get_or_init(|| Self::evaluate(self.cookie, registry))
    }

    /// The cached verdict, if `classify` has run.
    pub fn cached(&self) -> Option<Classification> {
        self.verdict.get().copied()
    }

    fn evaluate(cookie: &CanonicalCookie, registry: &PolicyRegistry) -> Classification {
        let Some(policies) = registry.resolve(&cookie.domain) else {
            return Classification::Irrelevant;
        };

        // Every same-name row overwrites the verdict; the last one decides.
        let mut verdict = Classification::Irrelevant;
        for policy in policies {
            if policy.name == cookie.name {
                verdict = if policy.value == cookie.value {
                    Classification::Valid
                } else {
                    Classification::Invalid
                };
            }
        }
        verdict
    }
}
