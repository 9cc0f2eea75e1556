//! Domain-indexed opt-out policy registry.
//!
//! Built once from the registry feed and read-only afterwards. Lookups
//! walk from the most specific domain towards its parents, so a policy
//! registered for `.doubleclick.net` also covers `ad.x.doubleclick.net`.

use crate::base::opterror::OptOutError;
use crate::cookies::canonical_cookie::{canonical_domain, CanonicalCookie};
use crate::cookies::psl;
use crate::policy::feed::{FeedEntry, RegistryFeed, RegistrySource};
use std::collections::HashMap;
use time::OffsetDateTime;
use url::Url;

/// Expiration stamped on every policy cookie: 2030-12-31T00:00:00Z.
pub const FAR_FUTURE_EXPIRY: i64 = 1_924_992_000;

/// A cookie that must exist with a specific value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Canonical domain (leading `.`, lowercase).
    pub domain: String,
    pub name: String,
    pub value: String,
    pub path: String,
    /// `http://` + domain without its leading dot + path.
    pub url: Url,
    pub expiration: OffsetDateTime,
}

impl Policy {
    /// Normalize a feed row. Returns `None` for rows that can't be
    /// addressed as a cookie URL.
    fn from_entry(entry: FeedEntry) -> Option<Self> {
        let domain = canonical_domain(&entry.host);
        let url = Url::parse(&format!(
            "http://{}{}",
            domain.trim_start_matches('.'),
            entry.path
        ))
        .ok()?;
        let expiration = OffsetDateTime::from_unix_timestamp(FAR_FUTURE_EXPIRY).ok()?;

        Some(Self {
            domain,
            name: entry.name,
            value: entry.value,
            path: entry.path,
            url,
            expiration,
        })
    }

    /// The cookie this policy asks the store to write.
    pub fn to_cookie(&self) -> CanonicalCookie {
        CanonicalCookie::new(
            self.name.clone(),
            self.value.clone(),
            self.domain.clone(),
            self.path.clone(),
            OffsetDateTime::now_utc(),
            Some(self.expiration),
        )
    }
}

/// Index from canonical domain to its ordered policy list.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    domains: Vec<(String, Vec<Policy>)>,
    by_domain: HashMap<String, usize>,
    skipped: usize,
}

impl PolicyRegistry {
    /// Fetch and index the feed from `source`.
    pub async fn load(source: &dyn RegistrySource) -> Result<Self, OptOutError> {
        let raw = source.fetch().await?;
        let registry = Self::from_json_str(&raw)?;
        tracing::info!(
            source = %source.describe(),
            domains = registry.domain_count(),
            policies = registry.policy_count(),
            skipped = registry.skipped(),
            "Policy registry loaded"
        );
        Ok(registry)
    }

    /// Index a raw feed document.
    pub fn from_json_str(raw: &str) -> Result<Self, OptOutError> {
        let entries = RegistryFeed::parse(raw)?.into_entries()?;
        Ok(Self::from_entries(entries))
    }

    /// Index feed rows, keeping feed order within each domain.
    pub fn from_entries(entries: impl IntoIterator<Item = FeedEntry>) -> Self {
        let mut registry = Self::default();

        for entry in entries {
            if entry.is_placeholder() {
                continue;
            }

            if psl::is_public_suffix(&entry.host) {
                tracing::warn!(host = %entry.host, name = %entry.name, "Skipping policy on a public suffix");
                registry.skipped += 1;
                continue;
            }

            let host = entry.host.clone();
            match Policy::from_entry(entry) {
                Some(policy) => registry.insert(policy),
                None => {
                    tracing::warn!(host = %host, "Skipping policy with an unusable URL");
                    registry.skipped += 1;
                }
            }
        }

        registry
    }

    fn insert(&mut self, policy: Policy) {
        match self.by_domain.get(&policy.domain) {
            Some(&idx) => self.domains[idx].1.push(policy),
            None => {
                self.by_domain
                    .insert(policy.domain.clone(), self.domains.len());
                self.domains.push((policy.domain.clone(), vec![policy]));
            }
        }
    }

    /// Policies for `domain` or its nearest registered parent.
    ///
    /// `www.doubleclick.net` tries `.www.doubleclick.net`, then
    /// `.doubleclick.net`, then `.net`.
    pub fn resolve(&self, domain: &str) -> Option<&[Policy]> {
        let canonical = canonical_domain(domain);
        let mut candidate = canonical.as_str();

        loop {
            if let Some(&idx) = self.by_domain.get(candidate) {
                return Some(&self.domains[idx].1);
            }

            // Drop the leading dot and the first label.
            let rest = &candidate[1..];
            match rest.find('.') {
                Some(pos) => candidate = &rest[pos..],
                None => return None,
            }
        }
    }

    /// Visit every domain and its policy list in indexing order.
    pub fn for_each_domain<F>(&self, mut f: F)
    where
        F: FnMut(&str, &[Policy]),
    {
        for (domain, policies) in &self.domains {
            f(domain, policies);
        }
    }

    /// Iterate over `(domain, policies)` in indexing order.
    pub fn domains(&self) -> impl Iterator<Item = (&str, &[Policy])> + '_ {
        self.domains
            .iter()
            .map(|(domain, policies)| (domain.as_str(), policies.as_slice()))
    }

    /// Iterate over every policy in the registry.
    pub fn iter(&self) -> impl Iterator<Item = &Policy> + '_ {
        self.domains.iter().flat_map(|(_, policies)| policies.iter())
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn policy_count(&self) -> usize {
        self.domains.iter().map(|(_, p)| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Feed rows dropped during indexing (public suffixes, bad URLs).
    /// Placeholder rows are not counted.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// The rows that decide validity: for each name, the last row in scan
    /// order. Order of first appearance is kept.
    pub fn effective(policies: &[Policy]) -> Vec<&Policy> {
        let mut winners: Vec<&Policy> = Vec::new();
        for policy in policies {
            match winners.iter_mut().find(|p| p.name == policy.name) {
                Some(slot) => *slot = policy,
                None => winners.push(policy),
            }
        }
        winners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(json: &str) -> PolicyRegistry {
        PolicyRegistry::from_json_str(json).unwrap()
    }

    #[test]
    fn test_normalizes_domain_and_url() {
        let reg = registry(
            r#"{"registry":[{"host":"btrll.com","name":"opt","value":"1","path":"/x"}]}"#,
        );
        let policies = reg.resolve("btrll.com").unwrap();
        assert_eq!(policies[0].domain, ".btrll.com");
        assert_eq!(policies[0].url.as_str(), "http://btrll.com/x");
        assert_eq!(policies[0].expiration.unix_timestamp(), FAR_FUTURE_EXPIRY);
    }

    #[test]
    fn test_placeholder_rows_skipped_silently() {
        let reg = registry(
            r#"{"registry":[{"host":"host","name":"name","value":"v"},{"host":"a.com","name":"n","value":"v"}]}"#,
        );
        assert_eq!(reg.policy_count(), 1);
        assert_eq!(reg.skipped(), 0);
    }

    #[test]
    fn test_public_suffix_rows_skipped() {
        let reg = registry(
            r#"{"registry":[{"host":".com","name":"n","value":"v"},{"host":"a.com","name":"n","value":"v"}]}"#,
        );
        assert_eq!(reg.domain_count(), 1);
        assert_eq!(reg.skipped(), 1);
    }

    #[test]
    fn test_resolve_walks_parents() {
        let reg = registry(r#"{"registry":[{"host":".doubleclick.net","name":"id","value":"OPT_OUT"}]}"#);
        assert!(reg.resolve("www.doubleclick.net").is_some());
        assert!(reg.resolve(".ad.x.doubleclick.net").is_some());
        assert!(reg.resolve("doubleclick.com").is_none());
        assert!(reg.resolve("net").is_none());
    }

    #[test]
    fn test_effective_keeps_last_per_name() {
        let reg = registry(
            r#"{"registry":[
                {"host":"a.com","name":"id","value":"old"},
                {"host":"a.com","name":"other","value":"x"},
                {"host":"a.com","name":"id","value":"new"}
            ]}"#,
        );
        let effective = PolicyRegistry::effective(reg.resolve("a.com").unwrap());
        assert_eq!(effective.len(), 2);
        assert_eq!(effective[0].value, "new");
        assert_eq!(effective[1].name, "other");
    }
}
