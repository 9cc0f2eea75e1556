//! Reconciliation engine configuration.

use crate::base::context::JsonResultExt;
use crate::base::opterror::OptOutError;
use crate::cookies::canonical_cookie::canonical_domain;
use serde::Deserialize;
use std::time::Duration;

/// Tuning values for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay before recreating a valid cookie that was removed, in
    /// milliseconds (default: 5000)
    pub recreate_delay_ms: u64,
    /// Domains whose invalid cookies the sweep never removes, because
    /// purging them logs users out (default: [".yahoo.com"])
    pub protected_domains: Vec<String>,
    /// Capacity of the cookie change channel (default: 1024)
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recreate_delay_ms: 5000,
            protected_domains: vec![".yahoo.com".to_string()],
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, OptOutError> {
        let config: Self = serde_json::from_str(raw).config_context()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OptOutError> {
        if self.event_capacity == 0 {
            return Err(OptOutError::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the recreate delay.
    pub fn with_recreate_delay(mut self, delay: Duration) -> Self {
        self.recreate_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Add a protected domain.
    pub fn with_protected_domain(mut self, domain: impl Into<String>) -> Self {
        self.protected_domains.push(domain.into());
        self
    }

    pub fn recreate_delay(&self) -> Duration {
        Duration::from_millis(self.recreate_delay_ms)
    }

    /// Whether the sweep must leave `domain` alone. Exact match after
    /// canonicalization; subdomains are not covered.
    pub fn is_protected(&self, domain: &str) -> bool {
        let domain = canonical_domain(domain);
        self.protected_domains
            .iter()
            .any(|d| canonical_domain(d) == domain)
    }
}
