//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO and JSON errors into context-rich `OptOutError` variants.

use crate::base::opterror::OptOutError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add registry-source context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use optoutkeeper::base::context::IoResultExt;
    ///
    /// let raw = tokio::fs::read_to_string(&path).await
    ///     .registry_context(path.display())?;
    /// // Error: "Registry feed registry.json unavailable: No such file or directory"
    /// ```
    fn registry_context(self, location: impl std::fmt::Display) -> Result<T, OptOutError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn registry_context(self, location: impl std::fmt::Display) -> Result<T, OptOutError> {
        self.map_err(|e| OptOutError::registry_unavailable(location.to_string(), e.to_string()))
    }
}

/// Extension trait for adding context to `serde_json` Results.
pub trait JsonResultExt<T> {
    /// Map a parse failure of the registry feed.
    fn feed_context(self) -> Result<T, OptOutError>;

    /// Map a parse failure of an engine configuration document.
    fn config_context(self) -> Result<T, OptOutError>;
}

impl<T> JsonResultExt<T> for Result<T, serde_json::Error> {
    fn feed_context(self) -> Result<T, OptOutError> {
        self.map_err(|e| OptOutError::RegistryParse(e.to_string()))
    }

    fn config_context(self) -> Result<T, OptOutError> {
        self.map_err(|e| OptOutError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_registry_context() {
        let result: Result<(), io::Error> = Err(Error::new(ErrorKind::NotFound, "missing"));
        let err = result.registry_context("registry.json").unwrap_err();

        match err {
            OptOutError::RegistryUnavailable { location, reason } => {
                assert_eq!(location, "registry.json");
                assert_eq!(reason, "missing");
            }
            _ => panic!("Expected RegistryUnavailable"),
        }
    }

    #[test]
    fn test_feed_context() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{ not json");
        let err = result.feed_context().unwrap_err();
        assert!(matches!(err, OptOutError::RegistryParse(_)));
    }

    #[test]
    fn test_config_context() {
        let result: Result<Vec<u8>, _> = serde_json::from_str("\"text\"");
        let err = result.config_context().unwrap_err();
        assert!(matches!(err, OptOutError::InvalidConfig(_)));
    }
}
