//! Registry feed: the raw JSON document listing opt-out cookies.
//!
//! ```json
//! { "registry": [ { "host": "doubleclick.net", "name": "id", "value": "OPT_OUT", "path": "/" } ] }
//! ```
//!
//! Fetching the document is a collaborator concern behind
//! [`RegistrySource`]. Turning it into an index is
//! [`PolicyRegistry`](crate::policy::registry::PolicyRegistry)'s job.

use crate::base::context::{IoResultExt, JsonResultExt};
use crate::base::opterror::OptOutError;
use serde::Deserialize;
use std::{future::Future, path::PathBuf, pin::Pin};

/// Alias for the `Future` type returned by a registry source.
pub type Fetching<'a> = Pin<Box<dyn Future<Output = Result<String, OptOutError>> + Send + 'a>>;

/// Top-level registry document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryFeed {
    /// Absent when the document is malformed.
    #[serde(default)]
    pub registry: Option<Vec<FeedEntry>>,
}

/// One row of the registry feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedEntry {
    pub host: String,
    pub name: String,
    pub value: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Display-only; not used for enforcement.
    #[serde(default)]
    pub company: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl FeedEntry {
    /// Template rows shipped in the feed (`host: "host", name: "name"`).
    pub fn is_placeholder(&self) -> bool {
        self.host == "host" && self.name == "name"
    }
}

impl RegistryFeed {
    /// Parse a registry document.
    pub fn parse(raw: &str) -> Result<Self, OptOutError> {
        serde_json::from_str(raw).feed_context()
    }

    /// Take the entries, failing if the `registry` collection is missing.
    pub fn into_entries(self) -> Result<Vec<FeedEntry>, OptOutError> {
        self.registry.ok_or(OptOutError::RegistryMissingCollection)
    }
}

/// Trait for registry feed sources.
///
/// # Design Notes
///
/// - Called once per load; no caching.
/// - Returns boxed futures for trait object compatibility.
pub trait RegistrySource: Send + Sync {
    /// Fetch the raw registry document.
    fn fetch(&self) -> Fetching<'_>;

    /// Human-readable location used in logs.
    fn describe(&self) -> String;
}

/// Reads the registry document from a file.
#[derive(Debug, Clone)]
pub struct FileRegistrySource {
    path: PathBuf,
}

impl FileRegistrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegistrySource for FileRegistrySource {
    fn fetch(&self) -> Fetching<'_> {
        Box::pin(async move {
            tokio::fs::read_to_string(&self.path)
                .await
                .registry_context(self.path.display())
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Serves a document held in memory. Handy for bundled registries and tests.
#[derive(Debug, Clone)]
pub struct StaticRegistrySource {
    document: String,
}

impl StaticRegistrySource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl RegistrySource for StaticRegistrySource {
    fn fetch(&self) -> Fetching<'_> {
        let document = self.document.clone();
        Box::pin(async move { Ok(document) })
    }

    fn describe(&self) -> String {
        "<static>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_defaults_to_root() {
        let feed = RegistryFeed::parse(
            r#"{"registry":[{"host":"btrll.com","name":"opt","value":"1","company":"BrightRoll"}]}"#,
        )
        .unwrap();
        let entries = feed.into_entries().unwrap();
        assert_eq!(entries[0].path, "/");
        assert_eq!(entries[0].company.as_deref(), Some("BrightRoll"));
    }

    #[test]
    fn test_missing_collection() {
        let feed = RegistryFeed::parse(r#"{"policies":[]}"#).unwrap();
        assert_eq!(
            feed.into_entries(),
            Err(OptOutError::RegistryMissingCollection)
        );
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            RegistryFeed::parse("[1, 2"),
            Err(OptOutError::RegistryParse(_))
        ));
    }

    #[test]
    fn test_placeholder_detection() {
        let entry = FeedEntry {
            host: "host".into(),
            name: "name".into(),
            value: "value".into(),
            path: "/".into(),
            company: None,
        };
        assert!(entry.is_placeholder());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let source = FileRegistrySource::new("/nonexistent/registry.json");
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, OptOutError::RegistryUnavailable { .. }));
    }
}
