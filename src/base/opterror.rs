use thiserror::Error;

/// Cookie-store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    GetAll,
    Get,
    Set,
    Remove,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreOp::GetAll => "getAll",
            StoreOp::Get => "get",
            StoreOp::Set => "set",
            StoreOp::Remove => "remove",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum OptOutError {
    // Registry Errors
    #[error("Registry feed {location} unavailable: {reason}")]
    RegistryUnavailable { location: String, reason: String },
    #[error("Registry feed is malformed: {0}")]
    RegistryParse(String),
    #[error("Registry feed doesn't contain a `registry` collection")]
    RegistryMissingCollection,

    // Cookie Store Errors
    #[error("Cookie store {op} failed: {reason}")]
    CookieStore { op: StoreOp, reason: String },
    #[error("Invalid cookie URL: {0}")]
    InvalidCookieUrl(String),

    // Configuration Errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OptOutError {
    /// Create a cookie-store failure for `op`.
    pub fn store(op: StoreOp, reason: impl Into<String>) -> Self {
        OptOutError::CookieStore {
            op,
            reason: reason.into(),
        }
    }

    /// Create a registry-unavailable error.
    pub fn registry_unavailable(location: impl Into<String>, reason: impl Into<String>) -> Self {
        OptOutError::RegistryUnavailable {
            location: location.into(),
            reason: reason.into(),
        }
    }
}
