//! # optoutkeeper
//!
//! A cookie-policy reconciliation engine that keeps advertising opt-out
//! cookies in place across many third-party domains.
//!
//! Sites regularly delete or overwrite the opt-out cookies a user has
//! chosen. `optoutkeeper` holds a registry of the cookies that must exist,
//! classifies every observed cookie mutation against it, and re-asserts the
//! desired state without reacting to its own writes.
//!
//! ## Features
//!
//! - **Policy Registry**: Domain-indexed opt-out policies with suffix lookup
//! - **Classification**: Valid / invalid / irrelevant verdicts per cookie
//! - **Mutation Locks**: Suppresses feedback loops from the store's own change events
//! - **Reconciliation**: Startup sweep plus incremental correction with deferred recreation
//! - **In-memory Store**: A Chrome-like cookie store for embedding and tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use optoutkeeper::cookies::monster::CookieMonster;
//! use optoutkeeper::policy::feed::FileRegistrySource;
//! use optoutkeeper::reconcile::config::EngineConfig;
//! use optoutkeeper::service::OptOutService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), optoutkeeper::base::opterror::OptOutError> {
//!     let store = CookieMonster::new();
//!     let service = OptOutService::new(store, EngineConfig::default());
//!     let driver = service.init(&FileRegistrySource::new("registry.json")).await?;
//!     driver.run_until(tokio::signal::ctrl_c()).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error types and context helpers
//! - [`cookies`] - Cookie representation, store capability, in-memory store
//! - [`policy`] - Registry feed, policy registry and cookie classification
//! - [`reconcile`] - Mutation locks and the reconciliation engine
//! - [`service`] - Startup and event-loop driver

pub mod base;
pub mod cookies;
pub mod policy;
pub mod reconcile;
pub mod service;
