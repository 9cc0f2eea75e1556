//! Reconciliation: keeping the cookie store in line with the registry.
//!
//! - [`mutationlock`] - Outstanding corrective writes, keyed by (name, domain)
//! - [`config`] - Engine tuning knobs
//! - [`engine`] - Full sweep and incremental change handling

pub mod config;
pub mod engine;
pub mod mutationlock;
