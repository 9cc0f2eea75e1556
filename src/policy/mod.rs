//! Opt-out policies.
//!
//! - [`feed`] - The raw registry document and where it comes from
//! - [`registry`] - Domain-indexed policy lookup
//! - [`classifier`] - Valid / invalid / irrelevant verdicts for observed cookies

pub mod classifier;
pub mod feed;
pub mod registry;
