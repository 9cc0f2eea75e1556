//! Base types and error handling.
//!
//! Provides the crate-wide error type and helpers shared by every module:
//! - [`OptOutError`](opterror::OptOutError): Registry, cookie-store and configuration failures
//! - [`context`]: Extension traits that attach context to foreign errors

pub mod context;
pub mod opterror;

#[cfg(test)]
mod tests;
