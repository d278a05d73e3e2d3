//! Proxy Probe - Bulk Proxy Validator
//!
//! Parses proxy lists in several formats, probes every proxy against an echo
//! service with bounded concurrency, and classifies each outcome.

pub mod error;
pub mod proxy;
pub mod tui;

pub use error::SetupError;
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
