//! Setup errors
//!
//! Per-proxy failures never show up here: they are recorded as
//! [`ProbeOutcome`](crate::proxy::ProbeOutcome) values. These errors are
//! raised before any probe starts and abort the run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot read proxy list {path:?}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker limit must be a positive integer, got {0}")]
    InvalidWorkerLimit(usize),

    #[error("probe timeout must be greater than zero")]
    InvalidTimeout,

    #[error("invalid echo target {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },
}
