//! Proxy validation engine
//!
//! This module provides functionality for:
//! - Parsing proxy lines (scheme://[USER:PASS@]HOST:PORT, HOST:PORT, HOST:PORT:USER:PASS)
//! - Probing each proxy against an echo service with a per-probe timeout
//! - Running probes with a bounded number of simultaneous workers
//! - Partitioning classified results into working and failed sets

pub mod checker;
pub mod models;
pub mod parser;
pub mod report;
pub mod scheduler;
pub mod summary;

pub use checker::{probe, EchoEndpoint, ProbeConfig, ProbeExecutor};
pub use models::{
    Credentials, OutcomeKind, ParseFailure, ProbeOutcome, ProbeResult, ProbeSubject,
    ProxyDescriptor, Scheme, SchemeOrigin,
};
pub use parser::ProxyParser;
pub use scheduler::{Progress, Scheduler};
pub use summary::{aggregate, RunSummary};
