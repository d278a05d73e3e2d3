//! Bounded-concurrency scheduling of probes
//!
//! At most `worker_limit` probes are in flight at any moment. Lines that fail
//! to parse are turned into results right away and never take a worker slot.
//! Results come back in completion order; each carries its subject, so it can
//! always be matched to its input line.

use crate::error::SetupError;
use crate::proxy::checker::ProbeConfig;
use crate::proxy::models::{ParseFailure, ProbeResult, ProxyDescriptor};
use crate::proxy::parser::ProxyParser;
use futures::stream::{self, Stream, StreamExt};
use futures::pin_mut;
use std::future::Future;
use std::num::NonZeroUsize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-result progress signal
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// 1-based position in completion order
    pub index: usize,
    pub total: usize,
    pub result: &'a ProbeResult,
}

/// Runs probes with a fixed upper bound on simultaneous in-flight probes
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    worker_limit: NonZeroUsize,
}

impl Scheduler {
    pub fn new(worker_limit: usize) -> Result<Self, SetupError> {
        NonZeroUsize::new(worker_limit)
            .map(|worker_limit| Self { worker_limit })
            .ok_or(SetupError::InvalidWorkerLimit(worker_limit))
    }

    /// Validate the whole config and build a scheduler from it
    pub fn from_config(config: &ProbeConfig) -> Result<Self, SetupError> {
        config.validate()?;
        Self::new(config.worker_limit)
    }

    pub fn worker_limit(&self) -> usize {
        self.worker_limit.get()
    }

    /// Probe every descriptor and collect the results in completion order
    pub async fn run_all<F, Fut, P>(
        &self,
        descriptors: Vec<ProxyDescriptor>,
        probe_fn: F,
        on_progress: P,
    ) -> Vec<ProbeResult>
    where
        F: Fn(ProxyDescriptor) -> Fut,
        Fut: Future<Output = ProbeResult>,
        P: FnMut(Progress<'_>),
    {
        let items = descriptors.into_iter().map(Ok).collect();
        self.run_items(items, probe_fn, on_progress).await
    }

    /// Parse raw lines, then probe every descriptor
    ///
    /// Each unparseable line yields one `InvalidFormat` result.
    pub async fn run_lines<F, Fut, P>(
        &self,
        lines: Vec<String>,
        probe_fn: F,
        on_progress: P,
    ) -> Vec<ProbeResult>
    where
        F: Fn(ProxyDescriptor) -> Fut,
        Fut: Future<Output = ProbeResult>,
        P: FnMut(Progress<'_>),
    {
        let items = ProxyParser::parse_lines(&lines);
        self.run_items(items, probe_fn, on_progress).await
    }

    async fn run_items<F, Fut, P>(
        &self,
        items: Vec<Result<ProxyDescriptor, ParseFailure>>,
        probe_fn: F,
        mut on_progress: P,
    ) -> Vec<ProbeResult>
    where
        F: Fn(ProxyDescriptor) -> Fut,
        Fut: Future<Output = ProbeResult>,
        P: FnMut(Progress<'_>),
    {
        let total = items.len();
        info!(total, worker_limit = self.worker_limit(), "starting probe run");

        let results_stream = schedule(items, self.worker_limit(), probe_fn);
        pin_mut!(results_stream);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = results_stream.next().await {
            on_progress(Progress {
                index: results.len() + 1,
                total,
                result: &result,
            });
            results.push(result);
        }

        info!(total, "probe run drained");
        results
    }

    /// Run the same schedule on a background task, delivering results over a channel
    ///
    /// Dropping the receiver cancels the run: no further probes start and the
    /// in-flight ones are dropped along with their connections.
    pub fn spawn_stream<F, Fut>(&self, lines: Vec<String>, probe_fn: F) -> mpsc::Receiver<ProbeResult>
    where
        F: Fn(ProxyDescriptor) -> Fut + Send + 'static,
        Fut: Future<Output = ProbeResult> + Send + 'static,
    {
        let worker_limit = self.worker_limit();
        let (tx, rx) = mpsc::channel(worker_limit);

        tokio::spawn(async move {
            let items = ProxyParser::parse_lines(&lines);
            let total = items.len();
            info!(total, worker_limit, "starting streamed probe run");

            let results_stream = schedule(items, worker_limit, probe_fn);
            pin_mut!(results_stream);

            let mut delivered = 0;
            while let Some(result) = results_stream.next().await {
                if tx.send(result).await.is_err() {
                    info!(total, delivered, "result receiver dropped, cancelling probe run");
                    return;
                }
                delivered += 1;
            }
            debug!(delivered, "all results delivered");
            info!(total, "streamed probe run drained");
        });

        rx
    }
}

/// Parse failures first (they are ready immediately), then the bounded probes
fn schedule<F, Fut>(
    items: Vec<Result<ProxyDescriptor, ParseFailure>>,
    worker_limit: usize,
    probe_fn: F,
) -> impl Stream<Item = ProbeResult>
where
    F: Fn(ProxyDescriptor) -> Fut,
    Fut: Future<Output = ProbeResult>,
{
    let mut descriptors = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for item in items {
        match item {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(failure) => {
                warn!(line = %failure.raw_source, reason = %failure.reason, "unparseable proxy line");
                rejected.push(ProbeResult::invalid_format(failure));
            }
        }
    }

    stream::iter(rejected).chain(
        stream::iter(descriptors)
            .map(probe_fn)
            .buffer_unordered(worker_limit),
    )
}
