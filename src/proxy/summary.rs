//! Result aggregation

use crate::proxy::models::{OutcomeKind, ProbeResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate over every result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
    /// Count per outcome tag; tags with no results are left out
    pub by_kind: BTreeMap<OutcomeKind, usize>,
    pub working_results: Vec<ProbeResult>,
    pub failed_results: Vec<ProbeResult>,
}

impl RunSummary {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Share of working proxies, `0.0` for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.working as f64 / self.total as f64
        }
    }
}

/// Partition results into working and failed in one pass
///
/// A result is working iff its outcome is `Success`, whether or not the
/// observed IP could be read. Relative order within each partition is kept.
pub fn aggregate(results: Vec<ProbeResult>) -> RunSummary {
    let total = results.len();
    let mut by_kind = BTreeMap::new();
    let mut working_results = Vec::new();
    let mut failed_results = Vec::new();

    for result in results {
        *by_kind.entry(result.kind()).or_insert(0) += 1;
        if result.is_working() {
            working_results.push(result);
        } else {
            failed_results.push(result);
        }
    }

    RunSummary {
        total,
        working: working_results.len(),
        failed: failed_results.len(),
        by_kind,
        working_results,
        failed_results,
    }
}
