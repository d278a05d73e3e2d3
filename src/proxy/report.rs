//! Rendering and saving run results

use crate::proxy::models::{OutcomeKind, ProbeOutcome, ProbeResult};
use crate::proxy::summary::RunSummary;
use crate::Result;
use anyhow::Context;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Render one result as an operator-facing line
///
/// `KIND - SCHEME | raw line | details`
pub fn render_line(result: &ProbeResult) -> String {
    let head = format!(
        "{} - {} | {}",
        result.kind(),
        result.subject.scheme_label(),
        result.subject.raw_source()
    );

    let tail = match &result.outcome {
        ProbeOutcome::Success {
            observed_ip,
            latency,
        } => format!(
            "Public IP: {} | Latency: {:.2}s",
            observed_ip.as_deref().unwrap_or("N/A"),
            latency.as_secs_f64()
        ),
        ProbeOutcome::ProxyError { detail } => {
            format!("Check proxy configuration or if it's alive: {}", detail)
        }
        ProbeOutcome::ConnectionError { detail } => {
            format!("Proxy likely dead or blocked: {}", detail)
        }
        ProbeOutcome::Timeout => "Proxy too slow or unresponsive".to_string(),
        ProbeOutcome::HttpError { status_code } => {
            let reason = reqwest::StatusCode::from_u16(*status_code)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown");
            format!("Status Code: {} | Reason: {}", status_code, reason)
        }
        ProbeOutcome::InvalidFormat { detail } => detail.clone(),
        ProbeOutcome::UnknownError { detail } => {
            format!("An unexpected error occurred: {}", detail)
        }
    };

    format!("{} | {}", head, tail)
}

/// Render the closing totals block
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = format!(
        "Total Proxies Tested: {}\nWorking Proxies: {}\nFailed Proxies: {}",
        summary.total, summary.working, summary.failed
    );

    let breakdown: Vec<String> = OutcomeKind::ALL
        .iter()
        .filter(|kind| **kind != OutcomeKind::Success)
        .filter_map(|kind| match summary.count(*kind) {
            0 => None,
            n => Some(format!("  {}: {}", kind, n)),
        })
        .collect();
    if !breakdown.is_empty() {
        out.push('\n');
        out.push_str(&breakdown.join("\n"));
    }

    out
}

/// Write one rendered line per result
pub fn write_lines<P: AsRef<Path>>(path: P, results: &[ProbeResult]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for result in results {
        writeln!(writer, "{}", render_line(result))
            .with_context(|| format!("writing {:?}", path))?;
    }
    writer.flush().with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

/// Write the whole summary as pretty JSON
pub fn write_json<P: AsRef<Path>>(path: P, summary: &RunSummary) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}
