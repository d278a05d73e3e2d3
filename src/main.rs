use anyhow::Result;
use clap::{Parser, Subcommand};
use proxy_probe::{
    aggregate,
    report::{render_line, render_summary, write_json, write_lines},
    tui::RunView,
    EchoEndpoint, ProbeConfig, ProbeExecutor, ProbeResult, ProxyParser, RunSummary, Scheduler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Validate a bulk list of proxies against an IP echo service
#[derive(Parser)]
#[command(name = "proxy-probe")]
#[command(about = "Validate a bulk list of proxies against an IP echo service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every proxy in a list and save the results
    Check {
        /// Input file containing proxies, one per line
        #[arg(default_value = "proxies.txt")]
        input: PathBuf,
        /// Output file for working proxies
        #[arg(short, long, default_value = "working_proxies_output.txt")]
        working_out: PathBuf,
        /// Output file for failed proxies
        #[arg(short, long, default_value = "failed_proxies_output.txt")]
        failed_out: PathBuf,
        /// Also write the full summary as JSON
        #[arg(long)]
        json: Option<PathBuf>,
        /// Maximum number of simultaneous probes
        #[arg(short = 'n', long, default_value = "50")]
        workers: usize,
        /// Timeout per probe in seconds
        #[arg(long, default_value = "15")]
        timeout: u64,
        /// Echo service URL to probe through each proxy
        #[arg(long, default_value = "http://httpbin.org/ip")]
        target: String,
        /// JSON field of the echo response holding the observed IP
        #[arg(long, default_value = "origin")]
        ip_field: String,
        /// User-Agent header for probes
        #[arg(long)]
        user_agent: Option<String>,
        /// Show a live terminal view instead of progress lines
        #[arg(long)]
        tui: bool,
    },
    /// Show how each line of a list parses, without probing
    Parse {
        /// Input file containing proxies, one per line
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Check {
            input,
            working_out,
            failed_out,
            json,
            workers,
            timeout,
            target,
            ip_field,
            user_agent,
            tui,
        } => {
            let mut config = ProbeConfig::new()
                .with_worker_limit(workers)
                .with_timeout(Duration::from_secs(timeout))
                .with_target(EchoEndpoint::new(&target, ip_field)?);
            if let Some(user_agent) = user_agent {
                config = config.with_user_agent(user_agent);
            }
            let scheduler = Scheduler::from_config(&config)?;

            let lines = ProxyParser::load_file(&input)?;
            if lines.is_empty() {
                println!(
                    "No proxies found in {:?}. Please ensure the file contains proxies and is not empty.",
                    input
                );
                return Ok(());
            }

            println!("Loaded {} proxies from {:?}. Starting test...", lines.len(), input);
            println!(
                "Workers: {} | Timeout: {}s | Target: {}",
                scheduler.worker_limit(),
                timeout,
                config.target.url()
            );

            let executor = ProbeExecutor::from_config(&config);
            let results = if tui {
                match run_with_view(&scheduler, executor, lines).await? {
                    Some(results) => results,
                    None => return Ok(()),
                }
            } else {
                scheduler
                    .run_lines(
                        lines,
                        |d| executor.probe(d),
                        |p| println!("[{}/{}] {}", p.index, p.total, render_line(p.result)),
                    )
                    .await
            };

            let summary = aggregate(results);
            println!("\n--- Test Complete ---");
            println!("{}", render_summary(&summary));
            save_results(&summary, &working_out, &failed_out, json.as_deref());
            println!("\nDone.");
        }
        Commands::Parse { input } => {
            let lines = ProxyParser::load_file(&input)?;
            let mut parsed = 0;

            for result in ProxyParser::parse_lines(&lines) {
                match result {
                    Ok(descriptor) => {
                        parsed += 1;
                        let auth = if descriptor.credentials.is_some() { " (auth)" } else { "" };
                        println!("{:<18} {}{}", descriptor.scheme_label(), descriptor, auth);
                    }
                    Err(failure) => {
                        warn!(line = %failure.raw_source, reason = %failure.reason, "unparseable proxy line");
                        println!("{:<18} {}", "INVALID_FORMAT", failure);
                    }
                }
            }

            println!("\nParsed {} of {} lines from {:?}", parsed, lines.len(), input);
        }
    }

    Ok(())
}

/// Run through the live view; `None` when the operator quit before the end
async fn run_with_view(
    scheduler: &Scheduler,
    executor: ProbeExecutor,
    lines: Vec<String>,
) -> Result<Option<Vec<ProbeResult>>> {
    let total = lines.len();
    let executor = Arc::new(executor);
    let rx = scheduler.spawn_stream(lines, move |d| {
        let executor = Arc::clone(&executor);
        async move { executor.probe(d).await }
    });

    let outcome = RunView::new(total).run(rx).await?;
    if !outcome.completed {
        println!(
            "Run cancelled after {} of {} proxies; no result files written.",
            outcome.results.len(),
            total
        );
        return Ok(None);
    }
    Ok(Some(outcome.results))
}

fn save_results(summary: &RunSummary, working_out: &Path, failed_out: &Path, json: Option<&Path>) {
    println!("\nSaving results...");

    match write_lines(working_out, &summary.working_results) {
        Ok(()) => println!("Working proxies saved to {:?}", working_out),
        Err(e) => error!("Error saving working proxies: {:#}", e),
    }
    match write_lines(failed_out, &summary.failed_results) {
        Ok(()) => println!("Failed proxies saved to {:?}", failed_out),
        Err(e) => error!("Error saving failed proxies: {:#}", e),
    }
    if let Some(path) = json {
        match write_json(path, summary) {
            Ok(()) => println!("Summary saved to {:?}", path),
            Err(e) => error!("Error saving JSON summary: {:#}", e),
        }
    }

    info!(
        total = summary.total,
        working = summary.working,
        failed = summary.failed,
        "results saved"
    );
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
