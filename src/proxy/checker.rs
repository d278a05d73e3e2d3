//! Probe executor: routes one request through a proxy and classifies the outcome

use crate::error::SetupError;
use crate::proxy::models::{ProbeOutcome, ProbeResult, ProxyDescriptor, Scheme};
use reqwest::{Client, Proxy as ReqwestProxy, Url};
use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default timeout for each probe in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default number of simultaneous probes
const DEFAULT_WORKER_LIMIT: usize = 50;

/// Default echo service
const DEFAULT_TARGET_URL: &str = "http://httpbin.org/ip";

/// Field of the echo body carrying the observed IP
const DEFAULT_IP_FIELD: &str = "origin";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Remote service that reports the apparent source IP of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoEndpoint {
    url: Url,
    ip_field: String,
}

impl EchoEndpoint {
    /// Build an endpoint from an http(s) URL and the JSON field holding the IP
    pub fn new(url: &str, ip_field: impl Into<String>) -> Result<Self, SetupError> {
        let parsed = Url::parse(url).map_err(|e| SetupError::InvalidTarget {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SetupError::InvalidTarget {
                url: url.to_string(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        let ip_field = ip_field.into();
        if ip_field.trim().is_empty() {
            return Err(SetupError::InvalidTarget {
                url: url.to_string(),
                reason: "empty IP field name".to_string(),
            });
        }

        Ok(Self {
            url: parsed,
            ip_field,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn ip_field(&self) -> &str {
        &self.ip_field
    }

    /// Pull the observed IP out of an echo response body
    ///
    /// Returns `None` when the body is not a JSON object with a non-empty
    /// string under the configured field.
    pub fn extract_ip(&self, body: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        value
            .get(&self.ip_field)?
            .as_str()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
    }
}

impl Default for EchoEndpoint {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_TARGET_URL).expect("Invalid default target URL"),
            ip_field: DEFAULT_IP_FIELD.to_string(),
        }
    }
}

/// Configuration for a validation run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Upper bound on simultaneous probes
    pub worker_limit: usize,
    /// Wall-clock bound for each probe
    pub timeout: Duration,
    /// Echo service every probe targets
    pub target: EchoEndpoint,
    /// User-Agent header sent with each probe
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            worker_limit: DEFAULT_WORKER_LIMIT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            target: EchoEndpoint::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_limit(mut self, worker_limit: usize) -> Self {
        self.worker_limit = worker_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_target(mut self, target: EchoEndpoint) -> Self {
        self.target = target;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Reject settings that would make the run meaningless
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.worker_limit == 0 {
            return Err(SetupError::InvalidWorkerLimit(self.worker_limit));
        }
        if self.timeout.is_zero() {
            return Err(SetupError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Issues probes through proxies against one echo endpoint
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    target: EchoEndpoint,
    timeout: Duration,
    user_agent: String,
}

impl ProbeExecutor {
    pub fn new(target: EchoEndpoint, timeout: Duration) -> Self {
        Self {
            target,
            timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            target: config.target.clone(),
            timeout: config.timeout,
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe one descriptor. Never fails: every fault becomes an outcome.
    pub async fn probe(&self, descriptor: ProxyDescriptor) -> ProbeResult {
        let outcome = self.run_probe(&descriptor).await;
        let latency_ms = match &outcome {
            ProbeOutcome::Success { latency, .. } => Some(latency.as_millis() as u64),
            _ => None,
        };
        debug!(
            proxy = %descriptor,
            outcome = %outcome.kind(),
            latency_ms,
            "probe finished"
        );
        ProbeResult::new(descriptor, outcome)
    }

    async fn run_probe(&self, descriptor: &ProxyDescriptor) -> ProbeOutcome {
        let proxy = match proxy_for(descriptor) {
            Ok(proxy) => proxy,
            Err(detail) => return ProbeOutcome::ProxyError { detail },
        };

        let client = match self.create_client(proxy) {
            Ok(client) => client,
            Err(e) => {
                return ProbeOutcome::UnknownError {
                    detail: TransportFault::from_reqwest(&e).detail,
                }
            }
        };

        // The client timeout alone does not cover every stage, so the whole
        // exchange runs under one deadline. Dropping the future on expiry
        // drops the connection with it.
        match tokio::time::timeout(self.timeout, self.exchange(&client)).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Err(e)) => classify(&TransportFault::from_reqwest(&e)),
            Ok(Ok(Exchange::Status(status_code))) => ProbeOutcome::HttpError { status_code },
            Ok(Ok(Exchange::Body { body, latency })) => ProbeOutcome::Success {
                observed_ip: self.target.extract_ip(&body),
                latency,
            },
        }
    }

    /// Send the request and read the full body. Latency covers send to last byte.
    async fn exchange(&self, client: &Client) -> reqwest::Result<Exchange> {
        let start = Instant::now();
        let response = client.get(self.target.url().clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(Exchange::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(Exchange::Body {
            body: body.to_vec(),
            latency: start.elapsed(),
        })
    }

    /// Create a reqwest client routed through the proxy
    fn create_client(&self, proxy: ReqwestProxy) -> reqwest::Result<Client> {
        Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .user_agent(self.user_agent.as_str())
            .build()
    }
}

enum Exchange {
    Status(u16),
    Body { body: Vec<u8>, latency: Duration },
}

/// Probe a descriptor against a target with the default User-Agent
pub async fn probe(descriptor: ProxyDescriptor, target: &EchoEndpoint, timeout: Duration) -> ProbeResult {
    ProbeExecutor::new(target.clone(), timeout)
        .probe(descriptor)
        .await
}

/// Build the reqwest proxy for a descriptor, used for both http and https targets
///
/// SOCKS5 proxies get the `socks5h` scheme so the proxy resolves the target;
/// a local DNS failure for the echo host would otherwise be blamed on the proxy.
fn proxy_for(descriptor: &ProxyDescriptor) -> Result<ReqwestProxy, String> {
    let scheme = match descriptor.scheme {
        Scheme::Socks5 => "socks5h".to_string(),
        other => other.to_string(),
    };

    let url = format!("{}://{}:{}", scheme, descriptor.host, descriptor.port);
    let mut url = Url::parse(&url).map_err(|e| format!("invalid proxy url: {}", e))?;
    if let Some(credentials) = &descriptor.credentials {
        url.set_username(&credentials.username)
            .map_err(|_| "proxy url cannot carry credentials".to_string())?;
        url.set_password(Some(&credentials.password))
            .map_err(|_| "proxy url cannot carry credentials".to_string())?;
    }

    ReqwestProxy::all(url.as_str()).map_err(|e| format!("invalid proxy: {}", e))
}

/// Transport failure reduced to the facts classification needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TransportFault {
    pub timed_out: bool,
    pub connect: bool,
    pub io_kind: Option<io::ErrorKind>,
    /// The peer closed or garbled the HTTP exchange (hyper incomplete/parse error)
    pub broken_exchange: bool,
    pub detail: String,
}

impl TransportFault {
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        let mut io_kind = None;
        let mut broken_exchange = false;
        let mut top = err.to_string();
        if let Some(url) = err.url() {
            top = top.replace(&format!(" for url ({})", url), "");
        }
        let mut messages = vec![top];

        let mut source = err.source();
        while let Some(cause) = source {
            if io_kind.is_none() {
                io_kind = cause.downcast_ref::<io::Error>().map(io::Error::kind);
            }
            if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
                broken_exchange |= hyper_err.is_incomplete_message() || hyper_err.is_parse();
            }
            let message = cause.to_string();
            if !messages.iter().any(|m| m.contains(&message)) {
                messages.push(message);
            }
            source = cause.source();
        }

        Self {
            timed_out: err.is_timeout(),
            connect: err.is_connect(),
            io_kind,
            broken_exchange,
            detail: messages.join(": "),
        }
    }
}

const CONNECTION_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no route to host",
    "network is unreachable",
    "host is unreachable",
    // SOCKS connector wrapping a failed TCP connect to the proxy
    "failed to create underlying connection",
    "connection closed before message completed",
];

const PROXY_MARKERS: &[&str] = &["tunnel", "socks", "proxy"];

/// Map a transport fault onto exactly one outcome
///
/// Order: timeout, then plain transport failures reaching the proxy, then
/// failures negotiating with the proxy, then anything else.
pub(crate) fn classify(fault: &TransportFault) -> ProbeOutcome {
    if fault.timed_out || fault.io_kind == Some(io::ErrorKind::TimedOut) {
        return ProbeOutcome::Timeout;
    }

    let detail = fault.detail.clone();
    let lower = fault.detail.to_lowercase();

    let transport_kind = matches!(
        fault.io_kind,
        Some(
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::BrokenPipe
        )
    );
    if transport_kind || fault.broken_exchange || CONNECTION_MARKERS.iter().any(|m| lower.contains(m)) {
        return ProbeOutcome::ConnectionError { detail };
    }

    if PROXY_MARKERS.iter().any(|m| lower.contains(m)) {
        return ProbeOutcome::ProxyError { detail };
    }

    if fault.connect {
        return ProbeOutcome::ConnectionError { detail };
    }

    ProbeOutcome::UnknownError { detail }
}
