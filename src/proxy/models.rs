//! Proxy data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Protocol used to talk to a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
    /// Only used for input that never became a descriptor
    Unknown,
}

impl Scheme {
    /// Map a URL scheme prefix to a known proxy scheme
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            "socks4" => Some(Scheme::Socks4),
            "socks5" => Some(Scheme::Socks5),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
            Scheme::Socks4 => write!(f, "socks4"),
            Scheme::Socks5 => write!(f, "socks5"),
            Scheme::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whether the scheme was written in the input or inferred from its shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeOrigin {
    Declared,
    Assumed,
}

/// Inline proxy credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Normalized connection descriptor for one proxy line
///
/// Only the parser builds these, so a descriptor always has a known scheme,
/// a non-empty host and a port in `1..=65535`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub scheme: Scheme,
    pub scheme_origin: SchemeOrigin,
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub raw_source: String,
}

impl ProxyDescriptor {
    /// Proxy URL without credentials, e.g. `socks5://10.0.0.1:1080`
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Reporting label in the style `HTTP`, `SOCKS5`, `HTTP_ASSUMED`, `HTTP_AUTH_ASSUMED`
    pub fn scheme_label(&self) -> String {
        let base = self.scheme.to_string().to_uppercase();
        match (self.scheme_origin, &self.credentials) {
            (SchemeOrigin::Declared, _) => base,
            (SchemeOrigin::Assumed, None) => format!("{}_ASSUMED", base),
            (SchemeOrigin::Assumed, Some(_)) => format!("{}_AUTH_ASSUMED", base),
        }
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

/// A line the parser could not turn into a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub raw_source: String,
    pub reason: String,
}

impl ParseFailure {
    pub fn new(raw_source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw_source: raw_source.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.raw_source, self.reason)
    }
}

/// What a result is about: a parsed descriptor or just the raw input line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeSubject {
    Descriptor(ProxyDescriptor),
    Unparsed { raw_source: String },
}

impl ProbeSubject {
    pub fn raw_source(&self) -> &str {
        match self {
            ProbeSubject::Descriptor(d) => &d.raw_source,
            ProbeSubject::Unparsed { raw_source } => raw_source,
        }
    }

    pub fn descriptor(&self) -> Option<&ProxyDescriptor> {
        match self {
            ProbeSubject::Descriptor(d) => Some(d),
            ProbeSubject::Unparsed { .. } => None,
        }
    }

    pub fn scheme_label(&self) -> String {
        match self {
            ProbeSubject::Descriptor(d) => d.scheme_label(),
            ProbeSubject::Unparsed { .. } => Scheme::Unknown.to_string().to_uppercase(),
        }
    }
}

/// Classified outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// 2xx from the echo target. `observed_ip` is `None` when the body did not
    /// have the expected shape.
    Success {
        observed_ip: Option<String>,
        latency: Duration,
    },
    ProxyError { detail: String },
    ConnectionError { detail: String },
    Timeout,
    HttpError { status_code: u16 },
    InvalidFormat { detail: String },
    UnknownError { detail: String },
}

impl ProbeOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ProbeOutcome::Success { .. } => OutcomeKind::Success,
            ProbeOutcome::ProxyError { .. } => OutcomeKind::ProxyError,
            ProbeOutcome::ConnectionError { .. } => OutcomeKind::ConnectionError,
            ProbeOutcome::Timeout => OutcomeKind::Timeout,
            ProbeOutcome::HttpError { .. } => OutcomeKind::HttpError,
            ProbeOutcome::InvalidFormat { .. } => OutcomeKind::InvalidFormat,
            ProbeOutcome::UnknownError { .. } => OutcomeKind::UnknownError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

/// Tag of a [`ProbeOutcome`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    ProxyError,
    ConnectionError,
    Timeout,
    HttpError,
    InvalidFormat,
    UnknownError,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 7] = [
        OutcomeKind::Success,
        OutcomeKind::ProxyError,
        OutcomeKind::ConnectionError,
        OutcomeKind::Timeout,
        OutcomeKind::HttpError,
        OutcomeKind::InvalidFormat,
        OutcomeKind::UnknownError,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "SUCCESS",
            OutcomeKind::ProxyError => "PROXY_ERROR",
            OutcomeKind::ConnectionError => "CONNECTION_ERROR",
            OutcomeKind::Timeout => "TIMEOUT",
            OutcomeKind::HttpError => "HTTP_ERROR",
            OutcomeKind::InvalidFormat => "INVALID_FORMAT",
            OutcomeKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of testing one input line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub subject: ProbeSubject,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn new(descriptor: ProxyDescriptor, outcome: ProbeOutcome) -> Self {
        Self {
            subject: ProbeSubject::Descriptor(descriptor),
            outcome,
            checked_at: Utc::now(),
        }
    }

    /// Result for a line that never reached the probe executor
    pub fn invalid_format(failure: ParseFailure) -> Self {
        Self {
            subject: ProbeSubject::Unparsed {
                raw_source: failure.raw_source,
            },
            outcome: ProbeOutcome::InvalidFormat {
                detail: failure.reason,
            },
            checked_at: Utc::now(),
        }
    }

    pub fn is_working(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }

    pub fn latency(&self) -> Option<Duration> {
        match self.outcome {
            ProbeOutcome::Success { latency, .. } => Some(latency),
            _ => None,
        }
    }
}
