mod fake_proxy;

use fake_proxy::{closed_port, Behavior, FakeProxy};
use proxy_probe::{
    aggregate, probe, EchoEndpoint, OutcomeKind, ProbeConfig, ProbeExecutor, ProbeOutcome,
    ProxyParser, Scheduler,
};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TARGET: &str = "http://echo.test/ip";

fn target() -> EchoEndpoint {
    EchoEndpoint::new(TARGET, "origin").expect("valid echo target")
}

fn echo(body: &str) -> Behavior {
    Behavior::Respond {
        status: 200,
        body: body.to_string(),
    }
}

#[tokio::test]
async fn test_mixed_list_end_to_end() {
    let good = FakeProxy::start(echo(r#"{"origin":"9.9.9.9"}"#)).await;
    let dead_port = closed_port().await;

    let lines = vec![
        good.url(),
        "bad-line".to_string(),
        format!("127.0.0.1:{}", dead_port),
    ];

    let config = ProbeConfig::new()
        .with_worker_limit(2)
        .with_timeout(Duration::from_secs(5))
        .with_target(target());
    let scheduler = Scheduler::from_config(&config).unwrap();
    let executor = ProbeExecutor::from_config(&config);

    let mut progress = Vec::new();
    let results = scheduler
        .run_lines(lines, |d| executor.probe(d), |p| progress.push(p.index))
        .await;
    assert_eq!(progress, vec![1, 2, 3]);

    let summary = aggregate(results);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.working, 1);
    assert_eq!(summary.failed, 2);

    let working = &summary.working_results[0];
    assert_eq!(working.subject.raw_source(), good.url());
    match &working.outcome {
        ProbeOutcome::Success { observed_ip, .. } => {
            assert_eq!(observed_ip.as_deref(), Some("9.9.9.9"))
        }
        other => panic!("expected success, got {:?}", other),
    }

    assert_eq!(summary.count(OutcomeKind::InvalidFormat), 1);
    assert_eq!(summary.count(OutcomeKind::ConnectionError), 1);
    let dead = summary
        .failed_results
        .iter()
        .find(|r| r.kind() == OutcomeKind::ConnectionError)
        .unwrap();
    assert_eq!(dead.subject.raw_source(), format!("127.0.0.1:{}", dead_port));
}

#[tokio::test]
async fn test_silent_proxy_times_out() {
    let silent = FakeProxy::start(Behavior::Silent).await;
    let descriptor = ProxyParser::parse_line(&silent.url()).unwrap();
    let timeout = Duration::from_millis(300);

    let start = Instant::now();
    let result = probe(descriptor, &target(), timeout).await;
    let elapsed = start.elapsed();

    assert_eq!(result.outcome, ProbeOutcome::Timeout);
    assert!(elapsed >= timeout);
    assert!(
        elapsed < timeout + Duration::from_millis(1500),
        "probe overran its deadline: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_non_2xx_is_http_error() {
    let proxy = FakeProxy::start(Behavior::Respond {
        status: 503,
        body: "unavailable".to_string(),
    })
    .await;
    let descriptor = ProxyParser::parse_line(&proxy.url()).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert_eq!(result.outcome, ProbeOutcome::HttpError { status_code: 503 });
}

#[tokio::test]
async fn test_unparseable_body_is_partial_success() {
    let proxy = FakeProxy::start(echo("<html>welcome</html>")).await;
    let descriptor = ProxyParser::parse_line(&proxy.url()).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert!(result.is_working());
    match result.outcome {
        ProbeOutcome::Success { observed_ip, .. } => assert!(observed_ip.is_none()),
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_credentials_reach_the_proxy() {
    let proxy = FakeProxy::start(echo(r#"{"origin":"9.9.9.9"}"#)).await;
    let line = format!("127.0.0.1:{}:alice:s3cr3t", proxy.port());
    let descriptor = ProxyParser::parse_line(&line).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert!(result.is_working(), "{:?}", result.outcome);

    let requests = proxy.requests();
    assert_eq!(requests.len(), 1);
    let head = requests[0].to_lowercase();
    assert!(head.starts_with("get http://echo.test/ip"), "{}", head);
    assert!(head.contains("proxy-authorization: basic ywxpy2u6cznjcjn0"), "{}", head);
}

#[tokio::test]
async fn test_streamed_run_matches_collected_run() {
    let good = FakeProxy::start(echo(r#"{"origin":"9.9.9.9"}"#)).await;
    let lines = vec![good.url(), "not a proxy".to_string(), good.url()];

    let scheduler = Scheduler::new(2).unwrap();
    let executor = Arc::new(ProbeExecutor::new(target(), Duration::from_secs(5)));
    let mut rx = scheduler.spawn_stream(lines, move |d| {
        let executor = Arc::clone(&executor);
        async move { executor.probe(d).await }
    });

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }

    let summary = aggregate(results);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.working, 2);
    assert_eq!(summary.count(OutcomeKind::InvalidFormat), 1);
}

#[tokio::test]
async fn test_refused_socks5_proxy_is_connection_error() {
    let port = closed_port().await;
    let descriptor = ProxyParser::parse_line(&format!("socks5://127.0.0.1:{}", port)).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert_eq!(result.kind(), OutcomeKind::ConnectionError, "{:?}", result.outcome);
}

#[tokio::test]
async fn test_socks5_against_http_server_is_proxy_error() {
    let server = FakeProxy::start(Behavior::Raw(
        "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    ))
    .await;
    let descriptor = ProxyParser::parse_line(&server.socks5_url()).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert_eq!(result.kind(), OutcomeKind::ProxyError, "{:?}", result.outcome);

    // the SOCKS5 greeting starts with the protocol version byte
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with('\u{5}'), "{:?}", requests[0]);
}

#[tokio::test]
async fn test_rejected_tunnel_is_proxy_error() {
    let proxy = FakeProxy::start(Behavior::Respond {
        status: 407,
        body: String::new(),
    })
    .await;
    let descriptor = ProxyParser::parse_line(&proxy.url()).unwrap();
    let https_target = EchoEndpoint::new("https://echo.test/ip", "origin").unwrap();

    let result = probe(descriptor, &https_target, Duration::from_secs(5)).await;
    assert_eq!(result.kind(), OutcomeKind::ProxyError, "{:?}", result.outcome);

    let requests = proxy.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("CONNECT echo.test:443"), "{}", requests[0]);
}

#[tokio::test]
async fn test_proxy_hanging_up_is_connection_error() {
    let proxy = FakeProxy::start(Behavior::Hangup).await;
    let descriptor = ProxyParser::parse_line(&proxy.url()).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert_eq!(result.kind(), OutcomeKind::ConnectionError, "{:?}", result.outcome);
}

#[tokio::test]
async fn test_garbled_reply_is_connection_error() {
    let proxy = FakeProxy::start(Behavior::Raw("garbage garbage\r\n\r\n".to_string())).await;
    let descriptor = ProxyParser::parse_line(&proxy.url()).unwrap();

    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert_eq!(result.kind(), OutcomeKind::ConnectionError, "{:?}", result.outcome);
}

#[tokio::test]
async fn test_finished_check_logs_latency() {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let proxy = FakeProxy::start(echo(r#"{"origin":"9.9.9.9"}"#)).await;
    let descriptor = ProxyParser::parse_line(&proxy.url()).unwrap();
    let result = probe(descriptor, &target(), Duration::from_secs(5)).await;
    assert!(result.is_working(), "{:?}", result.outcome);

    let logs = capture.text();
    assert!(logs.contains("probe finished"), "{}", logs);
    assert!(logs.contains("outcome=SUCCESS"), "{}", logs);
    assert!(logs.contains("latency_ms="), "{}", logs);
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
