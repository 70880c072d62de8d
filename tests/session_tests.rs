//! Session scenarios driven through stub engines and resolvers

use async_trait::async_trait;
use portprobe::{
    network::reason,
    scanner::HostState,
    PortState, ProbeEngine, ProbeResult, Protocol, ScanError, ScanSession, SessionState, TargetResolver,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reports every probed port open, counting calls
#[derive(Default)]
struct OpenEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl ProbeEngine for OpenEngine {
    async fn probe(&self, _address: IpAddr, port: u16, protocol: Protocol, _timeout: Duration) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProbeResult::new(port, protocol, PortState::Open).with_reason(reason::SYN_ACK)
    }

    fn name(&self) -> &str {
        "open"
    }
}

/// Never answers within any reasonable time
struct HangingEngine;

#[async_trait]
impl ProbeEngine for HangingEngine {
    async fn probe(&self, _address: IpAddr, port: u16, protocol: Protocol, timeout: Duration) -> ProbeResult {
        tokio::time::sleep(timeout).await;
        ProbeResult::new(port, protocol, PortState::Filtered)
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// Every port filtered
struct FilteredEngine;

#[async_trait]
impl ProbeEngine for FilteredEngine {
    async fn probe(&self, _address: IpAddr, port: u16, protocol: Protocol, _timeout: Duration) -> ProbeResult {
        ProbeResult::new(port, protocol, PortState::Filtered).with_reason(reason::NO_RESPONSE)
    }

    fn name(&self) -> &str {
        "filtered"
    }
}

/// Knows `localhost` and nothing else
struct LoopbackResolver;

#[async_trait]
impl TargetResolver for LoopbackResolver {
    async fn resolve(&self, host_spec: &str) -> portprobe::Result<Vec<IpAddr>> {
        match host_spec {
            "localhost" => Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]),
            other => Err(ScanError::resolution(other, "no such host")),
        }
    }
}

/// Takes a long time to answer anything
struct SlowResolver;

#[async_trait]
impl TargetResolver for SlowResolver {
    async fn resolve(&self, _host_spec: &str) -> portprobe::Result<Vec<IpAddr>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
    }
}

fn session(target: &str, engine: Arc<dyn ProbeEngine>) -> ScanSession {
    ScanSession::new(target, &["tcp"])
        .unwrap()
        .with_engine(engine)
        .unwrap()
        .with_resolver(Arc::new(LoopbackResolver))
        .unwrap()
}

#[tokio::test]
async fn test_localhost_two_open_ports() {
    let mut session = session("localhost", Arc::new(OpenEngine::default()));
    session.set_ports("22,80".parse().unwrap()).unwrap();

    let report = session.run().await.unwrap();

    assert_eq!(report.hosts().len(), 1);
    let host = &report.hosts()[0];
    assert!(host.address().is_loopback());
    assert_eq!(host.status().state, HostState::Up);
    assert_eq!(host.status().reason, reason::SYN_ACK);

    let ports: Vec<(u16, PortState)> = host.results().iter().map(|r| (r.port(), r.state())).collect();
    assert_eq!(ports, vec![(22, PortState::Open), (80, PortState::Open)]);
    assert_eq!(report.summary().total, 1);
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn test_unresolvable_target() {
    let mut session = session("nonexistent.invalid", Arc::new(OpenEngine::default()));

    let err = session.run().await.unwrap_err();
    assert!(matches!(err, ScanError::Resolution { ref host, .. } if host == "nonexistent.invalid"));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.report().is_none());
}

#[tokio::test]
async fn test_invalid_protocol_is_rejected_before_probing() {
    let engine = Arc::new(OpenEngine::default());

    let err = ScanSession::new("localhost", &["foo"]).unwrap_err();
    assert_eq!(err, ScanError::InvalidProtocol("foo".to_string()));
    assert_eq!(err.to_string(), "Invalid protocol foo");

    let mut session = session("localhost", engine.clone());
    assert!(session.set_protocols(&["tcp", "foo"]).is_err());
    assert_eq!(session.protocols(), &[Protocol::Tcp]);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_deadline_shorter_than_probe_timeout() {
    let mut session = session("localhost", Arc::new(HangingEngine));
    session.set_ports("1-20".parse().unwrap()).unwrap();
    session.set_concurrency(4).unwrap();
    session.set_timeout(Duration::from_secs(60)).unwrap();
    session.set_deadline(Some(Duration::from_millis(200))).unwrap();

    let started = Instant::now();
    let report = session.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let results = report.hosts()[0].results();
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|r| r.state() == PortState::Unknown));
    assert!(results.iter().all(|r| r.reason() == Some(reason::CANCELLED)));
    assert_eq!(report.hosts()[0].status().state, HostState::Down);
}

#[tokio::test]
async fn test_deadline_includes_target_resolution() {
    let engine = Arc::new(OpenEngine::default());
    let mut session = ScanSession::new("slow.example", &["tcp"])
        .unwrap()
        .with_engine(engine.clone())
        .unwrap()
        .with_resolver(Arc::new(SlowResolver))
        .unwrap();
    session.set_ports("80".parse().unwrap()).unwrap();
    session.set_deadline(Some(Duration::from_millis(200))).unwrap();

    let started = Instant::now();
    let err = session.run().await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(err, ScanError::Resolution { .. }));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_token_stops_scan() {
    let mut session = session("localhost", Arc::new(HangingEngine));
    session.set_ports("1-10".parse().unwrap()).unwrap();
    session.set_timeout(Duration::from_secs(60)).unwrap();

    let token = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("cancelled scan must finish")
        .unwrap();
    assert_eq!(report.stats().unknown, 10);
}

#[tokio::test]
async fn test_filtered_host_is_down() {
    let mut session = session("localhost", Arc::new(FilteredEngine));
    session.set_ports("22,80,443".parse().unwrap()).unwrap();

    let report = session.run().await.unwrap();
    let host = &report.hosts()[0];
    assert_eq!(host.status().state, HostState::Down);
    assert_eq!(host.status().reason, reason::NO_RESPONSE);
    assert_eq!(report.summary().down, 1);
}

#[tokio::test]
async fn test_second_run_is_already_run() {
    let mut session = session("localhost", Arc::new(OpenEngine::default()));
    session.set_ports("80".parse().unwrap()).unwrap();
    session.run().await.unwrap();

    assert_eq!(session.run().await.unwrap_err(), ScanError::AlreadyRun);
    assert_eq!(session.add_protocol("udp"), Err(ScanError::AlreadyRun));
    assert!(session.into_report().is_some());
}

#[tokio::test]
async fn test_random_order_keeps_report_sorted() {
    let engine = Arc::new(OpenEngine::default());
    let mut session = session("localhost", engine.clone());
    session.set_ports("1-100".parse().unwrap()).unwrap();
    session.set_scan_order(portprobe::utils::scan_options::ScanOrder::Random).unwrap();

    let report = session.run().await.unwrap();
    let ports: Vec<u16> = report.hosts()[0].results().iter().map(|r| r.port()).collect();
    assert_eq!(ports, (1..=100).collect::<Vec<u16>>());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 100);
}
