// portprobe probe engine trait
// Capability boundary between the scheduler and the network

use crate::network::protocol::ServiceDatabase;
use crate::network::socket::{TcpConnectScanner, UdpScanner};
use crate::network::{PortState, ProbeResult, Protocol};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Performs one network check and classifies the port.
///
/// Probes never fail: refusals, timeouts and socket errors are all
/// reported through [`ProbeResult::state`] and [`ProbeResult::reason`].
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    async fn probe(&self, address: IpAddr, port: u16, protocol: Protocol, timeout: Duration) -> ProbeResult;

    /// Engine name, for logs
    fn name(&self) -> &str;
}

/// Default engine: TCP connect and UDP send-and-wait, no privileges needed
#[derive(Debug, Clone, Default)]
pub struct NetworkProbeEngine {
    tcp_scanner: TcpConnectScanner,
    udp_scanner: UdpScanner,
    service_db: ServiceDatabase,
}

impl NetworkProbeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn ProbeEngine> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ProbeEngine for NetworkProbeEngine {
    async fn probe(&self, address: IpAddr, port: u16, protocol: Protocol, timeout: Duration) -> ProbeResult {
        let result = match protocol {
            Protocol::Tcp => self.tcp_scanner.scan_port(address, port, timeout).await,
            Protocol::Udp => self.udp_scanner.scan_port(address, port, timeout).await,
        };

        if result.state() == PortState::Open {
            if let Some(service) = self.service_db.lookup(port, protocol) {
                return result.with_service(service);
            }
        }
        result
    }

    fn name(&self) -> &str {
        "connect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_gets_service_hint() {
        // Port 80 is usually privileged, so check the hint path with whatever
        // port the listener gets and compare against the table directly.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let engine = NetworkProbeEngine::new();
        let result = engine
            .probe(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Protocol::Tcp, Duration::from_secs(2))
            .await;

        assert_eq!(result.state(), PortState::Open);
        assert_eq!(result.service(), ServiceDatabase::new().get_tcp_service(port));
    }

    #[tokio::test]
    async fn test_closed_port_has_no_service_hint() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let engine = NetworkProbeEngine::new();
        let result = engine
            .probe(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Protocol::Tcp, Duration::from_secs(2))
            .await;

        assert_eq!(result.state(), PortState::Closed);
        assert!(result.service().is_none());
        assert_eq!(engine.name(), "connect");
    }
}
