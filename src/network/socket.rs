//! Unprivileged socket probes: TCP connect and UDP send-and-wait

use crate::network::protocol::udp_payload;
use crate::network::{reason, PortState, ProbeResult, Protocol};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

const UDP_RECV_BUFFER: usize = 1500;

/// Render a local socket error as a probe reason
fn error_reason(e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::ConnectionReset => "reset".to_string(),
        _ => e.to_string(),
    }
}

/// TCP connect scanner for non-raw socket scanning
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectScanner;

impl TcpConnectScanner {
    pub fn new() -> Self {
        Self
    }

    /// Complete a full handshake with `target:port`.
    ///
    /// A connection is `open`, a refusal is `closed`, silence until the
    /// timeout is `filtered`. Any other socket error (no route, network
    /// down, ...) is also `filtered`, with the error kept as the reason.
    pub async fn scan_port(&self, target: IpAddr, port: u16, probe_timeout: Duration) -> ProbeResult {
        let addr = SocketAddr::new(target, port);
        let start_time = Instant::now();

        let (state, why) = match timeout(probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                (PortState::Open, reason::SYN_ACK.to_string())
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                (PortState::Closed, reason::CONN_REFUSED.to_string())
            }
            Ok(Err(e)) => (PortState::Filtered, error_reason(&e)),
            Err(_) => (PortState::Filtered, reason::NO_RESPONSE.to_string()),
        };

        log::trace!("tcp {}: {} ({})", addr, state, why);

        ProbeResult::new(port, Protocol::Tcp, state)
            .with_reason(why)
            .with_response_time(start_time.elapsed())
    }
}

/// UDP scanner for UDP port scanning
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpScanner;

impl UdpScanner {
    pub fn new() -> Self {
        Self
    }

    /// Send a probe datagram to `target:port` and wait for an answer.
    ///
    /// A reply is `open`, an ICMP port-unreachable (reported by the kernel
    /// as a refused connection on the connected socket) is `closed` and
    /// silence is `open|filtered`: without a reply UDP cannot tell an open
    /// port from a dropped probe.
    pub async fn scan_port(&self, target: IpAddr, port: u16, probe_timeout: Duration) -> ProbeResult {
        let addr = SocketAddr::new(target, port);
        let start_time = Instant::now();

        let (state, why) = match self.exchange(addr, probe_timeout).await {
            Ok(Some(bytes)) => {
                log::trace!("udp {}: {} byte reply", addr, bytes);
                (PortState::Open, reason::UDP_RESPONSE.to_string())
            }
            Ok(None) => (PortState::OpenFiltered, reason::NO_RESPONSE.to_string()),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                (PortState::Closed, reason::PORT_UNREACH.to_string())
            }
            Err(e) => (PortState::Filtered, error_reason(&e)),
        };

        log::trace!("udp {}: {} ({})", addr, state, why);

        ProbeResult::new(port, Protocol::Udp, state)
            .with_reason(why)
            .with_response_time(start_time.elapsed())
    }

    /// Returns the reply size, or `None` when nothing arrived in time
    async fn exchange(&self, addr: SocketAddr, probe_timeout: Duration) -> io::Result<Option<usize>> {
        let local_addr = match addr.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(addr).await?;

        let deadline = Instant::now() + probe_timeout;
        match timeout(probe_timeout, socket.send(udp_payload(addr.port()))).await {
            Ok(sent) => {
                sent?;
            }
            Err(_) => return Ok(None),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut buf = [0u8; UDP_RECV_BUFFER];
        match timeout(remaining, socket.recv(&mut buf)).await {
            Ok(received) => received.map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = TcpConnectScanner::new()
            .scan_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Duration::from_secs(2))
            .await;

        assert_eq!(result.state(), PortState::Open);
        assert_eq!(result.reason(), Some(reason::SYN_ACK));
        assert_eq!(result.protocol(), Protocol::Tcp);
    }

    #[tokio::test]
    async fn test_tcp_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TcpConnectScanner::new()
            .scan_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Duration::from_secs(2))
            .await;

        assert_eq!(result.state(), PortState::Closed);
        assert_eq!(result.reason(), Some(reason::CONN_REFUSED));
    }

    #[tokio::test]
    async fn test_udp_reply_is_open() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            if let Ok((_, peer)) = server.recv_from(&mut buf).await {
                let _ = server.send_to(b"pong", peer).await;
            }
        });

        let result = UdpScanner::new()
            .scan_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Duration::from_secs(2))
            .await;

        assert_eq!(result.state(), PortState::Open);
        assert_eq!(result.reason(), Some(reason::UDP_RESPONSE));
    }

    #[tokio::test]
    async fn test_udp_silence_is_open_filtered() {
        // Bound but never answers
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let result = UdpScanner::new()
            .scan_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Duration::from_millis(200))
            .await;

        assert_eq!(result.state(), PortState::OpenFiltered);
        assert_eq!(result.reason(), Some(reason::NO_RESPONSE));
        drop(server);
    }

    #[tokio::test]
    async fn test_udp_closed_port() {
        let port = {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            socket.local_addr().unwrap().port()
        };

        let result = UdpScanner::new()
            .scan_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, Duration::from_secs(1))
            .await;

        assert_eq!(result.state(), PortState::Closed);
        assert_eq!(result.reason(), Some(reason::PORT_UNREACH));
        assert_eq!(result.protocol(), Protocol::Udp);
    }

    #[tokio::test]
    async fn test_unreachable_is_filtered_with_reason() {
        let result = TcpConnectScanner::new()
            .scan_port(IpAddr::V4(Ipv4Addr::BROADCAST), 80, Duration::from_secs(2))
            .await;

        assert_eq!(result.state(), PortState::Filtered);
        let why = result.reason().unwrap();
        assert_ne!(why, reason::NO_RESPONSE);
        assert!(!why.is_empty());
    }

    #[test]
    fn test_error_reason_keeps_local_error_text() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(error_reason(&denied), denied.to_string());

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(error_reason(&reset), "reset");
    }
}
