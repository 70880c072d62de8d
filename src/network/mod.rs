//! Network module: protocols, port states and single-probe results

pub mod protocol;
pub mod socket;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScanError;

/// Transport protocols the engine can probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// Nmap scan-type flag for this protocol, used in argument echoes
    pub fn scan_flag(&self) -> &'static str {
        match self {
            Protocol::Tcp => "-sT",
            Protocol::Udp => "-sU",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(ScanError::InvalidProtocol(other.to_string())),
        }
    }
}

/// Parse a list of protocol names, dropping duplicates but keeping the
/// order in which they were first given.
pub fn parse_protocols<S: AsRef<str>>(names: &[S]) -> crate::Result<Vec<Protocol>> {
    let mut protocols = Vec::with_capacity(names.len());
    for name in names {
        let protocol: Protocol = name.as_ref().parse()?;
        if !protocols.contains(&protocol) {
            protocols.push(protocol);
        }
    }
    Ok(protocols)
}

/// Port state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    /// UDP probe got no answer: the port is open or the probe was dropped
    OpenFiltered,
    /// The probe was never completed (scan cancelled or deadline hit)
    Unknown,
}

impl PortState {
    /// Whether this state proves the host answered
    pub fn is_responsive(&self) -> bool {
        matches!(self, PortState::Open | PortState::Closed)
    }

    /// States that a retry could still turn into a conclusive answer
    pub fn is_silent(&self) -> bool {
        matches!(self, PortState::Filtered | PortState::OpenFiltered)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::OpenFiltered => write!(f, "open|filtered"),
            PortState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reason strings attached to probe results, following nmap's vocabulary
pub mod reason {
    pub const SYN_ACK: &str = "syn-ack";
    pub const CONN_REFUSED: &str = "conn-refused";
    pub const NO_RESPONSE: &str = "no-response";
    pub const UDP_RESPONSE: &str = "udp-response";
    pub const PORT_UNREACH: &str = "port-unreach";
    pub const CANCELLED: &str = "cancelled";
}

/// Outcome of probing one (address, port, protocol) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    port: u16,
    protocol: Protocol,
    state: PortState,
    reason: Option<String>,
    service: Option<String>,
    timestamp: DateTime<Utc>,
    response_time: Duration,
}

impl ProbeResult {
    /// Result stamped with the current time
    pub fn new(port: u16, protocol: Protocol, state: PortState) -> Self {
        Self {
            port,
            protocol,
            state,
            reason: None,
            service: None,
            timestamp: Utc::now(),
            response_time: Duration::ZERO,
        }
    }

    /// Result for a probe that never ran to completion
    pub fn unknown(port: u16, protocol: Protocol) -> Self {
        Self::new(port, protocol, PortState::Unknown).with_reason(reason::CANCELLED)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = response_time;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// When the probe finished
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn response_time(&self) -> Duration {
        self.response_time
    }
}
