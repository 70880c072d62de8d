//! portprobe - a connect-style TCP/UDP port scanning engine
//!
//! Resolves targets, enumerates ports, probes every (address, port,
//! protocol) triple over a bounded worker pool and aggregates the outcomes
//! into an immutable [`ScanReport`]. No raw sockets and no privileges needed.

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
pub mod top_ports;
pub mod utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use crate::core::{NetworkProbeEngine, ProbeEngine, SystemResolver, TargetResolver};
pub use error::ScanError;
pub use network::{PortState, ProbeResult, Protocol};
pub use scanner::{HostResult, HostState, ScanReport, ScanSession, SessionState};
pub use utils::port_parser::{PortRange, PortSpec};

pub type Result<T> = std::result::Result<T, ScanError>;
