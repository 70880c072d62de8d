//! Scanner module: the scheduler, the report builder, the session façade
//! and the result model they share

pub mod engine;
pub mod report;
pub mod session;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::network::{reason, PortState, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

pub use engine::{ProbeOutcome, ProbeSpace, ProbeStream, ProbeTask, ScanScheduler, SchedulerOptions};
pub use report::ReportBuilder;
pub use session::{ScanSession, SessionState};

/// Whether a host answered at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::Up => write!(f, "up"),
            HostState::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    pub state: HostState,
    pub reason: String,
}

impl HostStatus {
    pub fn up(reason: impl Into<String>) -> Self {
        Self {
            state: HostState::Up,
            reason: reason.into(),
        }
    }

    pub fn down() -> Self {
        Self {
            state: HostState::Down,
            reason: reason::NO_RESPONSE.to_string(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == HostState::Up
    }
}

/// Everything learned about one scanned address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    address: IpAddr,
    /// Addresses the target also resolved to but that were not scanned
    other_addresses: Vec<IpAddr>,
    /// Target specification this address came from
    target: String,
    status: HostStatus,
    results: Vec<ProbeResult>,
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
}

impl HostResult {
    pub fn new(target: impl Into<String>, address: IpAddr) -> Self {
        Self {
            address,
            other_addresses: Vec::new(),
            target: target.into(),
            status: HostStatus::down(),
            results: Vec::new(),
            started: None,
            finished: None,
        }
    }

    pub fn with_other_addresses(mut self, other_addresses: Vec<IpAddr>) -> Self {
        self.other_addresses = other_addresses;
        self
    }

    /// Append a completed probe and widen the host's time window to cover it
    pub fn push(&mut self, result: ProbeResult) {
        let finished = result.timestamp();
        let started = chrono::Duration::from_std(result.response_time())
            .map(|elapsed| finished - elapsed)
            .unwrap_or(finished);

        self.started = Some(self.started.map_or(started, |current| current.min(started)));
        self.finished = Some(self.finished.map_or(finished, |current| current.max(finished)));
        self.results.push(result);
    }

    /// Sort results by (port, protocol) and decide the host status.
    ///
    /// The host is up as soon as one probe came back open or closed.
    pub(crate) fn finalize(&mut self) {
        self.results
            .sort_by(|a, b| (a.port(), a.protocol()).cmp(&(b.port(), b.protocol())));

        self.status = self
            .results
            .iter()
            .find(|result| result.state().is_responsive())
            .map(|result| {
                HostStatus::up(
                    result
                        .reason()
                        .map(str::to_string)
                        .unwrap_or_else(|| result.state().to_string()),
                )
            })
            .unwrap_or_else(HostStatus::down);
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn other_addresses(&self) -> &[IpAddr] {
        &self.other_addresses
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> &HostStatus {
        &self.status
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    /// Start of the first probe against this host
    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.started
    }

    /// Completion of the last probe against this host
    pub fn finished(&self) -> Option<DateTime<Utc>> {
        self.finished
    }

    pub fn ports_in_state(&self, state: PortState) -> Vec<u16> {
        self.results
            .iter()
            .filter(|result| result.state() == state)
            .map(ProbeResult::port)
            .collect()
    }

    pub fn open_ports(&self) -> Vec<u16> {
        self.ports_in_state(PortState::Open)
    }
}

/// Host counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub up: usize,
    pub down: usize,
    pub total: usize,
}

/// Aggregate probe statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_probes: usize,
    pub open: usize,
    pub closed: usize,
    pub filtered: usize,
    pub open_filtered: usize,
    pub unknown: usize,
    /// Response times cover completed probes only, not `Unknown` ones
    pub min_response_time: Duration,
    pub avg_response_time: Duration,
    pub max_response_time: Duration,
}

impl ScanStats {
    pub fn from_hosts(hosts: &[HostResult]) -> Self {
        let mut stats = Self::default();
        let mut timed = 0u32;
        let mut total_response_time = Duration::ZERO;

        for result in hosts.iter().flat_map(|host| host.results()) {
            stats.total_probes += 1;
            match result.state() {
                PortState::Open => stats.open += 1,
                PortState::Closed => stats.closed += 1,
                PortState::Filtered => stats.filtered += 1,
                PortState::OpenFiltered => stats.open_filtered += 1,
                PortState::Unknown => {
                    stats.unknown += 1;
                    continue;
                }
            }

            let response_time = result.response_time();
            if timed == 0 || response_time < stats.min_response_time {
                stats.min_response_time = response_time;
            }
            stats.max_response_time = stats.max_response_time.max(response_time);
            total_response_time += response_time;
            timed += 1;
        }

        if timed > 0 {
            stats.avg_response_time = total_response_time / timed;
        }
        stats
    }
}

/// A target that could not be resolved and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedTarget {
    pub target: String,
    pub cause: String,
}

impl UnresolvedTarget {
    pub fn new(target: impl Into<String>, error: &ScanError) -> Self {
        let cause = match error {
            ScanError::Resolution { cause, .. } => cause.clone(),
            other => other.to_string(),
        };
        Self {
            target: target.into(),
            cause,
        }
    }
}

/// Final, immutable result of a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    args: String,
    config: ScanConfig,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    elapsed: Duration,
    hosts: Vec<HostResult>,
    summary: ScanSummary,
    stats: ScanStats,
    unresolved: Vec<UnresolvedTarget>,
}

impl ScanReport {
    /// Nmap-style echo of the scan arguments
    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn finished(&self) -> DateTime<Utc> {
        self.finished
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn hosts(&self) -> &[HostResult] {
        &self.hosts
    }

    pub fn host(&self, address: IpAddr) -> Option<&HostResult> {
        self.hosts.iter().find(|host| host.address() == address)
    }

    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn unresolved(&self) -> &[UnresolvedTarget] {
        &self.unresolved
    }

    pub fn open_port_count(&self) -> usize {
        self.stats.open
    }

    /// Get scan rate in probes per second
    pub fn scan_rate(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.stats.total_probes as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}
