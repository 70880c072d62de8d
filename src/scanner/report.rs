//! Report builder: turns collected host results into a [`ScanReport`]

use crate::config::ScanConfig;
use crate::scanner::{HostResult, ScanReport, ScanStats, ScanSummary, UnresolvedTarget};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Pure aggregation of a finished scan.
///
/// No clock reads and no I/O: the finish time is passed in, so the same
/// inputs always give the same report.
#[derive(Debug, Clone)]
pub struct ReportBuilder<'a> {
    config: &'a ScanConfig,
    started: DateTime<Utc>,
    unresolved: Vec<UnresolvedTarget>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(config: &'a ScanConfig, started: DateTime<Utc>) -> Self {
        Self {
            config,
            started,
            unresolved: Vec::new(),
        }
    }

    /// Targets that were skipped because they did not resolve
    pub fn unresolved(mut self, unresolved: Vec<UnresolvedTarget>) -> Self {
        self.unresolved = unresolved;
        self
    }

    /// Finalize every host and assemble the report; host order is kept
    pub fn build(self, mut hosts: Vec<HostResult>, finished: DateTime<Utc>) -> ScanReport {
        for host in &mut hosts {
            host.finalize();
        }

        let up = hosts.iter().filter(|host| host.is_up()).count();
        let summary = ScanSummary {
            up,
            down: hosts.len() - up,
            total: hosts.len(),
        };

        let elapsed = (finished - self.started).to_std().unwrap_or(Duration::ZERO);

        ScanReport {
            args: self.config.args(),
            config: self.config.clone(),
            started: self.started,
            finished,
            elapsed,
            stats: ScanStats::from_hosts(&hosts),
            hosts,
            summary,
            unresolved: self.unresolved,
        }
    }
}
