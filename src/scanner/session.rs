//! Scan session: owns the configuration and runs one scan end to end

use crate::config::ScanConfig;
use crate::core::{NetworkProbeEngine, ProbeEngine, SystemResolver, TargetResolver};
use crate::error::ScanError;
use crate::network::{parse_protocols, Protocol};
use crate::scanner::engine::{ProbeSpace, ScanScheduler, SchedulerOptions};
use crate::scanner::report::ReportBuilder;
use crate::scanner::{HostResult, ScanReport, UnresolvedTarget};
use crate::utils::port_parser::{enumerate_for, PortSpec};
use crate::utils::scan_options::ScanOrder;
use crate::utils::target_parser::ScanTarget;
use crate::utils::Logger;
use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`ScanSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepting configuration
    Created,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Running => write!(f, "running"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// One port scan, from configuration to report.
///
/// ```no_run
/// # async fn demo() -> portprobe::Result<()> {
/// let mut session = portprobe::ScanSession::new("localhost", &["tcp"])?;
/// session.set_ports("22,80".parse()?)?;
/// let report = session.run().await?;
/// println!("{} host(s) up", report.summary().up);
/// # Ok(())
/// # }
/// ```
pub struct ScanSession {
    config: ScanConfig,
    targets: Vec<ScanTarget>,
    engine: Arc<dyn ProbeEngine>,
    resolver: Arc<dyn TargetResolver>,
    state: SessionState,
    report: Option<ScanReport>,
    failure: Option<ScanError>,
    cancel: CancellationToken,
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("config", &self.config)
            .field("targets", &self.targets)
            .field("engine", &self.engine.name())
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl ScanSession {
    /// Session for one target and the named protocols (`"tcp"`, `"udp"`)
    pub fn new<S: AsRef<str>>(target: &str, protocols: &[S]) -> crate::Result<Self> {
        let protocols = parse_protocols(protocols)?;
        if protocols.is_empty() {
            return Err(ScanError::Config("At least one protocol is required".to_string()));
        }

        let mut config = ScanConfig::new(target);
        config.protocols = protocols;
        Self::from_config(config)
    }

    /// Session from a full configuration, validated up front
    pub fn from_config(config: ScanConfig) -> crate::Result<Self> {
        config.validate()?;
        let targets = config.targets.iter().map(ScanTarget::new).collect();

        Ok(Self {
            config,
            targets,
            engine: NetworkProbeEngine::shared(),
            resolver: Arc::new(SystemResolver::new()),
            state: SessionState::Created,
            report: None,
            failure: None,
            cancel: CancellationToken::new(),
        })
    }

    fn ensure_created(&self) -> crate::Result<()> {
        match self.state {
            SessionState::Created => Ok(()),
            _ => Err(ScanError::AlreadyRun),
        }
    }

    /// Replace the probe engine
    pub fn with_engine(mut self, engine: Arc<dyn ProbeEngine>) -> crate::Result<Self> {
        self.ensure_created()?;
        self.engine = engine;
        Ok(self)
    }

    /// Replace the target resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn TargetResolver>) -> crate::Result<Self> {
        self.ensure_created()?;
        self.resolver = resolver;
        Ok(self)
    }

    pub fn add_target(&mut self, target: &str) -> crate::Result<()> {
        self.ensure_created()?;
        if target.trim().is_empty() {
            return Err(ScanError::Config("Target cannot be empty".to_string()));
        }
        self.config.targets.push(target.trim().to_string());
        self.targets.push(ScanTarget::new(target));
        Ok(())
    }

    /// Add a protocol by name; already configured protocols are ignored
    pub fn add_protocol(&mut self, protocol: &str) -> crate::Result<()> {
        self.ensure_created()?;
        let protocol: Protocol = protocol.parse()?;
        self.check_ports(&self.config.ports, protocol)?;
        if !self.config.protocols.contains(&protocol) {
            self.config.protocols.push(protocol);
        }
        Ok(())
    }

    pub fn set_protocols<S: AsRef<str>>(&mut self, protocols: &[S]) -> crate::Result<()> {
        self.ensure_created()?;
        let protocols = parse_protocols(protocols)?;
        if protocols.is_empty() {
            return Err(ScanError::Config("At least one protocol is required".to_string()));
        }
        for protocol in &protocols {
            self.check_ports(&self.config.ports, *protocol)?;
        }
        self.config.protocols = protocols;
        Ok(())
    }

    pub fn set_ports(&mut self, ports: PortSpec) -> crate::Result<()> {
        self.ensure_created()?;
        for protocol in &self.config.protocols {
            self.check_ports(&ports, *protocol)?;
        }
        self.config.ports = ports;
        Ok(())
    }

    pub fn exclude_ports(&mut self, ports: PortSpec) -> crate::Result<()> {
        self.ensure_created()?;
        for protocol in &self.config.protocols {
            enumerate_for(&ports, *protocol)?;
        }
        self.config.exclude_ports = Some(ports);
        Ok(())
    }

    pub fn set_concurrency(&mut self, concurrency: usize) -> crate::Result<()> {
        self.ensure_created()?;
        if concurrency == 0 {
            return Err(ScanError::Config("Concurrency must be greater than 0".to_string()));
        }
        self.config.concurrency = concurrency;
        Ok(())
    }

    /// Set the per-probe timeout
    pub fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
        self.ensure_created()?;
        if timeout.is_zero() {
            return Err(ScanError::Config("Timeout must be greater than 0".to_string()));
        }
        self.config = std::mem::take(&mut self.config).with_timeout(timeout);
        Ok(())
    }

    /// Set the whole-scan time limit; `None` removes it
    pub fn set_deadline(&mut self, deadline: Option<Duration>) -> crate::Result<()> {
        self.ensure_created()?;
        if deadline.map_or(false, |deadline| deadline.is_zero()) {
            return Err(ScanError::Config("Deadline must be greater than 0".to_string()));
        }
        self.config = std::mem::take(&mut self.config).with_deadline(deadline);
        Ok(())
    }

    pub fn set_retries(&mut self, retries: u32, delay: Duration) -> crate::Result<()> {
        self.ensure_created()?;
        self.config = std::mem::take(&mut self.config).with_retries(retries, delay);
        Ok(())
    }

    pub fn set_scan_order(&mut self, scan_order: ScanOrder) -> crate::Result<()> {
        self.ensure_created()?;
        self.config.scan_order = scan_order;
        Ok(())
    }

    fn check_ports(&self, ports: &PortSpec, protocol: Protocol) -> crate::Result<()> {
        enumerate_for(ports, protocol)?;
        Ok(())
    }

    /// First target, as given
    pub fn target(&self) -> Option<&str> {
        self.targets.first().map(ScanTarget::spec)
    }

    pub fn targets(&self) -> &[ScanTarget] {
        &self.targets
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.config.protocols
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The report, once the scan completed
    pub fn report(&self) -> Option<&ScanReport> {
        self.report.as_ref()
    }

    pub fn into_report(self) -> Option<ScanReport> {
        self.report
    }

    /// Why the scan failed, if it did
    pub fn failure(&self) -> Option<&ScanError> {
        self.failure.as_ref()
    }

    /// Token that stops a running scan; probes not yet finished come back `Unknown`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the scan. A session runs at most once.
    pub async fn run(&mut self) -> crate::Result<&ScanReport> {
        self.ensure_created()?;
        self.state = SessionState::Running;

        match self.execute().await {
            Ok(report) => {
                self.state = SessionState::Completed;
                let report: &ScanReport = self.report.insert(report);
                Ok(report)
            }
            Err(e) => {
                log::warn!("scan failed: {}", e);
                self.state = SessionState::Failed;
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> crate::Result<ScanReport> {
        self.config.validate()?;
        if self.targets.is_empty() {
            return Err(ScanError::Config("No targets specified".to_string()));
        }

        // Enumerate before resolving: bad port specs fail without network I/O
        let mut ports = Vec::with_capacity(self.config.protocols.len());
        for protocol in &self.config.protocols {
            ports.push((*protocol, self.config.ports_for(*protocol)?));
        }

        let started = Utc::now();
        let clock = tokio::time::Instant::now();

        // The deadline covers resolution as well as probing
        let deadline = self.config.deadline_duration();
        let (hosts, unresolved) = match deadline {
            Some(limit) => tokio::time::timeout(limit, self.resolve_targets())
                .await
                .map_err(|_| {
                    ScanError::resolution(self.config.targets.join(" "), "scan deadline reached during resolution")
                })??,
            None => self.resolve_targets().await?,
        };

        let addresses: Vec<_> = hosts.iter().map(HostResult::address).collect();
        let space = ProbeSpace::build(&addresses, &ports).ordered(self.config.scan_order);
        Logger::log_scan_start(&self.config.targets.join(" "), space.len(), self.engine.name());

        let options = SchedulerOptions::from_config(&self.config)
            .with_deadline(deadline.map(|limit| limit.saturating_sub(clock.elapsed())));
        let scheduler = ScanScheduler::new(self.engine.clone(), options);
        let hosts = collect_outcomes(scheduler, space, self.cancel.clone(), hosts).await;

        let report = ReportBuilder::new(&self.config, started)
            .unresolved(unresolved)
            .build(hosts, Utc::now());

        Logger::log_scan_complete(report.elapsed(), report.open_port_count(), report.stats().total_probes);
        Ok(report)
    }

    /// Resolve all targets concurrently.
    ///
    /// Fails only when nothing resolved; otherwise unresolvable targets are
    /// logged and returned next to the hosts to scan.
    async fn resolve_targets(&mut self) -> crate::Result<(Vec<HostResult>, Vec<UnresolvedTarget>)> {
        let resolver = self.resolver.as_ref();
        let outcomes = join_all(self.targets.iter_mut().map(|target| async move {
            let resolved = target.resolve(resolver).await.map(|_| ());
            (target, resolved)
        }))
        .await;

        let mut hosts = Vec::new();
        let mut unresolved = Vec::new();
        let mut first_error = None;

        for (target, resolved) in outcomes {
            match resolved {
                Ok(()) => {
                    for address in target.scan_addresses() {
                        hosts.push(
                            HostResult::new(target.spec(), address).with_other_addresses(target.other_addresses()),
                        );
                    }
                }
                Err(e) => {
                    log::warn!("skipping target {}: {}", target.spec(), e);
                    unresolved.push(UnresolvedTarget::new(target.spec(), &e));
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if hosts.is_empty() => Err(e),
            _ => Ok((hosts, unresolved)),
        }
    }
}

/// The collection step: the only writer of the per-host accumulators
async fn collect_outcomes(
    scheduler: ScanScheduler,
    space: ProbeSpace,
    cancel: CancellationToken,
    mut hosts: Vec<HostResult>,
) -> Vec<HostResult> {
    let mut outcomes = scheduler.run(space, cancel);
    while let Some(outcome) = outcomes.next().await {
        match hosts.get_mut(outcome.task.host) {
            Some(host) => host.push(outcome.result),
            None => log::error!("outcome for unknown host index {}", outcome.task.host),
        }
    }
    hosts
}
