//! Scan scheduler: drives a probe engine over the probe space
//!
//! A supervisor task spawns a fixed pool of workers on a [`JoinSet`]. Workers
//! pull tasks from a shared queue, probe them and send every outcome over a
//! bounded channel; the consumer sees that channel as a [`ProbeStream`].
//! Cancelling the token (directly or through the deadline) turns every
//! in-flight and remaining task into an `Unknown` outcome.

use crate::config::ScanConfig;
use crate::core::ProbeEngine;
use crate::network::{PortState, ProbeResult, Protocol};
use crate::utils::port_parser::PortRange;
use crate::utils::scan_options::{order, retry_operation, RetryPolicy, ScanOrder};
use futures::{FutureExt, Stream};
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use std::vec;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Reason attached to a result whose probe panicked
const PROBE_FAILED: &str = "probe-failed";

/// One (address, port, protocol) triple, tagged with the host it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTask {
    /// Index of the owning host in the session's host list
    pub host: usize,
    pub address: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
}

/// The full set of probes a scan will run
#[derive(Debug, Clone, Default)]
pub struct ProbeSpace {
    tasks: Vec<ProbeTask>,
}

impl ProbeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cartesian product of hosts × protocols × ports.
    ///
    /// Host `i` in `hosts` is tagged with index `i`. Tasks are laid out host
    /// by host, protocol by protocol, ports ascending.
    pub fn build(hosts: &[IpAddr], ports: &[(Protocol, PortRange)]) -> Self {
        let mut space = Self::new();
        for (host, address) in hosts.iter().enumerate() {
            for (protocol, range) in ports {
                space.add(host, *address, *protocol, range);
            }
        }
        space
    }

    pub fn add(&mut self, host: usize, address: IpAddr, protocol: Protocol, ports: &PortRange) {
        self.tasks.extend(ports.iter().map(|port| ProbeTask {
            host,
            address,
            port,
            protocol,
        }));
    }

    /// Reorder the space according to `scan_order`
    pub fn ordered(self, scan_order: ScanOrder) -> Self {
        Self {
            tasks: order(self.tasks, scan_order),
        }
    }

    pub fn tasks(&self) -> &[ProbeTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A finished probe, whatever its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub task: ProbeTask,
    pub result: ProbeResult,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Worker pool size, the only concurrency control
    pub concurrency: usize,
    /// Per-probe timeout
    pub timeout: Duration,
    /// Whole-scan time limit
    pub deadline: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: 100,
            timeout: Duration::from_millis(1000),
            deadline: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            timeout: config.timeout_duration(),
            deadline: config.deadline_duration(),
            retry: config.retry_policy(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcomes of a running scan, in completion order.
///
/// Ends once every task of the probe space has produced exactly one
/// outcome. Dropping the stream cancels the probes still running.
pub struct ProbeStream {
    receiver: mpsc::Receiver<ProbeOutcome>,
    total: usize,
    _cancel_on_drop: DropGuard,
}

impl ProbeStream {
    /// Number of outcomes the stream will yield
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Stream for ProbeStream {
    type Item = ProbeOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.total))
    }
}

type TaskQueue = Arc<Mutex<vec::IntoIter<ProbeTask>>>;

fn next_task(queue: &TaskQueue) -> Option<ProbeTask> {
    match queue.lock() {
        Ok(mut tasks) => tasks.next(),
        Err(poisoned) => poisoned.into_inner().next(),
    }
}

/// Runs probe spaces over a worker pool
#[derive(Clone)]
pub struct ScanScheduler {
    engine: Arc<dyn ProbeEngine>,
    options: SchedulerOptions,
}

impl ScanScheduler {
    pub fn new(engine: Arc<dyn ProbeEngine>, options: SchedulerOptions) -> Self {
        Self { engine, options }
    }

    /// Start probing `space`; must be called inside a Tokio runtime.
    ///
    /// `cancel` stops the scan early. The deadline, if any, cancels a child
    /// of `cancel`, so the caller's token is never cancelled by the scheduler.
    pub fn run(&self, space: ProbeSpace, cancel: CancellationToken) -> ProbeStream {
        let total = space.len();
        let workers = self.options.concurrency.max(1).min(total);
        let capacity = self.options.concurrency.clamp(1, 1024);
        let (sender, receiver) = mpsc::channel(capacity);

        let token = cancel.child_token();
        let queue: TaskQueue = Arc::new(Mutex::new(space.tasks.into_iter()));

        log::debug!(
            "scheduling {} probes on {} workers ({} engine)",
            total,
            workers,
            self.engine.name()
        );

        tokio::spawn(supervise(
            self.engine.clone(),
            self.options.clone(),
            queue,
            sender,
            token.clone(),
            workers,
        ));

        ProbeStream {
            receiver,
            total,
            _cancel_on_drop: token.drop_guard(),
        }
    }
}

async fn supervise(
    engine: Arc<dyn ProbeEngine>,
    options: SchedulerOptions,
    queue: TaskQueue,
    sender: mpsc::Sender<ProbeOutcome>,
    token: CancellationToken,
    workers: usize,
) {
    let deadline_timer = options.deadline.map(|deadline| {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    log::warn!("scan deadline of {:?} reached, abandoning remaining probes", deadline);
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    });

    let mut pool = JoinSet::new();
    for id in 0..workers {
        pool.spawn(worker(
            id,
            engine.clone(),
            options.clone(),
            queue.clone(),
            sender.clone(),
            token.clone(),
        ));
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            log::error!("probe worker failed: {}", e);
        }
    }

    // Only reachable with tasks left if a worker died; still account for them
    while let Some(task) = next_task(&queue) {
        let outcome = ProbeOutcome {
            task,
            result: ProbeResult::unknown(task.port, task.protocol),
        };
        if sender.send(outcome).await.is_err() {
            break;
        }
    }

    if let Some(timer) = deadline_timer {
        timer.abort();
    }
}

async fn worker(
    id: usize,
    engine: Arc<dyn ProbeEngine>,
    options: SchedulerOptions,
    queue: TaskQueue,
    sender: mpsc::Sender<ProbeOutcome>,
    token: CancellationToken,
) {
    let mut probed = 0usize;
    while let Some(task) = next_task(&queue) {
        let result = if token.is_cancelled() {
            ProbeResult::unknown(task.port, task.protocol)
        } else {
            tokio::select! {
                biased;
                _ = token.cancelled() => ProbeResult::unknown(task.port, task.protocol),
                result = probe(engine.as_ref(), &options, task) => result,
            }
        };

        probed += 1;
        if sender.send(ProbeOutcome { task, result }).await.is_err() {
            // Receiver gone: nobody is collecting any more
            token.cancel();
            break;
        }
    }
    log::trace!("worker {} finished after {} probes", id, probed);
}

async fn probe(engine: &dyn ProbeEngine, options: &SchedulerOptions, task: ProbeTask) -> ProbeResult {
    let timeout = options.timeout;
    let attempts = retry_operation(
        options.retry,
        move || engine.probe(task.address, task.port, task.protocol, timeout),
        |result: &ProbeResult| !result.state().is_silent(),
    );

    match AssertUnwindSafe(attempts).catch_unwind().await {
        Ok(result) => {
            log::debug!(
                "{}:{}/{} {}",
                task.address,
                task.port,
                task.protocol,
                result.state()
            );
            result
        }
        Err(_) => {
            log::error!("probe of {}:{}/{} panicked", task.address, task.port, task.protocol);
            ProbeResult::new(task.port, task.protocol, PortState::Unknown).with_reason(PROBE_FAILED)
        }
    }
}
