//! Scan options: probe ordering and retry policy

use crate::error::ScanError;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    #[default]
    Serial,
    Random,
}

impl FromStr for ScanOrder {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "serial" | "seq" | "sequential" => Ok(Self::Serial),
            "random" | "rand" | "shuffle" => Ok(Self::Random),
            other => Err(ScanError::Config(format!("unknown scan order '{}'", other))),
        }
    }
}

/// Order items according to scan strategy
pub fn order<T>(mut items: Vec<T>, scan_order: ScanOrder) -> Vec<T> {
    if scan_order == ScanOrder::Random {
        items.shuffle(&mut rand::thread_rng());
    }
    items
}

/// How often a probe that got no conclusive answer is repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Total number of attempts, the first one included
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Run `operation` until `is_final` accepts its output or the policy's
/// attempts are used up. The last output is returned either way.
pub async fn retry_operation<F, Fut, T, P>(policy: RetryPolicy, mut operation: F, is_final: P) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 1;
    loop {
        let output = operation().await;
        if is_final(&output) || attempt >= policy.attempts() {
            return output;
        }

        attempt += 1;
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }
}
