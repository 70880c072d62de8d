//! Target parsing utilities for IPv6 and CIDR support
//!
//! A target specification is an IPv4/IPv6 literal, a CIDR block or a
//! hostname. Literals and blocks are expanded locally; hostnames are handed
//! to a [`TargetResolver`](crate::core::TargetResolver).

use crate::core::TargetResolver;
use crate::error::ScanError;
use ipnetwork::{IpNetwork, IpNetworkError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Default cap on how many addresses one CIDR block may expand to
pub const DEFAULT_MAX_CIDR_ADDRESSES: u64 = 65536;

/// Type of target being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Ipv4,
    Ipv6,
    Cidr,
    Hostname,
}

impl TargetKind {
    /// Classify a target specification without touching the network
    pub fn classify(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.parse::<Ipv4Addr>().is_ok() {
            TargetKind::Ipv4
        } else if spec.parse::<Ipv6Addr>().is_ok() {
            TargetKind::Ipv6
        } else if looks_like_cidr(spec) {
            TargetKind::Cidr
        } else {
            TargetKind::Hostname
        }
    }
}

fn looks_like_cidr(spec: &str) -> bool {
    match spec.split_once('/') {
        Some((addr, prefix)) => addr.parse::<IpAddr>().is_ok() && !prefix.is_empty(),
        None => false,
    }
}

/// A host specification plus the addresses it resolved to.
///
/// Resolution is lazy and happens once; an empty address list after
/// resolution is an error, never an empty scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    spec: String,
    kind: TargetKind,
    addresses: Vec<IpAddr>,
}

impl ScanTarget {
    pub fn new(spec: impl Into<String>) -> Self {
        let spec = spec.into().trim().to_string();
        let kind = TargetKind::classify(&spec);
        Self {
            spec,
            kind,
            addresses: Vec::new(),
        }
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    pub fn is_resolved(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// Resolve the target through `resolver`, at most once
    pub async fn resolve(&mut self, resolver: &dyn TargetResolver) -> crate::Result<&[IpAddr]> {
        if !self.is_resolved() {
            let addresses = resolver.resolve(&self.spec).await?;
            if addresses.is_empty() {
                return Err(ScanError::resolution(&self.spec, "no addresses found"));
            }
            self.addresses = addresses;
        }
        Ok(&self.addresses)
    }

    /// Addresses that get probed.
    ///
    /// A hostname is scanned on its primary address only (the first IPv4
    /// address, else the first address); literals and CIDR blocks are
    /// scanned on every address.
    pub fn scan_addresses(&self) -> Vec<IpAddr> {
        match self.kind {
            TargetKind::Hostname => self.primary_address().into_iter().collect(),
            _ => self.addresses.clone(),
        }
    }

    /// Resolved addresses of a hostname that are not scanned
    pub fn other_addresses(&self) -> Vec<IpAddr> {
        match (self.kind, self.primary_address()) {
            (TargetKind::Hostname, Some(primary)) => self
                .addresses
                .iter()
                .copied()
                .filter(|addr| *addr != primary)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn primary_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()
    }
}

/// Expands literals and CIDR blocks into addresses
#[derive(Debug, Clone)]
pub struct TargetParser {
    max_cidr_addresses: u64,
}

impl Default for TargetParser {
    fn default() -> Self {
        Self {
            max_cidr_addresses: DEFAULT_MAX_CIDR_ADDRESSES,
        }
    }
}

impl TargetParser {
    pub fn new(max_cidr_addresses: u64) -> Self {
        Self { max_cidr_addresses }
    }

    /// Addresses for a literal or CIDR target, `None` for hostnames
    pub fn expand(&self, spec: &str) -> Option<crate::Result<Vec<IpAddr>>> {
        let spec = spec.trim();
        match TargetKind::classify(spec) {
            TargetKind::Ipv4 | TargetKind::Ipv6 => {
                spec.parse::<IpAddr>().ok().map(|ip| Ok(vec![ip]))
            }
            TargetKind::Cidr => Some(self.expand_cidr(spec)),
            TargetKind::Hostname => None,
        }
    }

    /// Expand CIDR notation (e.g. 192.168.1.0/30) into every address of the block
    pub fn expand_cidr(&self, spec: &str) -> crate::Result<Vec<IpAddr>> {
        let network: IpNetwork = spec
            .parse()
            .map_err(|e: IpNetworkError| ScanError::resolution(spec, e.to_string()))?;

        let host_bits = match network {
            IpNetwork::V4(_) => 32 - u32::from(network.prefix()),
            IpNetwork::V6(_) => 128 - u32::from(network.prefix()),
        };
        self.check_block_size(spec, 1u128.checked_shl(host_bits))?;

        let addresses: Vec<IpAddr> = network.iter().collect();
        log::debug!("CIDR {} expanded to {} addresses", spec, addresses.len());
        Ok(addresses)
    }

    fn check_block_size(&self, spec: &str, total: Option<u128>) -> crate::Result<()> {
        if total.map_or(true, |total| total > u128::from(self.max_cidr_addresses)) {
            return Err(ScanError::resolution(
                spec,
                format!("block exceeds the limit of {} addresses", self.max_cidr_addresses),
            ));
        }
        Ok(())
    }
}
