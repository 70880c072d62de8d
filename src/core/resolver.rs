//! Target resolution capability and its system-resolver implementation

use crate::error::ScanError;
use crate::utils::target_parser::{TargetParser, DEFAULT_MAX_CIDR_ADDRESSES};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::time::timeout;

/// Turns a host specification into concrete addresses.
///
/// Implementations must return an error rather than an empty list when
/// nothing is found, so callers can tell "no such host" from "host up,
/// nothing to report".
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self, host_spec: &str) -> crate::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system's name lookup
#[derive(Debug, Clone)]
pub struct SystemResolver {
    parser: TargetParser,
    lookup_timeout: Duration,
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self {
            parser: TargetParser::new(DEFAULT_MAX_CIDR_ADDRESSES),
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit on addresses a CIDR target may expand to
    pub fn with_max_cidr_addresses(mut self, max: u64) -> Self {
        self.parser = TargetParser::new(max);
        self
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    async fn lookup(&self, host: &str) -> crate::Result<Vec<IpAddr>> {
        let lookup = timeout(self.lookup_timeout, lookup_host((host, 0)))
            .await
            .map_err(|_| ScanError::resolution(host, "lookup timed out"))?
            .map_err(|e| ScanError::resolution(host, e))?;

        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in lookup {
            if !addresses.contains(&addr.ip()) {
                addresses.push(addr.ip());
            }
        }
        Ok(addresses)
    }
}

#[async_trait]
impl TargetResolver for SystemResolver {
    async fn resolve(&self, host_spec: &str) -> crate::Result<Vec<IpAddr>> {
        let host_spec = host_spec.trim();
        if host_spec.is_empty() {
            return Err(ScanError::resolution(host_spec, "empty target"));
        }

        let addresses = match self.parser.expand(host_spec) {
            Some(expanded) => expanded?,
            None => self.lookup(host_spec).await?,
        };

        if addresses.is_empty() {
            return Err(ScanError::resolution(host_spec, "no addresses found"));
        }

        log::debug!("resolved {} to {} address(es)", host_spec, addresses.len());
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_literal_needs_no_lookup() {
        let resolver = SystemResolver::new();
        let addresses = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addresses, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    }

    #[tokio::test]
    async fn test_localhost_resolves_to_loopback() {
        let resolver = SystemResolver::new();
        let addresses = resolver.resolve("localhost").await.unwrap();
        assert!(!addresses.is_empty());
        assert!(addresses.iter().all(|addr| addr.is_loopback()));
    }

    #[tokio::test]
    async fn test_invalid_target_is_resolution_error() {
        let resolver = SystemResolver::new().with_lookup_timeout(Duration::from_secs(3));
        let err = resolver.resolve("999.999.999.999").await.unwrap_err();
        assert!(matches!(err, ScanError::Resolution { ref host, .. } if host == "999.999.999.999"));

        assert!(resolver.resolve("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_cidr_is_rejected() {
        let resolver = SystemResolver::new().with_max_cidr_addresses(16);
        assert!(resolver.resolve("10.0.0.0/24").await.is_err());
        assert_eq!(resolver.resolve("10.0.0.0/28").await.unwrap().len(), 16);
    }
}
