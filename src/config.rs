//! Configuration module for the portprobe scanner

use crate::error::ScanError;
use crate::network::{parse_protocols, Protocol};
use crate::utils::port_parser::{enumerate_for, PortRange, PortSpec};
use crate::utils::scan_options::{RetryPolicy, ScanOrder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-user configuration file in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".portprobe.toml";

/// Main configuration structure for scanning operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Hosts, addresses or CIDR blocks to scan
    pub targets: Vec<String>,

    /// Protocols to probe, in scan order
    pub protocols: Vec<Protocol>,

    /// Ports to scan
    pub ports: PortSpec,

    /// Ports removed from the enumerated set
    pub exclude_ports: Option<PortSpec>,

    /// Number of probes in flight at once
    pub concurrency: usize,

    /// Timeout for each probe in milliseconds
    pub timeout: u64,

    /// Whole-scan time limit in milliseconds
    pub deadline: Option<u64>,

    /// Extra attempts for probes that got no conclusive answer
    pub retries: u32,

    /// Pause between attempts in milliseconds
    pub retry_delay: u64,

    pub scan_order: ScanOrder,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            protocols: vec![Protocol::Tcp],
            ports: PortSpec::default(),
            exclude_ports: None,
            concurrency: 100,
            timeout: 1000,
            deadline: None,
            retries: 0,
            retry_delay: 100,
            scan_order: ScanOrder::Serial,
        }
    }
}

impl ScanConfig {
    /// Create a new scan configuration for one target
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            targets: vec![target.into()],
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Set the protocols from their names; unknown names are rejected
    pub fn with_protocols<S: AsRef<str>>(mut self, protocols: &[S]) -> crate::Result<Self> {
        self.protocols = parse_protocols(protocols)?;
        Ok(self)
    }

    /// Set the ports to scan
    pub fn with_ports(mut self, ports: PortSpec) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_excluded_ports(mut self, ports: PortSpec) -> Self {
        self.exclude_ports = Some(ports);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = duration_millis(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline.map(duration_millis);
        self
    }

    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = duration_millis(delay);
        self
    }

    pub fn with_scan_order(mut self, scan_order: ScanOrder) -> Self {
        self.scan_order = scan_order;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn deadline_duration(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_millis)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_delay))
    }

    /// Ports to probe for `protocol`, exclusions applied
    pub fn ports_for(&self, protocol: Protocol) -> crate::Result<PortRange> {
        let ports = enumerate_for(&self.ports, protocol)?;
        match &self.exclude_ports {
            Some(excluded) => Ok(ports.exclude(&enumerate_for(excluded, protocol)?)),
            None => Ok(ports),
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: ScanConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the per-user config file, `~/.portprobe.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from default locations
    pub fn load_default_config() -> Self {
        Self::load_or_default(Self::default_config_path())
    }

    /// Load `path` if it exists and is valid, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if path.exists() {
            match Self::from_toml_file(path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration.
    ///
    /// Targets are not required here: a session can add them later.
    pub fn validate(&self) -> crate::Result<()> {
        if self.protocols.is_empty() {
            return Err(ScanError::Config("At least one protocol is required".to_string()));
        }

        if self.concurrency == 0 {
            return Err(ScanError::Config("Concurrency must be greater than 0".to_string()));
        }

        if self.timeout == 0 {
            return Err(ScanError::Config("Timeout must be greater than 0".to_string()));
        }

        if self.deadline == Some(0) {
            return Err(ScanError::Config("Deadline must be greater than 0".to_string()));
        }

        if self.targets.iter().any(|target| target.trim().is_empty()) {
            return Err(ScanError::Config("Target cannot be empty".to_string()));
        }

        for protocol in &self.protocols {
            if self.ports_for(*protocol)?.is_empty() {
                return Err(ScanError::InvalidPortSpec(format!(
                    "no {} ports left after exclusions",
                    protocol
                )));
            }
        }

        Ok(())
    }

    /// Nmap-style echo of the scan arguments, e.g. `-sT -p 22,80 localhost`
    pub fn args(&self) -> String {
        let mut args: Vec<String> = self
            .protocols
            .iter()
            .map(|protocol| protocol.scan_flag().to_string())
            .collect();

        match &self.ports {
            PortSpec::Top(count) => args.push(format!("--top-ports {}", count)),
            ports => args.push(format!("-p {}", ports)),
        }
        if let Some(excluded) = &self.exclude_ports {
            args.push(format!("--exclude-ports {}", excluded));
        }
        if self.retries > 0 {
            args.push(format!("--max-retries {}", self.retries));
        }
        if let Some(deadline) = self.deadline {
            args.push(format!("--host-timeout {}ms", deadline));
        }
        args.extend(self.targets.iter().cloned());
        args.join(" ")
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.protocols, vec![Protocol::Tcp]);
        assert_eq!(config.concurrency, 100);
        assert_eq!(config.timeout_duration(), Duration::from_millis(1000));
        assert_eq!(config.deadline_duration(), None);
        assert_eq!(config.retry_policy().attempts(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_target_appends() {
        let config = ScanConfig::new("localhost").with_target("10.0.0.0/30");
        assert_eq!(config.targets, vec!["localhost".to_string(), "10.0.0.0/30".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join(DEFAULT_CONFIG_FILE);
        assert_eq!(ScanConfig::load_or_default(&missing), ScanConfig::default());

        let mut file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        writeln!(file, "targets = [\"scanme.example\"]\nconcurrency = 7").unwrap();
        let loaded = ScanConfig::load_or_default(file.path());
        assert_eq!(loaded.targets, vec!["scanme.example".to_string()]);
        assert_eq!(loaded.concurrency, 7);

        let mut broken = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        writeln!(broken, "concurrency = 0").unwrap();
        assert_eq!(ScanConfig::load_or_default(broken.path()), ScanConfig::default());

        assert!(ScanConfig::default_config_path().ends_with(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_invalid_values() {
        assert!(ScanConfig::new("localhost").with_concurrency(0).validate().is_err());
        assert!(ScanConfig::new("localhost").with_timeout(Duration::ZERO).validate().is_err());
        assert!(ScanConfig::new("").validate().is_err());
        assert!(matches!(
            ScanConfig::new("localhost").with_protocols(&["tcp", "foo"]),
            Err(ScanError::InvalidProtocol(_))
        ));
    }

    #[test]
    fn test_exclusions_applied() {
        let config = ScanConfig::new("localhost")
            .with_ports("20-25".parse().unwrap())
            .with_excluded_ports("22".parse().unwrap());
        assert_eq!(config.ports_for(Protocol::Tcp).unwrap().to_vec(), vec![20, 21, 23, 24, 25]);

        let everything_excluded = config.with_excluded_ports("1-100".parse().unwrap());
        assert!(matches!(everything_excluded.validate(), Err(ScanError::InvalidPortSpec(_))));
    }

    #[test]
    fn test_args_echo() {
        let config = ScanConfig::new("localhost")
            .with_protocols(&["tcp", "udp"])
            .unwrap()
            .with_ports("22,80".parse().unwrap());
        assert_eq!(config.args(), "-sT -sU -p 22,80 localhost");
        assert_eq!(ScanConfig::new("10.0.0.1").args(), "-sT --top-ports 1000 10.0.0.1");
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
targets = ["127.0.0.1", "localhost"]
protocols = ["tcp", "udp"]
ports = "22,80,8000-8010"
concurrency = 16
timeout = 250
deadline = 5000
scan_order = "random"
"#
        )
        .unwrap();

        let config = ScanConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.protocols, vec![Protocol::Tcp, Protocol::Udp]);
        assert_eq!(config.ports_for(Protocol::Udp).unwrap().len(), 13);
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.deadline_duration(), Some(Duration::from_secs(5)));
        assert_eq!(config.scan_order, ScanOrder::Random);
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ports = \"0-10\"").unwrap();
        assert!(ScanConfig::from_toml_file(file.path()).unwrap_err().is_config_error());

        let missing = ScanConfig::from_toml_file("/nonexistent/portprobe.toml");
        assert!(matches!(missing, Err(ScanError::Config(_))));
    }
}
