//! Error handling for the portprobe scanner
//!
//! Only conditions that stop a scan from being configured or started are
//! errors. Refused connections, timeouts and unreachable hosts met while
//! probing are encoded as [`PortState`](crate::network::PortState) values
//! and never surface through this type.

use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("failed to resolve '{host}': {cause}")]
    Resolution { host: String, cause: String },

    #[error("Invalid port specification: {0}")]
    InvalidPortSpec(String),

    #[error("Invalid protocol {0}")]
    InvalidProtocol(String),

    #[error("scan session has already been run")]
    AlreadyRun,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl ScanError {
    /// Build a resolution error for `host`
    pub fn resolution(host: impl Into<String>, cause: impl ToString) -> Self {
        ScanError::Resolution {
            host: host.into(),
            cause: cause.to_string(),
        }
    }

    /// True for errors raised while validating configuration, before any
    /// network activity took place
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidPortSpec(_) | ScanError::InvalidProtocol(_) | ScanError::Config(_)
        )
    }
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::InvalidPortSpec(e.to_string())
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::Config(format!("Failed to parse TOML: {}", e))
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::Output(e.to_string())
    }
}

impl From<quick_xml::Error> for ScanError {
    fn from(e: quick_xml::Error) -> Self {
        ScanError::Output(e.to_string())
    }
}
