//! Utility modules for the scanner

pub mod port_parser;
pub mod scan_options;
pub mod target_parser;

use std::time::Duration;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logger with specified level.
    ///
    /// Panics if a logger is already installed; use [`Logger::try_init`]
    /// from tests and embedding applications.
    pub fn init(level: log::LevelFilter) {
        Self::builder(level).init();
    }

    /// Like [`Logger::init`], but reports an already installed logger
    pub fn try_init(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
        Self::builder(level).try_init()
    }

    fn builder(level: log::LevelFilter) -> env_logger::Builder {
        let mut builder = env_logger::Builder::from_default_env();
        builder.filter_level(level).format_timestamp_secs();
        builder
    }

    /// Log scan start
    pub fn log_scan_start(targets: &str, probes: usize, engine: &str) {
        log::info!("Starting scan of {} ({} probes) using {} engine", targets, probes, engine);
    }

    /// Log scan completion
    pub fn log_scan_complete(duration: Duration, open_ports: usize, total_ports: usize) {
        log::info!(
            "Scan completed in {:.2}s - {}/{} ports open",
            duration.as_secs_f64(),
            open_ports,
            total_ports
        );
    }
}
