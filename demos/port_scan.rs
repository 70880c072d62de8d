//! Port Scan Example
//!
//! Scans localhost over TCP and prints the port table.
//! Run with `cargo run --example port_scan -- [target] [ports]`.

use portprobe::output::{OutputConfig, OutputFormat, OutputManager};
use portprobe::utils::Logger;
use portprobe::ScanSession;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = Logger::try_init(log::LevelFilter::Info);

    let mut args = std::env::args().skip(1);
    let target = args.next().unwrap_or_else(|| "localhost".to_string());
    let ports = args.next().unwrap_or_else(|| "top:100".to_string());

    let mut session = ScanSession::new(&target, &["tcp"])?;
    session.set_ports(ports.parse()?)?;
    session.set_timeout(Duration::from_millis(500))?;

    let report = session.run().await?;

    for host in report.hosts() {
        println!("Host: {} ({}) is {}", host.target(), host.address(), host.status().state);
        println!("PORT STATE SERVICE");
        for result in host.results().iter().filter(|r| r.state().is_responsive()) {
            println!(
                "{:5}/{} {:<15} {}",
                result.port(),
                result.protocol().as_str(),
                result.state().to_string(),
                result.service().unwrap_or("")
            );
        }
    }

    println!();
    OutputManager::new(OutputConfig {
        format: OutputFormat::Text,
        ..Default::default()
    })
    .write_report(report)?;

    Ok(())
}
