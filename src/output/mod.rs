//! Output formatting for finished scan reports
//!
//! These adapters only read a [`ScanReport`]; the scan itself never depends
//! on them.

use crate::error::ScanError;
use crate::network::PortState;
use crate::scanner::{HostResult, ScanReport};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Output format options
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    NmapXml,
}

impl FromStr for OutputFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "xml" | "nmapxml" | "nmap-xml" => Ok(OutputFormat::NmapXml),
            _ => Err(ScanError::Config(format!("Unknown output format: {}", s))),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Write here instead of stdout
    pub file: Option<PathBuf>,
    /// List closed, filtered and unknown ports in text output
    pub show_all: bool,
}

/// Main output manager
#[derive(Debug, Clone, Default)]
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Render the report in the configured format
    pub fn render(&self, report: &ScanReport) -> crate::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(report)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::NmapXml => format_nmap_xml(report),
        }
    }

    /// Render and write to the configured file, or stdout
    pub fn write_report(&self, report: &ScanReport) -> crate::Result<()> {
        let output = self.render(report)?;
        match &self.config.file {
            Some(path) => {
                let mut file = File::create(path)
                    .map_err(|e| ScanError::Output(format!("cannot create {}: {}", path.display(), e)))?;
                file.write_all(output.as_bytes())
                    .map_err(|e| ScanError::Output(format!("cannot write {}: {}", path.display(), e)))?;
            }
            None => print!("{}", output),
        }
        Ok(())
    }

    /// Human readable table, one block per host
    fn format_text(&self, report: &ScanReport) -> String {
        let mut output = String::new();

        for host in report.hosts() {
            output.push_str(&format!(
                "Scan report for {} ({})\n",
                host.target(),
                host.address()
            ));
            output.push_str(&format!("Host is {} ({}).\n", host.status().state, host.status().reason));
            if !host.other_addresses().is_empty() {
                let others: Vec<String> = host.other_addresses().iter().map(IpAddr::to_string).collect();
                output.push_str(&format!("Other addresses (not scanned): {}\n", others.join(" ")));
            }

            let shown: Vec<_> = host
                .results()
                .iter()
                .filter(|result| self.config.show_all || result.state() == PortState::Open)
                .collect();
            let hidden = host.results().len() - shown.len();
            if hidden > 0 {
                output.push_str(&format!("Not shown: {} ports\n", hidden));
            }

            if !shown.is_empty() {
                output.push_str("PORT      STATE           SERVICE\n");
                for result in shown {
                    output.push_str(&format!(
                        "{:>5}/{:<3} {:<15} {}\n",
                        result.port(),
                        result.protocol().as_str(),
                        result.state().to_string(),
                        result.service().unwrap_or("unknown")
                    ));
                }
            }
            output.push('\n');
        }

        for unresolved in report.unresolved() {
            output.push_str(&format!("Failed to resolve \"{}\": {}\n", unresolved.target, unresolved.cause));
        }

        let summary = report.summary();
        output.push_str(&format!(
            "Done: {} IP address{} ({} host{} up) scanned in {:.2} seconds\n",
            summary.total,
            if summary.total == 1 { "" } else { "es" },
            summary.up,
            if summary.up == 1 { "" } else { "s" },
            report.elapsed().as_secs_f64()
        ));
        output
    }
}

fn timestr(time: DateTime<Utc>) -> String {
    time.format("%a %b %d %H:%M:%S %Y").to_string()
}

/// Render the report as an nmap `nmaprun` XML document
pub fn format_nmap_xml(report: &ScanReport) -> crate::Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let start = report.started().timestamp().to_string();
    let start_str = timestr(report.started());
    let mut nmaprun = BytesStart::new("nmaprun");
    nmaprun.push_attribute(("scanner", env!("CARGO_PKG_NAME")));
    nmaprun.push_attribute(("args", report.args()));
    nmaprun.push_attribute(("start", start.as_str()));
    nmaprun.push_attribute(("startstr", start_str.as_str()));
    nmaprun.push_attribute(("version", env!("CARGO_PKG_VERSION")));
    writer.write_event(Event::Start(nmaprun))?;

    for protocol in &report.config().protocols {
        let mut scaninfo = BytesStart::new("scaninfo");
        scaninfo.push_attribute(("type", match protocol {
            crate::network::Protocol::Tcp => "connect",
            crate::network::Protocol::Udp => "udp",
        }));
        scaninfo.push_attribute(("protocol", protocol.as_str()));
        writer.write_event(Event::Empty(scaninfo))?;
    }

    for host in report.hosts() {
        write_host(&mut writer, host)?;
    }

    writer.write_event(Event::Start(BytesStart::new("runstats")))?;

    let finish = report.finished().timestamp().to_string();
    let finish_str = timestr(report.finished());
    let elapsed = format!("{:.2}", report.elapsed().as_secs_f64());
    let mut finished = BytesStart::new("finished");
    finished.push_attribute(("time", finish.as_str()));
    finished.push_attribute(("timestr", finish_str.as_str()));
    finished.push_attribute(("elapsed", elapsed.as_str()));
    writer.write_event(Event::Empty(finished))?;

    let summary = report.summary();
    let (up, down, total) = (summary.up.to_string(), summary.down.to_string(), summary.total.to_string());
    let mut hosts = BytesStart::new("hosts");
    hosts.push_attribute(("up", up.as_str()));
    hosts.push_attribute(("down", down.as_str()));
    hosts.push_attribute(("total", total.as_str()));
    writer.write_event(Event::Empty(hosts))?;

    writer.write_event(Event::End(BytesEnd::new("runstats")))?;
    writer.write_event(Event::End(BytesEnd::new("nmaprun")))?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| ScanError::Output(e.to_string()))
}

fn write_host<W: Write>(writer: &mut Writer<W>, host: &HostResult) -> crate::Result<()> {
    let mut element = BytesStart::new("host");
    let times = host
        .started()
        .zip(host.finished())
        .map(|(start, end)| (start.timestamp().to_string(), end.timestamp().to_string()));
    if let Some((start, end)) = &times {
        element.push_attribute(("starttime", start.as_str()));
        element.push_attribute(("endtime", end.as_str()));
    }
    writer.write_event(Event::Start(element))?;

    let state = host.status().state.to_string();
    let mut status = BytesStart::new("status");
    status.push_attribute(("state", state.as_str()));
    status.push_attribute(("reason", host.status().reason.as_str()));
    writer.write_event(Event::Empty(status))?;

    write_address(writer, host.address())?;
    for other in host.other_addresses() {
        write_address(writer, *other)?;
    }

    let mut hostname = BytesStart::new("hostname");
    hostname.push_attribute(("name", host.target()));
    hostname.push_attribute(("type", "user"));
    writer.write_event(Event::Start(BytesStart::new("hostnames")))?;
    writer.write_event(Event::Empty(hostname))?;
    writer.write_event(Event::End(BytesEnd::new("hostnames")))?;

    writer.write_event(Event::Start(BytesStart::new("ports")))?;
    for result in host.results() {
        let port_id = result.port().to_string();
        let mut port = BytesStart::new("port");
        port.push_attribute(("protocol", result.protocol().as_str()));
        port.push_attribute(("portid", port_id.as_str()));
        writer.write_event(Event::Start(port))?;

        let port_state = result.state().to_string();
        let mut state = BytesStart::new("state");
        state.push_attribute(("state", port_state.as_str()));
        state.push_attribute(("reason", result.reason().unwrap_or("")));
        writer.write_event(Event::Empty(state))?;

        if let Some(name) = result.service() {
            let mut service = BytesStart::new("service");
            service.push_attribute(("name", name));
            service.push_attribute(("method", "table"));
            service.push_attribute(("conf", "3"));
            writer.write_event(Event::Empty(service))?;
        }

        writer.write_event(Event::End(BytesEnd::new("port")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("ports")))?;

    writer.write_event(Event::End(BytesEnd::new("host")))?;
    Ok(())
}

fn write_address<W: Write>(writer: &mut Writer<W>, address: IpAddr) -> crate::Result<()> {
    let addr = address.to_string();
    let mut element = BytesStart::new("address");
    element.push_attribute(("addr", addr.as_str()));
    element.push_attribute(("addrtype", if address.is_ipv4() { "ipv4" } else { "ipv6" }));
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::network::{reason, ProbeResult, Protocol};
    use crate::scanner::ReportBuilder;
    use chrono::TimeZone;
    use std::net::Ipv4Addr;

    fn report() -> ScanReport {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let config = ScanConfig::new("localhost").with_ports("22,80".parse().unwrap());

        let mut host = HostResult::new("localhost", IpAddr::V4(Ipv4Addr::LOCALHOST));
        host.push(
            ProbeResult::new(80, Protocol::Tcp, PortState::Open)
                .with_reason(reason::SYN_ACK)
                .with_service("http")
                .with_timestamp(started),
        );
        host.push(
            ProbeResult::new(22, Protocol::Tcp, PortState::Closed)
                .with_reason(reason::CONN_REFUSED)
                .with_timestamp(started),
        );

        ReportBuilder::new(&config, started).build(vec![host], started + chrono::Duration::seconds(1))
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("xml".parse::<OutputFormat>().unwrap(), OutputFormat::NmapXml);
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_text_lists_open_ports() {
        let text = OutputManager::default().render(&report()).unwrap();
        assert!(text.contains("PORT      STATE           SERVICE"));
        assert!(text.contains("   80/tcp open            http"));
        assert!(text.contains("Not shown: 1 ports"));
        assert!(text.contains("1 IP address (1 host up)"));
    }

    #[test]
    fn test_json_round_trips() {
        let manager = OutputManager::new(OutputConfig {
            format: OutputFormat::Json,
            ..Default::default()
        });
        let json = manager.render(&report()).unwrap();
        let back: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report());
    }

    #[test]
    fn test_nmap_xml_document() {
        let xml = format_nmap_xml(&report()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("args=\"-sT -p 22,80 localhost\""));
        assert!(xml.contains("<status state=\"up\" reason=\"conn-refused\"/>"));
        assert!(xml.contains("<address addr=\"127.0.0.1\" addrtype=\"ipv4\"/>"));
        assert!(xml.contains("<port protocol=\"tcp\" portid=\"80\">"));
        assert!(xml.contains("<service name=\"http\" method=\"table\" conf=\"3\"/>"));
        assert!(xml.contains("<hosts up=\"1\" down=\"0\" total=\"1\"/>"));
        assert!(xml.contains("elapsed=\"1.00\""));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.xml");
        let manager = OutputManager::new(OutputConfig {
            format: OutputFormat::NmapXml,
            file: Some(path.clone()),
            show_all: true,
        });

        manager.write_report(&report()).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("<nmaprun"));
    }
}
