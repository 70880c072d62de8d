//! Port specification parsing and enumeration
//!
//! Accepts the usual scanner notation: `"22,80,443"`, `"1000-2000"`,
//! open-ended ranges (`"-1024"`, `"60000-"`), `"-"` for every port and
//! `"top:100"` (or `"top100"`) for the most common ports.

use crate::error::ScanError;
use crate::network::Protocol;
use crate::top_ports::{top_ports, DEFAULT_TOP_PORTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const MIN_PORT: u16 = 1;
pub const MAX_PORT: u16 = 65535;

/// One entry of an explicit port list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortItem {
    Single(u16),
    Range(u16, u16),
}

impl PortItem {
    fn validate(&self) -> crate::Result<()> {
        match *self {
            PortItem::Single(0) => Err(ScanError::InvalidPortSpec("port 0 is not scannable".to_string())),
            PortItem::Single(_) => Ok(()),
            PortItem::Range(start, end) => {
                if start == 0 {
                    Err(ScanError::InvalidPortSpec(format!("range {}-{} includes port 0", start, end)))
                } else if start > end {
                    Err(ScanError::InvalidPortSpec(format!(
                        "range start ({}) is greater than end ({})",
                        start, end
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Display for PortItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortItem::Single(port) => write!(f, "{}", port),
            PortItem::Range(start, end) => write!(f, "{}-{}", start, end),
        }
    }
}

impl FromStr for PortItem {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let item = match s.split_once('-') {
            Some((start, end)) => {
                let start = match start.trim() {
                    "" => MIN_PORT,
                    start => parse_port(start)?,
                };
                let end = match end.trim() {
                    "" => MAX_PORT,
                    end => parse_port(end)?,
                };
                PortItem::Range(start, end)
            }
            None => PortItem::Single(parse_port(s)?),
        };
        item.validate()?;
        Ok(item)
    }
}

fn parse_port(s: &str) -> crate::Result<u16> {
    s.parse::<u16>()
        .map_err(|_| ScanError::InvalidPortSpec(format!("invalid port number '{}'", s)))
}

/// What the user asked to scan, before enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortSpec {
    /// The `n` most common ports of each protocol
    Top(usize),
    Explicit(Vec<PortItem>),
}

impl Default for PortSpec {
    fn default() -> Self {
        PortSpec::Top(DEFAULT_TOP_PORTS)
    }
}

impl PortSpec {
    /// Every port from 1 to 65535
    pub fn all() -> Self {
        PortSpec::Explicit(vec![PortItem::Range(MIN_PORT, MAX_PORT)])
    }

    pub fn ports(ports: &[u16]) -> Self {
        PortSpec::Explicit(ports.iter().copied().map(PortItem::Single).collect())
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Top(count) => write!(f, "top:{}", count),
            PortSpec::Explicit(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for PortSpec {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim().to_lowercase();
        match spec.as_str() {
            "" | "default" => return Ok(PortSpec::default()),
            "-" => return Ok(PortSpec::all()),
            _ => {}
        }

        if let Some(count) = spec.strip_prefix("top") {
            let count = count.trim_start_matches(':').trim();
            let count: usize = count
                .parse()
                .map_err(|_| ScanError::InvalidPortSpec(format!("invalid top-ports count '{}'", count)))?;
            if count == 0 {
                return Err(ScanError::InvalidPortSpec("top-ports count must be at least 1".to_string()));
            }
            return Ok(PortSpec::Top(count));
        }

        let items = spec
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<crate::Result<Vec<PortItem>>>()?;

        if items.is_empty() {
            return Err(ScanError::InvalidPortSpec(format!("no ports in '{}'", s)));
        }
        Ok(PortSpec::Explicit(items))
    }
}

impl TryFrom<String> for PortSpec {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}

/// An ordered set of unique, scannable ports
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    ports: BTreeSet<u16>,
}

impl PortRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a range from raw ports; port 0 is rejected
    pub fn from_ports<I: IntoIterator<Item = u16>>(ports: I) -> crate::Result<Self> {
        let mut range = Self::new();
        for port in ports {
            range.insert(port)?;
        }
        Ok(range)
    }

    pub fn insert(&mut self, port: u16) -> crate::Result<()> {
        PortItem::Single(port).validate()?;
        self.ports.insert(port);
        Ok(())
    }

    fn insert_item(&mut self, item: PortItem) -> crate::Result<()> {
        item.validate()?;
        match item {
            PortItem::Single(port) => {
                self.ports.insert(port);
            }
            PortItem::Range(start, end) => self.ports.extend(start..=end),
        }
        Ok(())
    }

    /// Ports of `self` that are not in `excluded`
    pub fn exclude(&self, excluded: &PortRange) -> PortRange {
        let ports: BTreeSet<u16> = self.ports.difference(&excluded.ports).copied().collect();
        let removed = self.ports.len() - ports.len();
        if removed > 0 {
            log::debug!("excluded {} ports from scan ({} remaining)", removed, ports.len());
        }
        PortRange { ports }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }

    /// Ports in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.iter().collect()
    }

    /// Collapse consecutive ports into `start-end` items
    pub fn to_items(&self) -> Vec<PortItem> {
        let mut items = Vec::new();
        let mut ports = self.iter();
        let Some(first) = ports.next() else {
            return items;
        };

        let (mut start, mut end) = (first, first);
        for port in ports {
            if port == end + 1 {
                end = port;
            } else {
                items.push(compact_item(start, end));
                start = port;
                end = port;
            }
        }
        items.push(compact_item(start, end));
        items
    }
}

fn compact_item(start: u16, end: u16) -> PortItem {
    if start == end {
        PortItem::Single(start)
    } else {
        PortItem::Range(start, end)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", PortSpec::Explicit(self.to_items()))
    }
}

impl FromStr for PortRange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<PortSpec>()? {
            PortSpec::Explicit(items) => {
                let mut range = PortRange::new();
                for item in items {
                    range.insert_item(item)?;
                }
                Ok(range)
            }
            PortSpec::Top(_) => Err(ScanError::InvalidPortSpec(format!("'{}' is not an explicit port list", s))),
        }
    }
}

impl From<&PortRange> for PortSpec {
    fn from(range: &PortRange) -> Self {
        PortSpec::Explicit(range.to_items())
    }
}

/// Enumerate a port specification with the TCP defaults
pub fn enumerate(spec: &PortSpec) -> crate::Result<PortRange> {
    enumerate_for(spec, Protocol::Tcp)
}

/// Enumerate a port specification, using `protocol`'s list for `Top(n)`
pub fn enumerate_for(spec: &PortSpec, protocol: Protocol) -> crate::Result<PortRange> {
    match spec {
        PortSpec::Top(0) => Err(ScanError::InvalidPortSpec("top-ports count must be at least 1".to_string())),
        PortSpec::Top(count) => PortRange::from_ports(top_ports(protocol, *count)),
        PortSpec::Explicit(items) => {
            let mut range = PortRange::new();
            for item in items {
                range.insert_item(*item)?;
            }
            if range.is_empty() {
                return Err(ScanError::InvalidPortSpec("no ports specified".to_string()));
            }
            Ok(range)
        }
    }
}
