//! IP range file parsing and the `InIPRange` filter.
//!
//! Two line formats are accepted:
//!
//! ```text
//! 1.0.1.0/24
//! apnic|CN|ipv4|1.0.1.0|256|20110414|allocated
//! apnic|CN|ipv6|2001:250::|35|20000426|allocated
//! ```
//!
//! APNIC delegation lines are only taken for the configured country.

use arc_swap::ArcSwap;
use ipnet::{Ipv4Net, Ipv4Subnets, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use crate::rule::Filter;
use crate::{Request, Result};

/// Filter name under which the IP range set is registered.
pub const IP_RANGE_FILTER_NAME: &str = "InIPRange";

/// Country code taken from APNIC delegation files.
pub const DEFAULT_COUNTRY: &str = "CN";

/// Sorted IPv4 and IPv6 networks.
#[derive(Debug, Clone, Default)]
pub struct IpRangeSet {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
}

impl IpRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse range file content. Unparsable lines are skipped.
    pub fn parse(content: &str, country: &str) -> Self {
        let mut set = Self::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.contains('|') {
                set.add_delegation(line, country);
            } else if let Ok(net) = line.parse::<Ipv4Net>() {
                set.v4.push(net);
            } else if let Ok(net) = line.parse::<Ipv6Net>() {
                set.v6.push(net);
            } else {
                log::debug!("Skipping IP range line {:?}", line);
            }
        }
        set.v4.sort_by_key(|n| n.network());
        set.v6.sort_by_key(|n| n.network());
        set
    }

    /// Load a range file.
    pub fn load(path: impl AsRef<Path>, country: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content, country))
    }

    fn add_delegation(&mut self, line: &str, country: &str) {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 5 || !fields[1].eq_ignore_ascii_case(country) {
            return;
        }
        match fields[2] {
            "ipv4" => {
                let start = match fields[3].parse::<Ipv4Addr>() {
                    Ok(start) => start,
                    Err(_) => return,
                };
                let count = match fields[4].parse::<u32>() {
                    Ok(count) if count > 0 => count,
                    _ => return,
                };
                let end = match u32::from(start).checked_add(count - 1) {
                    Some(end) => Ipv4Addr::from(end),
                    None => return,
                };
                // Counts need not be powers of two
                self.v4.extend(Ipv4Subnets::new(start, end, 0));
            }
            "ipv6" => {
                let net = format!("{}/{}", fields[3], fields[4]);
                if let Ok(net) = net.parse::<Ipv6Net>() {
                    self.v6.push(net);
                }
            }
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => contains_v4(&self.v4, v4),
            IpAddr::V6(v6) => contains_v6(&self.v6, v6),
        }
    }
}

// Ranges may overlap, so every network starting at or before `ip` is a
// candidate.
fn contains_v4(nets: &[Ipv4Net], ip: Ipv4Addr) -> bool {
    let idx = nets.partition_point(|n| n.network() <= ip);
    nets[..idx].iter().rev().any(|n| n.contains(&ip))
}

fn contains_v6(nets: &[Ipv6Net], ip: Ipv6Addr) -> bool {
    let idx = nets.partition_point(|n| n.network() <= ip);
    nets[..idx].iter().rev().any(|n| n.contains(&ip))
}

/// Named filter: true when the request host is an IP literal inside a range.
///
/// No DNS resolution is performed; host names never match.
pub struct IpRangeFilter {
    ranges: ArcSwap<IpRangeSet>,
}

impl IpRangeFilter {
    pub fn new(ranges: IpRangeSet) -> Self {
        Self {
            ranges: ArcSwap::from_pointee(ranges),
        }
    }

    pub fn reload(&self, ranges: IpRangeSet) {
        log::info!("Loaded {} IP ranges", ranges.len());
        self.ranges.store(Arc::new(ranges));
    }

    pub fn ranges(&self) -> Arc<IpRangeSet> {
        self.ranges.load_full()
    }
}

impl Default for IpRangeFilter {
    fn default() -> Self {
        Self::new(IpRangeSet::new())
    }
}

impl Filter for IpRangeFilter {
    fn matches(&self, request: &Request) -> bool {
        let (host, _) = request.host_port();
        match host.parse::<IpAddr>() {
            Ok(ip) => self.ranges.load().contains(ip),
            Err(_) => false,
        }
    }
}
