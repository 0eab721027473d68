//! IPv6 route resolution for `auto` rules
//!
//! Parsed from `/proc/net/ipv6_route`: longest matching prefix wins,
//! metric breaks ties. Only used when a rule says `iface = "auto"`.

use crate::protocol::Ipv6Cidr;
use crate::{Error, Result};
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

const PROC_IPV6_ROUTE: &str = "/proc/net/ipv6_route";

/// RTF_UP from linux/ipv6_route.h
const RTF_UP: u32 = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    dest: Ipv6Cidr,
    metric: u32,
    dev: String,
}

/// Snapshot of the kernel IPv6 routing table
pub struct RouteTable {
    routes: Vec<Route>,
    source: Option<PathBuf>,
    refreshed: Option<Instant>,
}

impl RouteTable {
    /// Table backed by the kernel; starts empty until refreshed
    pub fn system() -> Self {
        Self {
            routes: Vec::new(),
            source: Some(PathBuf::from(PROC_IPV6_ROUTE)),
            refreshed: None,
        }
    }

    /// Fixed snapshot from `(cidr, metric, device)` rows (tests)
    pub fn fixed(routes: Vec<(Ipv6Cidr, u32, &str)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(dest, metric, dev)| Route {
                    dest,
                    metric,
                    dev: dev.to_string(),
                })
                .collect(),
            source: None,
            refreshed: None,
        }
    }

    /// Re-read the kernel table
    pub fn refresh(&mut self) -> Result<()> {
        let Some(source) = &self.source else {
            return Ok(());
        };

        let content = std::fs::read_to_string(source).map_err(Error::Io)?;
        self.routes = parse_ipv6_route(&content);
        self.refreshed = Some(Instant::now());

        debug!(count = self.routes.len(), "routes refreshed");
        Ok(())
    }

    /// Refresh when the snapshot is older than `ttl`
    pub fn refresh_if_older_than(&mut self, ttl: Duration) -> Result<()> {
        match self.refreshed {
            Some(at) if at.elapsed() < ttl => Ok(()),
            _ => self.refresh(),
        }
    }

    /// Name of the interface the kernel would route `addr` through
    pub fn resolve(&self, addr: Ipv6Addr) -> Option<&str> {
        self.routes
            .iter()
            .filter(|r| r.dest.contains(addr))
            .max_by(|a, b| {
                a.dest
                    .prefix()
                    .cmp(&b.dest.prefix())
                    .then(b.metric.cmp(&a.metric))
            })
            .map(|r| r.dev.as_str())
    }
}

/// Each line: dest, dest prefix, src, src prefix, next hop, metric,
/// refcnt, use, flags, device (all hex except the device name)
fn parse_ipv6_route(content: &str) -> Vec<Route> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }

            let dest = u128::from_str_radix(fields[0], 16).ok()?;
            let prefix = u8::from_str_radix(fields[1], 16).ok()?;
            let metric = u32::from_str_radix(fields[5], 16).ok()?;
            let flags = u32::from_str_radix(fields[8], 16).ok()?;
            let dev = fields[9];

            if flags & RTF_UP == 0 || dev == "lo" || prefix > 128 {
                return None;
            }

            Some(Route {
                dest: Ipv6Cidr::new(Ipv6Addr::from(dest), prefix).ok()?,
                metric,
                dev: dev.to_string(),
            })
        })
        .collect()
}
