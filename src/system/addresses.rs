//! Local IPv6 address snapshot
//!
//! Parsed from `/proc/net/if_inet6`. Used to drop self-originated NDP
//! echoes and to short-circuit solicitations for addresses the host
//! itself owns.

use crate::{Error, Result};
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

const PROC_IF_INET6: &str = "/proc/net/if_inet6";

/// Snapshot of host-owned `(address, interface index)` pairs
pub struct LocalAddressTable {
    entries: Vec<(Ipv6Addr, u32)>,
    source: Option<PathBuf>,
    refreshed: Option<Instant>,
}

impl LocalAddressTable {
    /// Table backed by the kernel; starts empty until refreshed
    pub fn system() -> Self {
        Self {
            entries: Vec::new(),
            source: Some(PathBuf::from(PROC_IF_INET6)),
            refreshed: None,
        }
    }

    /// Fixed snapshot, never refreshed (tests)
    pub fn fixed(entries: Vec<(Ipv6Addr, u32)>) -> Self {
        Self {
            entries,
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
        self.entries = parse_if_inet6(&content);
        self.refreshed = Some(Instant::now());

        debug!(count = self.entries.len(), "local addresses refreshed");
        Ok(())
    }

    /// Refresh when the snapshot is older than `ttl`
    pub fn refresh_if_older_than(&mut self, ttl: Duration) -> Result<()> {
        match self.refreshed {
            Some(at) if at.elapsed() < ttl => Ok(()),
            _ => self.refresh(),
        }
    }

    pub fn is_local(&self, addr: Ipv6Addr) -> bool {
        self.entries.iter().any(|(a, _)| *a == addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Ipv6Addr, u32)> {
        self.entries.iter()
    }
}

/// Each line: 32-hex address, index, prefix length, scope, flags, name
fn parse_if_inet6(content: &str) -> Vec<(Ipv6Addr, u32)> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let addr = fields.next()?;
            let index = fields.next()?;

            if addr.len() != 32 {
                return None;
            }
            let addr = u128::from_str_radix(addr, 16).ok()?;
            let index = u32::from_str_radix(index, 16).ok()?;

            Some((Ipv6Addr::from(addr), index))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
00000000000000000000000000000001 01 80 10 80       lo
fe800000000000000211223344550001 02 40 20 80     eth0
20010db8000000000000000000000009 03 40 00 00     eth1
";

    #[test]
    fn test_parse_if_inet6() {
        let entries = parse_if_inet6(SAMPLE);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ("::1".parse().unwrap(), 1));
        assert_eq!(
            entries[1],
            ("fe80::211:2233:4455:1".parse().unwrap(), 2)
        );
        assert_eq!(entries[2], ("2001:db8::9".parse().unwrap(), 3));
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let entries = parse_if_inet6("garbage\n20010db8 03 40 00 00 eth1\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_is_local() {
        let table = LocalAddressTable::fixed(parse_if_inet6(SAMPLE));
        assert!(table.is_local("2001:db8::9".parse().unwrap()));
        assert!(!table.is_local("2001:db8::a".parse().unwrap()));
    }

    #[test]
    fn test_fixed_refresh_is_noop() {
        let mut table = LocalAddressTable::fixed(vec![("::1".parse().unwrap(), 1)]);
        table.refresh().unwrap();
        assert!(table.is_local("::1".parse().unwrap()));
    }
}
