//! IPv6 address/prefix handling
//!
//! Rules and the local shortcut work on prefixes; plain addresses are
//! `std::net::Ipv6Addr` everywhere else.

use crate::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// An IPv6 address with a prefix length
///
/// The address is stored as written, not truncated to the network
/// address; the prefix only matters to `contains`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Cidr {
    addr: Ipv6Addr,
    prefix: u8,
}

impl Ipv6Cidr {
    pub fn new(addr: Ipv6Addr, prefix: u8) -> Result<Self> {
        if prefix > 128 {
            return Err(Error::BadAddress(format!("{}/{}", addr, prefix)));
        }
        Ok(Self { addr, prefix })
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// True iff the top `prefix` bits of `addr` match this prefix
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        let mask = prefix_mask(self.prefix);
        u128::from(self.addr) & mask == u128::from(addr) & mask
    }
}

fn prefix_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        !0u128 << (128 - prefix)
    }
}

impl FromStr for Ipv6Cidr {
    type Err = Error;

    /// Parse `addr` or `addr/prefix`; a bare address gets prefix 128
    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::BadAddress(s.to_string());

        match s.split_once('/') {
            None => {
                let addr: Ipv6Addr = s.parse().map_err(|_| bad())?;
                Ipv6Cidr::new(addr, 128)
            }
            Some((addr, prefix)) => {
                let addr: Ipv6Addr = addr.parse().map_err(|_| bad())?;
                let prefix: u8 = prefix.parse().map_err(|_| bad())?;
                Ipv6Cidr::new(addr, prefix).map_err(|_| bad())
            }
        }
    }
}

impl fmt::Display for Ipv6Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Solicited-node multicast address for a target (RFC 4291 2.7.1):
/// `ff02::1:ff00:0` with the low 24 bits of the target
pub fn solicited_node(target: Ipv6Addr) -> Ipv6Addr {
    const BASE: u128 = 0xff02_0000_0000_0000_0000_0001_ff00_0000;
    Ipv6Addr::from(BASE | (u128::from(target) & 0x00ff_ffff))
}
