//! Proxy rules
//!
//! A rule binds an address prefix to what should happen when a
//! solicitation for a covered target arrives upstream.

use crate::protocol::Ipv6Cidr;
use std::net::Ipv6Addr;

/// What a matching rule forwards to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    /// Answer directly, no downstream verification
    Static,
    /// Verify reachability through the named downstream interface
    Iface(String),
    /// Pick the downstream interface from the host routing table
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub cidr: Ipv6Cidr,
    pub target: RuleTarget,
    /// Install a host route towards the downstream interface once the
    /// target proves reachable
    pub autovia: bool,
}

impl Rule {
    pub fn matches(&self, addr: Ipv6Addr) -> bool {
        self.cidr.contains(addr)
    }

    /// Downstream interface name, for `Iface` rules. `Auto` rules have
    /// no name here; their resolved downstream lives in the session.
    pub fn iface(&self) -> Option<&str> {
        match &self.target {
            RuleTarget::Iface(name) => Some(name),
            _ => None,
        }
    }
}
