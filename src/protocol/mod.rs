//! Wire formats for the NDP proxy path
//!
//! Only the protocols the proxy actually touches: Ethernet framing,
//! the IPv6 fixed header, and the two NDP messages (RFC 4861).

pub mod cidr;
pub mod ethernet;
pub mod icmpv6;
pub mod ipv6;
pub mod types;

pub use cidr::{solicited_node, Ipv6Cidr};
pub use types::*;
