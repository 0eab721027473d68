//! NDP messages - RFC 4861
//!
//! Neighbor Solicitation and Neighbor Advertisement, the only ICMPv6
//! types the proxy exchanges. Checksums are left zero: both messages
//! travel through a raw ICMPv6 socket, where the kernel fills and
//! verifies them (RFC 3542).

use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// ICMPv6 type of a Neighbor Solicitation
pub const ND_NEIGHBOR_SOLICIT: u8 = 135;

/// ICMPv6 type of a Neighbor Advertisement
pub const ND_NEIGHBOR_ADVERT: u8 = 136;

/// NDP message size without options: 4 (header) + 4 (flags/reserved) + 16 (target)
pub const NDP_MSG_SIZE: usize = 24;

/// NDP option types (RFC 4861 section 4.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NdpOptionType {
    SourceLinkLayerAddress = 1,
    TargetLinkLayerAddress = 2,
}

/// Neighbor Solicitation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSolicitation {
    pub target_addr: Ipv6Addr,
    pub source_link_addr: Option<MacAddr>,
}

impl NeighborSolicitation {
    pub fn new(target_addr: Ipv6Addr, source_link_addr: Option<MacAddr>) -> Self {
        Self {
            target_addr,
            source_link_addr,
        }
    }

    /// Parse from the full ICMPv6 message (starting at the type byte)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < NDP_MSG_SIZE {
            return Err(Error::Parse("Neighbor Solicitation too short".into()));
        }

        if buffer[0] != ND_NEIGHBOR_SOLICIT {
            return Err(Error::Parse("not a Neighbor Solicitation".into()));
        }

        let target_bytes: [u8; 16] = buffer[8..24].try_into().unwrap();
        let target_addr = Ipv6Addr::from(target_bytes);

        let source_link_addr =
            parse_link_layer_option(&buffer[24..], NdpOptionType::SourceLinkLayerAddress);

        Ok(Self {
            target_addr,
            source_link_addr,
        })
    }

    /// Build the ICMPv6 message bytes (checksum zero, kernel fills it)
    pub fn to_bytes(&self) -> Vec<u8> {
        let option_len = if self.source_link_addr.is_some() { 8 } else { 0 };
        let mut buf = vec![0u8; NDP_MSG_SIZE + option_len];

        buf[0] = ND_NEIGHBOR_SOLICIT;
        // code, checksum and reserved stay zero
        buf[8..24].copy_from_slice(&self.target_addr.octets());

        if let Some(mac) = &self.source_link_addr {
            buf[24] = NdpOptionType::SourceLinkLayerAddress as u8;
            buf[25] = 1; // length in units of 8 bytes
            buf[26..32].copy_from_slice(&mac.0);
        }

        buf
    }
}

/// Neighbor Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAdvertisement {
    pub router_flag: bool,
    pub solicited_flag: bool,
    pub override_flag: bool,
    pub target_addr: Ipv6Addr,
    pub target_link_addr: Option<MacAddr>,
}

impl NeighborAdvertisement {
    /// Advertisement claiming `target_addr` is at `hwaddr`.
    ///
    /// The solicited flag is set for unicast replies only; multicast
    /// destinations get an unsolicited advertisement (RFC 4861 7.2.4).
    pub fn reply(target_addr: Ipv6Addr, hwaddr: MacAddr, router: bool, solicited: bool) -> Self {
        Self {
            router_flag: router,
            solicited_flag: solicited,
            override_flag: false,
            target_addr,
            target_link_addr: Some(hwaddr),
        }
    }

    /// Parse from the full ICMPv6 message (starting at the type byte)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < NDP_MSG_SIZE {
            return Err(Error::Parse("Neighbor Advertisement too short".into()));
        }

        if buffer[0] != ND_NEIGHBOR_ADVERT {
            return Err(Error::Parse("not a Neighbor Advertisement".into()));
        }

        let flags = buffer[4];
        let target_bytes: [u8; 16] = buffer[8..24].try_into().unwrap();

        let target_link_addr =
            parse_link_layer_option(&buffer[24..], NdpOptionType::TargetLinkLayerAddress);

        Ok(Self {
            router_flag: flags & 0x80 != 0,
            solicited_flag: flags & 0x40 != 0,
            override_flag: flags & 0x20 != 0,
            target_addr: Ipv6Addr::from(target_bytes),
            target_link_addr,
        })
    }

    /// Build the ICMPv6 message bytes (checksum zero, kernel fills it)
    pub fn to_bytes(&self) -> Vec<u8> {
        let option_len = if self.target_link_addr.is_some() { 8 } else { 0 };
        let mut buf = vec![0u8; NDP_MSG_SIZE + option_len];

        buf[0] = ND_NEIGHBOR_ADVERT;
        let mut flags = 0u8;
        if self.router_flag {
            flags |= 0x80;
        }
        if self.solicited_flag {
            flags |= 0x40;
        }
        if self.override_flag {
            flags |= 0x20;
        }
        buf[4] = flags;
        buf[8..24].copy_from_slice(&self.target_addr.octets());

        if let Some(mac) = &self.target_link_addr {
            buf[24] = NdpOptionType::TargetLinkLayerAddress as u8;
            buf[25] = 1;
            buf[26..32].copy_from_slice(&mac.0);
        }

        buf
    }
}

/// Walk the NDP option list for a link-layer address of the given type
fn parse_link_layer_option(options: &[u8], expected_type: NdpOptionType) -> Option<MacAddr> {
    let mut offset = 0;
    while offset + 2 <= options.len() {
        let opt_type = options[offset];
        let opt_len = options[offset + 1] as usize * 8;

        if opt_len == 0 || offset + opt_len > options.len() {
            // malformed or truncated option, stop walking
            break;
        }

        if opt_type == expected_type as u8 && opt_len >= 8 {
            let mac_bytes: [u8; 6] = options[offset + 2..offset + 8].try_into().ok()?;
            return Some(MacAddr(mac_bytes));
        }

        offset += opt_len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const HWADDR: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

    #[test]
    fn test_ns_roundtrip() {
        let target: Ipv6Addr = "2001:db8::42".parse().unwrap();
        let ns = NeighborSolicitation::new(target, Some(HWADDR));

        let bytes = ns.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], ND_NEIGHBOR_SOLICIT);

        let parsed = NeighborSolicitation::parse(&bytes).unwrap();
        assert_eq!(parsed.target_addr, target);
        assert_eq!(parsed.source_link_addr, Some(HWADDR));
    }

    #[test]
    fn test_ns_option_bytes() {
        let ns = NeighborSolicitation::new("fe80::1".parse().unwrap(), Some(HWADDR));
        let bytes = ns.to_bytes();

        assert_eq!(bytes[24], NdpOptionType::SourceLinkLayerAddress as u8);
        assert_eq!(bytes[25], 1);
        assert_eq!(&bytes[26..32], &HWADDR.0);
    }

    #[test]
    fn test_ns_without_option() {
        let ns = NeighborSolicitation::new("fe80::1".parse().unwrap(), None);
        let bytes = ns.to_bytes();
        assert_eq!(bytes.len(), NDP_MSG_SIZE);

        let parsed = NeighborSolicitation::parse(&bytes).unwrap();
        assert_eq!(parsed.source_link_addr, None);
    }

    #[test]
    fn test_ns_parse_rejects_advert() {
        let na = NeighborAdvertisement::reply("fe80::1".parse().unwrap(), HWADDR, true, true);
        assert!(NeighborSolicitation::parse(&na.to_bytes()).is_err());
    }

    #[test]
    fn test_ns_parse_too_short() {
        assert!(NeighborSolicitation::parse(&[ND_NEIGHBOR_SOLICIT; 20]).is_err());
    }

    #[test]
    fn test_na_roundtrip() {
        let target: Ipv6Addr = "2001:db8::42".parse().unwrap();
        let na = NeighborAdvertisement::reply(target, HWADDR, true, true);

        let bytes = na.to_bytes();
        assert_eq!(bytes[0], ND_NEIGHBOR_ADVERT);
        assert_eq!(bytes[4], 0xC0); // router | solicited

        let parsed = NeighborAdvertisement::parse(&bytes).unwrap();
        assert!(parsed.router_flag);
        assert!(parsed.solicited_flag);
        assert!(!parsed.override_flag);
        assert_eq!(parsed.target_addr, target);
        assert_eq!(parsed.target_link_addr, Some(HWADDR));
    }

    #[test]
    fn test_na_unsolicited_no_router() {
        let na = NeighborAdvertisement::reply("fe80::9".parse().unwrap(), HWADDR, false, false);
        let bytes = na.to_bytes();
        assert_eq!(bytes[4], 0x00);
    }

    #[test]
    fn test_na_target_linkaddr_option() {
        let na = NeighborAdvertisement::reply("fe80::9".parse().unwrap(), HWADDR, true, false);
        let bytes = na.to_bytes();
        assert_eq!(bytes[24], NdpOptionType::TargetLinkLayerAddress as u8);
        assert_eq!(&bytes[26..32], &HWADDR.0);
    }

    #[test]
    fn test_option_walk_skips_unknown() {
        let target: Ipv6Addr = "fe80::1".parse().unwrap();
        let mut bytes = NeighborSolicitation::new(target, None).to_bytes();
        // unknown option (MTU, type 5) followed by the source link-layer option
        bytes.extend_from_slice(&[5, 1, 0, 0, 0, 0, 5, 0xdc]);
        bytes.extend_from_slice(&[1, 1]);
        bytes.extend_from_slice(&HWADDR.0);

        let parsed = NeighborSolicitation::parse(&bytes).unwrap();
        assert_eq!(parsed.source_link_addr, Some(HWADDR));
    }

    #[test]
    fn test_option_walk_stops_on_zero_length() {
        let target: Ipv6Addr = "fe80::1".parse().unwrap();
        let mut bytes = NeighborSolicitation::new(target, None).to_bytes();
        bytes.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);

        let parsed = NeighborSolicitation::parse(&bytes).unwrap();
        assert_eq!(parsed.source_link_addr, None);
    }
}
