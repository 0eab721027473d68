//! Proxied network interface
//!
//! Owns the two raw sockets for one NIC and translates between wire
//! frames and decoded NDP events. Every interface carries the ICMPv6
//! socket; the capture socket is only opened on interfaces that serve
//! as a proxy upstream.

use crate::capture::{ifindex, Icmp6Socket, PacketSocket};
use crate::protocol::cidr::solicited_node;
use crate::protocol::ethernet::Frame;
use crate::protocol::icmpv6::{NeighborAdvertisement, NeighborSolicitation};
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::{MacAddr, ETHERTYPE_IPV6};
use crate::{Error, Result};
use std::io;
use std::net::Ipv6Addr;
use std::task::{Context, Poll};
use tracing::{debug, trace};

/// Receive buffer size; NDP messages are small
pub const RECV_BUF_SIZE: usize = 512;

/// Decoded Neighbor Solicitation from the packet socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solicit {
    pub saddr: Ipv6Addr,
    pub daddr: Ipv6Addr,
    pub taddr: Ipv6Addr,
}

/// Decoded Neighbor Advertisement from the ICMPv6 socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advert {
    pub saddr: Ipv6Addr,
    pub taddr: Ipv6Addr,
}

pub struct Iface {
    name: String,
    index: u32,
    icmp6: Icmp6Socket,
    packet: Option<PacketSocket>,
}

impl Iface {
    /// Open the interface with its ICMPv6 socket (enough for a
    /// downstream role). The hardware address is learned here.
    pub fn open(name: &str) -> Result<Self> {
        let index = ifindex(name)?;
        let icmp6 = Icmp6Socket::open(name, index)?;

        Ok(Self {
            name: name.to_string(),
            index,
            icmp6,
            packet: None,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn hwaddr(&self) -> MacAddr {
        self.icmp6.hwaddr()
    }

    /// Open the capture socket, making this interface an upstream
    pub fn ensure_packet_socket(&mut self, promisc: bool) -> Result<()> {
        if self.packet.is_none() {
            self.packet = Some(PacketSocket::open(&self.name, self.index, promisc)?);
        }
        Ok(())
    }

    /// Read the next queued solicitation; `None` once the socket is
    /// drained. Undecodable frames are skipped.
    pub fn read_solicit(&self, buf: &mut [u8]) -> Result<Option<Solicit>> {
        let Some(packet) = &self.packet else {
            return Ok(None);
        };

        loop {
            let len = match packet.try_recv(buf) {
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(Error::Io(e)),
            };

            match decode_solicit(&buf[..len]) {
                Ok(solicit) => {
                    trace!(iface = %self.name, ?solicit, "solicit in");
                    return Ok(Some(solicit));
                }
                Err(e) => debug!(iface = %self.name, %e, "skipping frame"),
            }
        }
    }

    /// Read the next queued advertisement; `None` once drained
    pub fn read_advert(&self, buf: &mut [u8]) -> Result<Option<Advert>> {
        loop {
            let (len, saddr) = match self.icmp6.try_recv(buf) {
                Ok(r) => r,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(Error::Io(e)),
            };

            match NeighborAdvertisement::parse(&buf[..len]) {
                Ok(na) => {
                    let advert = Advert {
                        saddr,
                        taddr: na.target_addr,
                    };
                    trace!(iface = %self.name, ?advert, "advert in");
                    return Ok(Some(advert));
                }
                Err(e) => debug!(iface = %self.name, %e, "skipping message"),
            }
        }
    }

    /// Solicit `taddr` on this link, to its solicited-node multicast
    /// group, carrying our hardware address as the source link-layer
    /// option so the answer comes back to us.
    pub fn write_solicit(&self, taddr: Ipv6Addr) -> Result<()> {
        let ns = NeighborSolicitation::new(taddr, Some(self.hwaddr()));
        let daddr = solicited_node(taddr);

        trace!(iface = %self.name, %taddr, %daddr, "solicit out");
        self.icmp6.send_to(daddr, &ns.to_bytes()).map_err(Error::Io)
    }

    /// Advertise `taddr` at our own hardware address. Solicited flag
    /// per RFC 4861: set only when replying to a unicast destination.
    pub fn write_advert(&self, daddr: Ipv6Addr, taddr: Ipv6Addr, router: bool) -> Result<()> {
        let solicited = !daddr.is_multicast();
        let na = NeighborAdvertisement::reply(taddr, self.hwaddr(), router, solicited);

        trace!(iface = %self.name, %daddr, %taddr, router, "advert out");
        self.icmp6.send_to(daddr, &na.to_bytes()).map_err(Error::Io)
    }

    /// Capture-socket readiness (upstream interfaces only)
    pub fn poll_solicit_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &self.packet {
            Some(packet) => packet.poll_ready(cx),
            None => Poll::Pending,
        }
    }

    /// ICMPv6-socket readiness
    pub fn poll_advert_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.icmp6.poll_ready(cx)
    }
}

/// `[ether][ip6][nd_neighbor_solicit][options]`
fn decode_solicit(frame: &[u8]) -> Result<Solicit> {
    let eth = Frame::parse(frame)?;
    if eth.ethertype() != ETHERTYPE_IPV6 {
        return Err(Error::Parse("not an IPv6 frame".into()));
    }

    let ip6 = Ipv6Header::parse(eth.payload())?;
    let ns = NeighborSolicitation::parse(ip6.payload())?;

    Ok(Solicit {
        saddr: ip6.src_addr(),
        daddr: ip6.dst_addr(),
        taddr: ns.target_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ipv6;

    fn make_frame(saddr: Ipv6Addr, daddr: Ipv6Addr, taddr: Ipv6Addr) -> Vec<u8> {
        let ns = NeighborSolicitation::new(taddr, Some(MacAddr([0xaa; 6])));
        let payload = ns.to_bytes();

        let mut frame = Vec::new();
        frame.extend_from_slice(&[0x33; 6]);
        frame.extend_from_slice(&[0xaa; 6]);
        frame.extend_from_slice(&ETHERTYPE_IPV6.to_be_bytes());

        let mut ip6 = vec![0u8; ipv6::HEADER_SIZE];
        ip6[0] = 0x60;
        ip6[4..6].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        ip6[6] = ipv6::NEXT_HEADER_ICMPV6;
        ip6[7] = 255;
        ip6[8..24].copy_from_slice(&saddr.octets());
        ip6[24..40].copy_from_slice(&daddr.octets());

        frame.extend_from_slice(&ip6);
        frame.extend_from_slice(&payload);
        frame
    }

    #[test]
    fn test_decode_solicit() {
        let saddr: Ipv6Addr = "fe80::1".parse().unwrap();
        let daddr: Ipv6Addr = "ff02::1:ff00:42".parse().unwrap();
        let taddr: Ipv6Addr = "2001:db8::42".parse().unwrap();

        let frame = make_frame(saddr, daddr, taddr);
        let solicit = decode_solicit(&frame).unwrap();

        assert_eq!(solicit.saddr, saddr);
        assert_eq!(solicit.daddr, daddr);
        assert_eq!(solicit.taddr, taddr);
    }

    #[test]
    fn test_decode_solicit_rejects_truncated() {
        let frame = make_frame(
            "fe80::1".parse().unwrap(),
            "ff02::1:ff00:42".parse().unwrap(),
            "2001:db8::42".parse().unwrap(),
        );

        assert!(decode_solicit(&frame[..20]).is_err());
        assert!(decode_solicit(&frame[..frame.len() - 24]).is_err());
    }
}
