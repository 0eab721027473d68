//! Ethernet frame parsing
//!
//! The packet socket delivers whole frames; only untagged IPv6 frames
//! survive the kernel filter, so no VLAN handling is needed here.

use super::MacAddr;
use crate::{Error, Result};

/// Ethernet header size (without FCS)
pub const HEADER_SIZE: usize = 14;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("Ethernet frame too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr(self.buffer[0..6].try_into().unwrap())
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr(self.buffer[6..12].try_into().unwrap())
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([self.buffer[12], self.buffer[13]])
    }

    /// Payload (everything after the 14-byte header)
    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ETHERTYPE_IPV6;

    #[test]
    fn test_frame_parse() {
        let mut frame = vec![0u8; 20];
        frame[0..6].copy_from_slice(&[0x33, 0x33, 0xff, 0x00, 0x00, 0x42]);
        frame[6..12].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        frame[12..14].copy_from_slice(&ETHERTYPE_IPV6.to_be_bytes());
        frame[14] = 0x60;

        let parsed = Frame::parse(&frame).unwrap();
        assert_eq!(parsed.dst_mac(), MacAddr([0x33, 0x33, 0xff, 0x00, 0x00, 0x42]));
        assert_eq!(parsed.src_mac(), MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(parsed.ethertype(), ETHERTYPE_IPV6);
        assert_eq!(parsed.payload().len(), 6);
        assert_eq!(parsed.payload()[0], 0x60);
    }

    #[test]
    fn test_frame_too_short() {
        assert!(Frame::parse(&[0u8; 13]).is_err());
    }
}
