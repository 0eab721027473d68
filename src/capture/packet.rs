//! AF_PACKET capture socket
//!
//! Bound to one interface, with a classic BPF program that rejects
//! everything but IPv6/ICMPv6 Neighbor Solicitations in the kernel.

use super::{ifreq_for, set_nonblocking};
use crate::protocol::icmpv6::ND_NEIGHBOR_SOLICIT;
use crate::protocol::{ethernet, ipv6, ETHERTYPE_IPV6};
use crate::{Error, Result};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::task::{Context, Poll};
use tokio::io::unix::AsyncFd;
use tracing::debug;

// Classic BPF opcodes (linux/filter.h)
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

const fn stmt(code: u16, k: u32) -> libc::sock_filter {
    libc::sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

/// Accept only frames where ether_type is IPv6, the IPv6 next header is
/// ICMPv6 and the ICMPv6 type is Neighbor Solicitation.
static SOLICIT_FILTER: [libc::sock_filter; 8] = [
    // load ether_type
    stmt(BPF_LD | BPF_H | BPF_ABS, 12),
    jump(BPF_JMP | BPF_JEQ | BPF_K, ETHERTYPE_IPV6 as u32, 0, 5),
    // load ip6_nxt
    stmt(
        BPF_LD | BPF_B | BPF_ABS,
        (ethernet::HEADER_SIZE + 6) as u32,
    ),
    jump(BPF_JMP | BPF_JEQ | BPF_K, ipv6::NEXT_HEADER_ICMPV6 as u32, 0, 3),
    // load icmp6_type
    stmt(
        BPF_LD | BPF_B | BPF_ABS,
        (ethernet::HEADER_SIZE + ipv6::HEADER_SIZE) as u32,
    ),
    jump(BPF_JMP | BPF_JEQ | BPF_K, ND_NEIGHBOR_SOLICIT as u32, 0, 1),
    // keep
    stmt(BPF_RET | BPF_K, u32::MAX),
    // drop
    stmt(BPF_RET | BPF_K, 0),
];

/// AF_PACKET socket with interface-flag bookkeeping
///
/// `allmulti` (and optionally `promisc`) are raised at open; the
/// previous values are restored on drop.
pub struct PacketSocket {
    async_fd: AsyncFd<RawFd>,
    name: String,
    prev_allmulti: i32,
    prev_promisc: i32,
}

impl PacketSocket {
    /// Open a capture socket on the interface with the given index
    pub fn open(name: &str, index: u32, promisc: bool) -> Result<Self> {
        let protocol = (ETHERTYPE_IPV6).to_be() as libc::c_int;
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol) };
        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        if let Err(e) = Self::setup(fd, index) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let mut socket = Self {
            async_fd: AsyncFd::new(fd).map_err(|e| {
                unsafe { libc::close(fd) };
                Error::Io(e)
            })?,
            name: name.to_string(),
            prev_allmulti: -1,
            prev_promisc: -1,
        };

        socket.prev_allmulti = socket.allmulti(true)?;
        if promisc {
            socket.prev_promisc = socket.promisc(true)?;
        }

        debug!(iface = name, index, promisc, "packet socket open");
        Ok(socket)
    }

    fn setup(fd: RawFd, index: u32) -> Result<()> {
        let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as u16;
        sll.sll_protocol = (ETHERTYPE_IPV6).to_be();
        sll.sll_ifindex = index as i32;

        let ret = unsafe {
            libc::bind(
                fd,
                &sll as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        let prog = libc::sock_fprog {
            len: SOLICIT_FILTER.len() as u16,
            filter: SOLICIT_FILTER.as_ptr() as *mut libc::sock_filter,
        };

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        set_nonblocking(fd)
    }

    /// Set or clear IFF_ALLMULTI, returning the previous state (0 or 1)
    fn allmulti(&self, state: bool) -> Result<i32> {
        self.update_flags(libc::IFF_ALLMULTI as libc::c_short, state)
    }

    /// Set or clear IFF_PROMISC, returning the previous state (0 or 1)
    fn promisc(&self, state: bool) -> Result<i32> {
        self.update_flags(libc::IFF_PROMISC as libc::c_short, state)
    }

    fn update_flags(&self, flag: libc::c_short, state: bool) -> Result<i32> {
        let mut ifr = ifreq_for(&self.name)?;

        if unsafe { libc::ioctl(self.as_raw_fd(), libc::SIOCGIFFLAGS, &mut ifr) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        let flags = unsafe { ifr.ifr_ifru.ifru_flags };
        let old_state = i32::from(flags & flag != 0);

        if (flags & flag != 0) == state {
            return Ok(old_state);
        }

        ifr.ifr_ifru.ifru_flags = if state { flags | flag } else { flags & !flag };

        if unsafe { libc::ioctl(self.as_raw_fd(), libc::SIOCSIFFLAGS, &ifr) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        Ok(old_state)
    }

    /// Readiness for the daemon's poll loop; readiness is cleared, so
    /// the caller must drain the socket to `WouldBlock`.
    pub fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.async_fd.poll_read_ready(cx) {
            Poll::Ready(Ok(mut guard)) => {
                guard.clear_ready();
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Nonblocking read of one frame
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::recv(
                self.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        *self.async_fd.get_ref()
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        if self.prev_allmulti >= 0 {
            let _ = self.allmulti(self.prev_allmulti != 0);
        }
        if self.prev_promisc >= 0 {
            let _ = self.promisc(self.prev_promisc != 0);
        }
        unsafe { libc::close(self.as_raw_fd()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_shape() {
        // returns must be the last two instructions so every jump
        // offset below lands inside the program
        assert_eq!(SOLICIT_FILTER.len(), 8);
        assert_eq!(SOLICIT_FILTER[6].code, BPF_RET | BPF_K);
        assert_eq!(SOLICIT_FILTER[6].k, u32::MAX);
        assert_eq!(SOLICIT_FILTER[7].code, BPF_RET | BPF_K);
        assert_eq!(SOLICIT_FILTER[7].k, 0);

        for (i, insn) in SOLICIT_FILTER.iter().enumerate() {
            if (insn.code & 0x07) == BPF_JMP {
                assert!(i + 1 + insn.jf as usize <= 7, "jf escapes at {}", i);
            }
        }
    }

    #[test]
    fn test_filter_offsets() {
        assert_eq!(SOLICIT_FILTER[0].k, 12); // ether_type
        assert_eq!(SOLICIT_FILTER[1].k, 0x86DD);
        assert_eq!(SOLICIT_FILTER[2].k, 20); // ip6_nxt
        assert_eq!(SOLICIT_FILTER[3].k, 58);
        assert_eq!(SOLICIT_FILTER[4].k, 54); // icmp6_type
        assert_eq!(SOLICIT_FILTER[5].k, 135);
    }
}
