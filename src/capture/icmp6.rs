//! Raw ICMPv6 socket
//!
//! Bound to one interface with SO_BINDTODEVICE. Hop limits are pinned
//! to 255 (RFC 4861 requires it on both NS and NA) and a kernel ICMPv6
//! filter admits only Neighbor Advertisements. The interface hardware
//! address is learned here at open time.

use super::{ifreq_for, set_nonblocking};
use crate::protocol::icmpv6::ND_NEIGHBOR_ADVERT;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::io;
use std::net::Ipv6Addr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::task::{Context, Poll};
use tokio::io::unix::AsyncFd;
use tracing::debug;

// netinet/icmp6.h; the libc crate does not carry these
const ICMP6_FILTER: libc::c_int = 1;

/// Kernel ICMPv6 type filter: a set bit blocks the type
#[repr(C)]
struct Icmp6Filter {
    data: [u32; 8],
}

impl Icmp6Filter {
    fn block_all_except(passed: u8) -> Self {
        let mut data = [!0u32; 8];
        data[usize::from(passed >> 5)] &= !(1 << (passed & 31));
        Self { data }
    }
}

/// Raw ICMPv6 socket bound to a single interface
pub struct Icmp6Socket {
    async_fd: AsyncFd<RawFd>,
    index: u32,
    hwaddr: MacAddr,
}

impl Icmp6Socket {
    pub fn open(name: &str, index: u32) -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET6, libc::SOCK_RAW, libc::IPPROTO_ICMPV6) };
        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        let hwaddr = match Self::setup(fd, name) {
            Ok(hwaddr) => hwaddr,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        let async_fd = AsyncFd::new(fd).map_err(|e| {
            unsafe { libc::close(fd) };
            Error::Io(e)
        })?;

        debug!(iface = name, %hwaddr, "icmp6 socket open");
        Ok(Self {
            async_fd,
            index,
            hwaddr,
        })
    }

    fn setup(fd: RawFd, name: &str) -> Result<MacAddr> {
        // Bind to the interface by name
        let ifr = ifreq_for(name)?;
        setsockopt(fd, libc::SOL_SOCKET, libc::SO_BINDTODEVICE, &ifr)?;

        // Learn the link-layer address
        let mut ifr = ifreq_for(name)?;
        if unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr) } < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let sa_data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
        let mut octets = [0u8; 6];
        for (dst, src) in octets.iter_mut().zip(sa_data.iter()) {
            *dst = *src as u8;
        }

        // NDP packets must carry hop limit 255 to be accepted
        let hops: libc::c_int = 255;
        setsockopt(fd, libc::IPPROTO_IPV6, libc::IPV6_MULTICAST_HOPS, &hops)?;
        setsockopt(fd, libc::IPPROTO_IPV6, libc::IPV6_UNICAST_HOPS, &hops)?;

        // Everything except Neighbor Advertisements is dropped in-kernel
        let filter = Icmp6Filter::block_all_except(ND_NEIGHBOR_ADVERT);
        setsockopt(fd, libc::IPPROTO_ICMPV6, ICMP6_FILTER, &filter)?;

        set_nonblocking(fd)?;

        Ok(MacAddr(octets))
    }

    pub fn hwaddr(&self) -> MacAddr {
        self.hwaddr
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

    /// Nonblocking read of one ICMPv6 message and its source address
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<(usize, Ipv6Addr)> {
        let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        let mut addrlen = std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;

        let n = unsafe {
            libc::recvfrom(
                self.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut sin6 as *mut _ as *mut libc::sockaddr,
                &mut addrlen,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok((n as usize, Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
    }

    /// Send one ICMPv6 message to `dst` out this interface
    pub fn send_to(&self, dst: Ipv6Addr, buf: &[u8]) -> io::Result<()> {
        let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sin6.sin6_addr.s6_addr = dst.octets();
        // scope for link-local and multicast destinations
        sin6.sin6_scope_id = self.index;

        let n = unsafe {
            libc::sendto(
                self.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                &sin6 as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn setsockopt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

impl AsRawFd for Icmp6Socket {
    fn as_raw_fd(&self) -> RawFd {
        *self.async_fd.get_ref()
    }
}

impl Drop for Icmp6Socket {
    fn drop(&mut self) {
        unsafe { libc::close(self.as_raw_fd()) };
    }
}
