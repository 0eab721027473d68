//! Raw socket capture (Linux)
//!
//! Two sockets per proxied interface: an AF_PACKET socket that captures
//! Neighbor Solicitations with a kernel BPF prefilter, and a raw ICMPv6
//! socket that exchanges the remaining NDP traffic.

mod icmp6;
mod packet;

pub use icmp6::Icmp6Socket;
pub use packet::PacketSocket;

use crate::{Error, Result};
use std::os::unix::io::RawFd;

/// Build an `ifreq` carrying the given interface name
fn ifreq_for(name: &str) -> Result<libc::ifreq> {
    if name.len() >= libc::IFNAMSIZ {
        return Err(Error::InterfaceNotFound {
            name: name.to_string(),
        });
    }

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    Ok(ifr)
}

/// Resolve an interface name to its index
pub fn ifindex(name: &str) -> Result<u32> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);

    let index = unsafe { libc::if_nametoindex(bytes.as_ptr() as *const libc::c_char) };
    if index == 0 {
        return Err(Error::InterfaceNotFound {
            name: name.to_string(),
        });
    }
    Ok(index)
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}
