//! Linux neighbor-cache snapshots over rtnetlink
//!
//! One `RTM_GETNEIGH` dump request is written to a `NETLINK_ROUTE` datagram
//! socket, filtered to `AF_INET` entries in the `NUD_REACHABLE` state. Reply
//! datagrams accumulate in a growable buffer until the kernel signals the
//! end of the dump; the buffer is then walked as a stream of aligned netlink
//! messages whose routing attributes carry the peer address (`NDA_DST`) and
//! link-layer address (`NDA_LLADDR`).

use crate::{NeighborEntry, NeighborTable};
use linkmeta_common::{Error, MacAddr, Result};
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use tokio_util::sync::CancellationToken;

// Netlink protocol constants (linux/netlink.h, linux/rtnetlink.h,
// linux/neighbour.h). Values are part of the kernel ABI.
const RTM_GETNEIGH: u16 = 30;
const NLM_F_REQUEST: u16 = 0x01;
const NLM_F_MULTI: u16 = 0x02;
const NLM_F_DUMP: u16 = 0x300;
const NLMSG_NOOP: u16 = 0x1;
const NLMSG_ERROR: u16 = 0x2;
const NLMSG_DONE: u16 = 0x3;
const NUD_REACHABLE: u16 = 0x02;
const NDA_DST: u16 = 1;
const NDA_LLADDR: u16 = 2;

const NLMSG_HDRLEN: usize = 16;
const NDMSG_LEN: usize = 12;
const RTA_HDRLEN: usize = 4;
const ALIGNTO: usize = 4;

const fn align(len: usize) -> usize {
    (len + ALIGNTO - 1) & !(ALIGNTO - 1)
}

/// The system ARP table, read through rtnetlink.
pub struct NetlinkNeighborTable;

impl NetlinkNeighborTable {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

impl NeighborTable for NetlinkNeighborTable {
    fn poll(&self, cancel: &CancellationToken, emit: &mut dyn FnMut(NeighborEntry)) -> Result<()> {
        let socket = NetlinkSocket::open()?;
        socket.send(&dump_request())?;

        let mut buf = Vec::with_capacity(1 << 13);
        // a datagram read truncates silently, so the chunk must cover the
        // largest message the kernel will hand back in one dump part
        let mut chunk = [0u8; 1 << 15];
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = socket.recv(&mut chunk)?;
            if n < NLMSG_HDRLEN {
                return Err(Error::BadNetlinkMessage);
            }
            buf.extend_from_slice(&chunk[..n]);

            // The first header of each datagram tells us whether the dump
            // continues: a multipart message keeps going until NLMSG_DONE.
            let header = NlMsgHdr::read(&chunk[..n]).ok_or(Error::BadNetlinkMessage)?;
            if header.kind == NLMSG_ERROR {
                return Err(Error::Netlink("dump request rejected".to_string()));
            }
            if header.kind == NLMSG_DONE || header.flags & NLM_F_MULTI == 0 {
                break;
            }
        }

        parse_neighbor_messages(&buf, cancel, emit)
    }
}

/// The fixed header of every netlink message.
struct NlMsgHdr {
    len: usize,
    kind: u16,
    flags: u16,
}

impl NlMsgHdr {
    fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < NLMSG_HDRLEN {
            return None;
        }
        Some(Self {
            len: u32::from_ne_bytes(buf[0..4].try_into().ok()?) as usize,
            kind: u16::from_ne_bytes(buf[4..6].try_into().ok()?),
            flags: u16::from_ne_bytes(buf[6..8].try_into().ok()?),
        })
    }
}

/// Walk a buffer of netlink messages and emit one entry per reachable IPv4
/// neighbor. Pure over the buffer so it is testable without a socket.
fn parse_neighbor_messages(
    buf: &[u8],
    cancel: &CancellationToken,
    emit: &mut dyn FnMut(NeighborEntry),
) -> Result<()> {
    let mut offset = 0;
    while offset + NLMSG_HDRLEN <= buf.len() {
        let header = NlMsgHdr::read(&buf[offset..]).ok_or(Error::BadNetlinkMessage)?;
        if header.len < NLMSG_HDRLEN {
            return Err(Error::BadNetlinkMessage);
        }
        if offset + header.len > buf.len() {
            // truncated trailing message, end of the stream
            break;
        }
        match header.kind {
            NLMSG_ERROR => {
                return Err(Error::Netlink("error message in dump".to_string()));
            }
            NLMSG_DONE => break,
            NLMSG_NOOP => {}
            _ => {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let message = &buf[offset..offset + header.len];
                if let Some(entry) = parse_neighbor(message) {
                    emit(entry);
                }
            }
        }
        offset += align(header.len);
    }
    Ok(())
}

/// Decode one `RTM_GETNEIGH` reply: the fixed `ndmsg` followed by routing
/// attributes. Returns `None` for entries that are not complete IPv4
/// neighbors.
fn parse_neighbor(message: &[u8]) -> Option<NeighborEntry> {
    let payload = &message[NLMSG_HDRLEN..];
    if payload.len() < NDMSG_LEN {
        return None;
    }
    let family = payload[0];
    let ifindex = i32::from_ne_bytes(payload[4..8].try_into().ok()?);
    if i32::from(family) != libc::AF_INET {
        return None;
    }

    let mut dst: Option<Ipv4Addr> = None;
    let mut lladdr: Option<MacAddr> = None;

    let mut attrs = &payload[align(NDMSG_LEN)..];
    while attrs.len() >= RTA_HDRLEN {
        let rta_len = u16::from_ne_bytes(attrs[0..2].try_into().ok()?) as usize;
        let rta_type = u16::from_ne_bytes(attrs[2..4].try_into().ok()?);
        if rta_len < RTA_HDRLEN || rta_len > attrs.len() {
            break;
        }
        let value = &attrs[RTA_HDRLEN..rta_len];
        match rta_type {
            NDA_DST => {
                let octets: [u8; 4] = value.try_into().ok()?;
                dst = Some(Ipv4Addr::from(octets));
            }
            NDA_LLADDR => {
                lladdr = MacAddr::from_bytes(value).ok();
            }
            _ => {}
        }
        let advance = align(rta_len);
        if advance >= attrs.len() {
            break;
        }
        attrs = &attrs[advance..];
    }

    Some(NeighborEntry {
        ip: dst?,
        mac: lladdr?,
        interface_index: ifindex,
    })
}

/// The serialized dump request: one netlink header plus an `ndmsg` asking
/// for reachable IPv4 neighbors.
fn dump_request() -> Vec<u8> {
    let len = NLMSG_HDRLEN + NDMSG_LEN;
    let mut buf = Vec::with_capacity(len);
    // nlmsghdr
    buf.extend_from_slice(&(len as u32).to_ne_bytes());
    buf.extend_from_slice(&RTM_GETNEIGH.to_ne_bytes());
    buf.extend_from_slice(&(NLM_F_REQUEST | NLM_F_DUMP).to_ne_bytes());
    buf.extend_from_slice(&1u32.to_ne_bytes()); // seq
    buf.extend_from_slice(&(std::process::id()).to_ne_bytes()); // pid
    // ndmsg
    buf.push(libc::AF_INET as u8);
    buf.push(0); // pad
    buf.extend_from_slice(&0u16.to_ne_bytes()); // pad
    buf.extend_from_slice(&0i32.to_ne_bytes()); // ifindex
    buf.extend_from_slice(&NUD_REACHABLE.to_ne_bytes());
    buf.push(0); // flags
    buf.push(0); // type
    buf
}

/// An open `NETLINK_ROUTE` socket, closed on drop.
struct NetlinkSocket {
    fd: RawFd,
}

impl NetlinkSocket {
    fn open() -> Result<Self> {
        // SAFETY: plain syscall; the fd is owned by the returned value.
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                libc::NETLINK_ROUTE,
            )
        };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        let socket = Self { fd };

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        // SAFETY: addr is a fully initialized sockaddr_nl.
        let rc = unsafe {
            libc::bind(
                socket.fd,
                std::ptr::addr_of!(addr).cast(),
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(socket)
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        // SAFETY: buf is valid for buf.len() bytes.
        let n = unsafe { libc::send(self.fd, buf.as_ptr().cast(), buf.len(), 0) };
        if n < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        // SAFETY: buf is valid for buf.len() bytes of writes.
        let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
        if n < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(n as usize)
    }
}

impl Drop for NetlinkSocket {
    fn drop(&mut self) {
        // SAFETY: fd is owned and open.
        unsafe { libc::close(self.fd) };
    }
}
