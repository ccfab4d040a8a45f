//! BSD neighbor-cache snapshots over the routing-table sysctl
//!
//! The kernel's ARP entries are read with one route-dump sysctl filtered to
//! link-layer entries. The returned blob is a sequence of variable-length
//! records: an extended routing message header followed by a
//! `sockaddr_inarp` (the peer address) and a `sockaddr_dl` (the link-layer
//! address). Record lengths come from the header and cover any trailing
//! padding.

use crate::{NeighborEntry, NeighborTable};
use linkmeta_common::{Error, MacAddr, Result};
use std::net::Ipv4Addr;
use tokio_util::sync::CancellationToken;

// Extended route-dump selector (sys/socket.h private range on Darwin).
const NET_RT_DUMPX_FLAGS: libc::c_int = 9;

// Offsets within the extended routing message header (rt_msghdr_ext):
// u16 msglen, u8 version, u8 type, u32 ifp index, u32 flags, u32 reserved,
// u32 addrs bitmask, i32 pid, i32 seq, i32 errno, u32 use, u32 inits,
// 14 x u32 metrics, then reachability info (2 x u32, 2 x u64, 3 x i32,
// padded to 8). 36 + 56 + 40 bytes in total.
const RT_MSGHDR_EXT_LEN: usize = 132;

// sockaddr_inarp: u8 len, u8 family, u16 port, 4 addr, 4 srcaddr, u16 tos,
// u16 other.
const SOCKADDR_INARP_LEN: usize = 16;
const INARP_ADDR_OFFSET: usize = 4;

// sockaddr_dl prefix: u8 len, u8 family, u16 index, u8 type, u8 nlen,
// u8 alen, u8 slen, then data.
const SDL_INDEX_OFFSET: usize = 2;
const SDL_NLEN_OFFSET: usize = 5;
const SDL_ALEN_OFFSET: usize = 6;
const SDL_DATA_OFFSET: usize = 8;

/// The system ARP table, read through the route-dump sysctl.
pub struct RouteSysctlNeighborTable;

impl RouteSysctlNeighborTable {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

impl NeighborTable for RouteSysctlNeighborTable {
    fn poll(&self, cancel: &CancellationToken, emit: &mut dyn FnMut(NeighborEntry)) -> Result<()> {
        let mut mib: [libc::c_int; 6] = [
            libc::CTL_NET,
            libc::AF_ROUTE,
            0,
            libc::AF_INET,
            NET_RT_DUMPX_FLAGS,
            libc::RTF_LLINFO,
        ];

        // size the buffer with a null-probe first
        let mut needed: libc::size_t = 0;
        sysctl(&mut mib, None, &mut needed)?;
        if needed == 0 {
            return Ok(());
        }

        let buf = loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut buf = vec![0u8; needed];
            match sysctl(&mut mib, Some(&mut buf), &mut needed) {
                Ok(()) => {
                    buf.truncate(needed);
                    break buf;
                }
                // the table grew between the probe and the dump
                Err(Error::Io(e)) if e.raw_os_error() == Some(libc::ENOMEM) => {
                    needed += needed / 2;
                }
                Err(e) => return Err(e),
            }
        };

        parse_route_records(&buf, cancel, emit)
    }
}

/// Walk the dump blob record by record.
fn parse_route_records(
    buf: &[u8],
    cancel: &CancellationToken,
    emit: &mut dyn FnMut(NeighborEntry)
) -> Result<()> {
    let mut offset = 0;
    while offset + RT_MSGHDR_EXT_LEN <= buf.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let msglen = u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as usize;
        if msglen == 0 || offset + msglen > buf.len() {
            break;
        }
        if let Some(entry) = parse_record(&buf[offset..offset + msglen]) {
            emit(entry);
        }
        offset += msglen;
    }
    Ok(())
}

/// Decode one `(rt_msghdr_ext, sockaddr_inarp, sockaddr_dl)` record.
fn parse_record(record: &[u8]) -> Option<NeighborEntry> {
    let inarp = record.get(RT_MSGHDR_EXT_LEN..)?;
    if inarp.len() < SOCKADDR_INARP_LEN {
        return None;
    }
    let inarp_len = inarp[0] as usize;
    let ip = Ipv4Addr::new(
        inarp[INARP_ADDR_OFFSET],
        inarp[INARP_ADDR_OFFSET + 1],
        inarp[INARP_ADDR_OFFSET + 2],
        inarp[INARP_ADDR_OFFSET + 3],
    );

    let sdl = inarp.get(inarp_len..)?;
    if sdl.len() < SDL_DATA_OFFSET {
        return None;
    }
    let index = u16::from_ne_bytes([sdl[SDL_INDEX_OFFSET], sdl[SDL_INDEX_OFFSET + 1]]);
    let nlen = sdl[SDL_NLEN_OFFSET] as usize;
    let alen = sdl[SDL_ALEN_OFFSET] as usize;
    if alen == 0 {
        return None;
    }
    let addr = sdl.get(SDL_DATA_OFFSET + nlen..SDL_DATA_OFFSET + nlen + alen)?;
    let mac = MacAddr::from_bytes(addr).ok()?;

    Some(NeighborEntry {
        ip,
        mac,
        interface_index: i32::from(index),
    })
}

fn sysctl(mib: &mut [libc::c_int; 6], buf: Option<&mut [u8]>, len: &mut libc::size_t) -> Result<()> {
    let ptr = match buf {
        Some(buf) => buf.as_mut_ptr().cast(),
        None => std::ptr::null_mut(),
    };
    // SAFETY: mib holds 6 initialized selectors; ptr is either null (size
    // probe) or valid for *len bytes.
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as libc::c_uint,
            ptr,
            len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}
