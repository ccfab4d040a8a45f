//! Linkmeta Neighbor - kernel neighbor-cache resolution
//!
//! HTTP carries no caller identity, so the metadata service identifies each
//! peer by the hardware address the kernel's IPv4 neighbor cache (ARP) holds
//! for the peer's source address. This crate provides the platform snapshot
//! backends and the periodically-refreshed map the request path consults.

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
mod bsd;
#[cfg(target_os = "linux")]
mod linux;
mod watcher;

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub use bsd::RouteSysctlNeighborTable as PlatformNeighborTable;
#[cfg(target_os = "linux")]
pub use linux::NetlinkNeighborTable as PlatformNeighborTable;
pub use watcher::NeighborWatcher;

use linkmeta_common::{MacAddr, Result};
use std::net::Ipv4Addr;
use tokio_util::sync::CancellationToken;

/// One entry of a kernel neighbor-cache snapshot.
///
/// Backends emit only entries the kernel considers valid mappings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub interface_index: i32,
}

/// A source of fresh IPv4 neighbor-cache snapshots.
///
/// `poll` enumerates the kernel's current entries one at a time through
/// `emit`, or fails with a platform error. Nothing is retried inside `poll`;
/// the caller owns retry policy. Cancellation is checked between entries and
/// between buffer-growth retries, and entries already emitted are kept by
/// the caller.
pub trait NeighborTable: Send + Sync {
    fn poll(&self, cancel: &CancellationToken, emit: &mut dyn FnMut(NeighborEntry)) -> Result<()>;
}
