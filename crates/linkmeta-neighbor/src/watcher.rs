//! Periodic neighbor-cache refresh
//!
//! `NeighborWatcher` keeps a thread-safe `peer IPv4 -> hardware address`
//! map over a `NeighborTable`. A background task re-polls on a fixed
//! interval; the request path may also force a refresh after a cache miss.
//! Each refresh builds a complete new map and swaps the reference under the
//! writer lock, so a lookup observes exactly one generation, never a
//! partial merge.

use crate::{NeighborTable, NeighborEntry};
use linkmeta_common::{Error, MacAddr, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct NeighborWatcher {
    table: Arc<dyn NeighborTable>,
    map: Arc<RwLock<HashMap<Ipv4Addr, MacAddr>>>,
    cancel: CancellationToken,
}

impl NeighborWatcher {
    /// Create the watcher and start its background refresher.
    ///
    /// One synchronous poll seeds the map; a failure there is logged and
    /// the watcher starts empty (the next tick or a forced refresh will
    /// fill it). Must be called from within a tokio runtime.
    pub fn new(table: Arc<dyn NeighborTable>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let initial = match snapshot(table.as_ref(), &cancel) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "initial neighbor poll failed, starting empty");
                HashMap::new()
            }
        };
        let map = Arc::new(RwLock::new(initial));

        let ticker_table = table.clone();
        let ticker_map = map.clone();
        let ticker_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately; the periodic cadence
            // starts one full interval from now
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker_cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        // periodic failures keep the current generation
                        if let Err(e) =
                            refresh(&ticker_table, &ticker_map, &ticker_cancel).await
                        {
                            if e.is_cancelled() {
                                return;
                            }
                            debug!(error = %e, "periodic neighbor refresh failed");
                        }
                    }
                }
            }
        });

        Self { table, map, cancel }
    }

    /// The cached hardware address for a peer, if any.
    #[must_use]
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.map.read().get(&ip).cloned()
    }

    /// Synchronously re-poll the kernel and atomically replace the map.
    ///
    /// Used after a lookup miss when the caller wants to be sure; the
    /// lookup after a successful refresh is authoritative.
    pub async fn force_refresh(&self) -> Result<()> {
        refresh(&self.table, &self.map, &self.cancel).await
    }

    /// Stop the background refresher. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for NeighborWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn snapshot(
    table: &dyn NeighborTable,
    cancel: &CancellationToken,
) -> Result<HashMap<Ipv4Addr, MacAddr>> {
    let mut map = HashMap::new();
    table.poll(cancel, &mut |entry: NeighborEntry| {
        map.insert(entry.ip, entry.mac);
    })?;
    Ok(map)
}

async fn refresh(
    table: &Arc<dyn NeighborTable>,
    map: &Arc<RwLock<HashMap<Ipv4Addr, MacAddr>>>,
    cancel: &CancellationToken,
) -> Result<()> {
    let poll_table = table.clone();
    let poll_cancel = cancel.clone();
    // the poll blocks on kernel I/O, keep it off the async workers
    let fresh = tokio::task::spawn_blocking(move || snapshot(poll_table.as_ref(), &poll_cancel))
        .await
        .map_err(|e| Error::internal(format!("neighbor poll task failed: {e}")))??;

    *map.write() = fresh;
    Ok(())
}
