//! Dump the kernel's IPv4 neighbor cache, one entry per line.

use anyhow::{Context, Result};
use clap::Parser;
use linkmeta_neighbor::{NeighborTable, PlatformNeighborTable};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "linkmeta-neighbors")]
#[command(about = "Dump the kernel's IPv4 neighbor cache")]
#[command(version)]
struct Args {}

fn main() -> Result<()> {
    let _args = Args::parse();

    let table = PlatformNeighborTable::new().context("failed to open neighbor table")?;
    let cancel = CancellationToken::new();
    table
        .poll(&cancel, &mut |entry| {
            println!("{}\t{}\t{}", entry.interface_index, entry.ip, entry.mac);
        })
        .context("failed to poll neighbor table")?;
    Ok(())
}
