//! Linkmetad - link-local instance metadata daemon
//!
//! Serves per-client instance metadata over plain HTTP on one or more
//! listeners (conventionally `169.254.169.254:80`), identifying each
//! client by the hardware address the kernel's neighbor cache holds for
//! its source IP.

use anyhow::{bail, Context, Result};
use clap::Parser;
use linkmeta_api::{router, AppState, DropletEndpointV1, EndpointRegistry};
use linkmeta_common::Config;
use linkmeta_neighbor::{NeighborWatcher, PlatformNeighborTable};
use linkmeta_store::DirStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "linkmetad")]
#[command(about = "Link-local instance metadata daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve metadata on, HOST:PORT (repeatable; at least one
    /// is required)
    #[arg(long)]
    metadata_bind_addr: Vec<String>,

    /// Backing store kind; "dir" is the only supported value
    #[arg(long)]
    metadata_store: Option<String>,

    /// Directory of metadata documents (repeatable)
    #[arg(long)]
    metadata_store_dir: Vec<PathBuf>,

    /// Size of the parsed-document cache
    #[arg(long)]
    metadata_store_dir_cache_size: Option<usize>,

    /// Neighbor-table refresh interval, e.g. "1ms" (minimum 1ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    neighbor_table_refresh_interval: Option<Duration>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: Config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // merge CLI flags with the config file (CLI takes precedence)
    let bind_addrs = if args.metadata_bind_addr.is_empty() {
        config.metadata.bind_addrs.clone()
    } else {
        args.metadata_bind_addr.clone()
    };
    if bind_addrs.is_empty() {
        bail!("at least one --metadata-bind-addr is required");
    }
    let store_kind = args
        .metadata_store
        .clone()
        .unwrap_or_else(|| config.store.kind.clone());
    if store_kind != "dir" {
        bail!("unknown metadata store {store_kind:?}, expected \"dir\"");
    }
    let store_dirs = if args.metadata_store_dir.is_empty() {
        config.store.dirs.clone()
    } else {
        args.metadata_store_dir.clone()
    };
    let cache_size = args
        .metadata_store_dir_cache_size
        .unwrap_or(config.store.cache_size);
    let refresh_interval = args
        .neighbor_table_refresh_interval
        .unwrap_or_else(|| config.neighbor.refresh_interval())
        .max(Duration::from_millis(1));

    // initialize the store
    let store = DirStore::new(cache_size).context("failed to create directory store")?;
    for dir in &store_dirs {
        store
            .add_directory(dir)
            .with_context(|| format!("failed to add store directory {}", dir.display()))?;
        info!(path = %dir.display(), "watching metadata directory");
    }

    // initialize the neighbor watcher
    let table = PlatformNeighborTable::new().context("failed to open neighbor table")?;
    let watcher = Arc::new(NeighborWatcher::new(Arc::new(table), refresh_interval));

    // endpoints are registered once; the registry is read-only afterwards
    let registry = Arc::new(
        EndpointRegistry::new().with(Arc::new(DropletEndpointV1::new(store.clone()))),
    );
    let app = router(AppState {
        watcher: watcher.clone(),
        store: store.clone(),
        registry,
    });

    // bind listeners
    let cancel = CancellationToken::new();
    let mut servers = JoinSet::new();
    for addr in &bind_addrs {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid bind address {addr:?}"))?;
        if !addr.is_ipv4() {
            bail!("bind address must be IPv4: {addr}");
        }
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(address = %addr, "started metadata server");

        let app = app.clone();
        let cancel = cancel.clone();
        servers.spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        });
    }

    // wait for a shutdown signal
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = terminate.recv() => info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, drain(&mut servers))
        .await
        .is_err()
    {
        warn!("grace period expired, aborting in-flight connections");
        servers.abort_all();
    }

    // release resources in reverse construction order
    watcher.close();
    store.close();
    info!("shut down cleanly");
    Ok(())
}

async fn drain(servers: &mut JoinSet<std::io::Result<()>>) {
    while let Some(result) = servers.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "metadata server error"),
            Err(e) => error!(error = %e, "metadata server task failed"),
        }
    }
}
