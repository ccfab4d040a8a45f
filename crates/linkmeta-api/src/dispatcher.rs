//! The request dispatcher
//!
//! One fallback handler fronts every route: it resolves the peer's source
//! IP to a hardware address through the neighbor watcher (with a single
//! forced re-poll on a miss), asks the store which schemas that address
//! has, and invokes the first schema URI with a registered endpoint. Every
//! failure along the way answers 404; dispatch failures never terminate
//! the pipeline.

use crate::endpoint::EndpointResponse;
use crate::registry::EndpointRegistry;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::Router;
use linkmeta_neighbor::NeighborWatcher;
use linkmeta_store::DirStore;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub watcher: Arc<NeighborWatcher>,
    pub store: Arc<DirStore>,
    pub registry: Arc<EndpointRegistry>,
}

/// The metadata service router. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the dispatcher
/// can observe the peer address.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    if request.method() != Method::GET {
        return EndpointResponse::not_found().into_response();
    }

    // identify the hardware address behind the source IP
    let IpAddr::V4(remote_ip) = peer.ip() else {
        debug!(peer = %peer, "non-IPv4 peer");
        return EndpointResponse::not_found().into_response();
    };
    let mac = match state.watcher.lookup(remote_ip) {
        Some(mac) => Some(mac),
        None => {
            // the peer may have appeared since the last tick; re-poll once
            if let Err(e) = state.watcher.force_refresh().await {
                debug!(error = %e, "forced neighbor refresh failed");
            }
            state.watcher.lookup(remote_ip)
        }
    };
    let Some(mac) = mac else {
        debug!(peer = %peer, "no neighbor entry for peer");
        return EndpointResponse::not_found().into_response();
    };
    let canonical = mac.canonical();

    // identify the schema and serve the request
    let schemas = match state.store.list_schemas(&canonical) {
        Ok(schemas) => schemas,
        Err(e) => {
            debug!(peer = %peer, datalink_addr = %canonical, error = %e, "no schemas for peer");
            return EndpointResponse::not_found().into_response();
        }
    };
    for schema_uri in &schemas {
        if let Some(endpoint) = state.registry.get(schema_uri) {
            return endpoint
                .serve(Some(&canonical), request.uri().path())
                .into_response();
        }
    }

    debug!(peer = %peer, datalink_addr = %canonical, "no registered endpoint for peer schemas");
    EndpointResponse::not_found().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digitalocean::DropletEndpointV1;
    use axum::body::Body;
    use axum::http::StatusCode;
    use linkmeta_common::{MacAddr, Result};
    use linkmeta_neighbor::{NeighborEntry, NeighborTable};
    use std::io::Write;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const MAC: &str = "52:54:00:12:34:56";
    const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    struct FixedTable {
        entries: Vec<NeighborEntry>,
    }

    impl NeighborTable for FixedTable {
        fn poll(
            &self,
            _cancel: &CancellationToken,
            emit: &mut dyn FnMut(NeighborEntry),
        ) -> Result<()> {
            for entry in &self.entries {
                emit(entry.clone());
            }
            Ok(())
        }
    }

    fn droplet_file(dir: &TempDir) {
        let doc = format!(
            r#"{{
                "kind": "digitalocean.com/v1",
                "metadata": {{
                    "droplet_id": 42,
                    "hostname": "vm1",
                    "interfaces": {{
                        "public": [{{
                            "mac": "{MAC}",
                            "ipv4": {{
                                "ip_address": "10.0.0.2",
                                "netmask": "255.255.255.0",
                                "gateway": "10.0.0.1"
                            }}
                        }}]
                    }}
                }}
            }}"#
        );
        let mut f = std::fs::File::create(dir.path().join("vm1.json")).unwrap();
        f.write_all(doc.as_bytes()).unwrap();
    }

    fn state_with(table: FixedTable, dir: &TempDir) -> AppState {
        let store = DirStore::new(16).unwrap();
        store.add_directory(dir.path()).unwrap();
        let registry =
            Arc::new(EndpointRegistry::new().with(Arc::new(DropletEndpointV1::new(store.clone()))));
        let watcher = Arc::new(NeighborWatcher::new(
            Arc::new(table),
            Duration::from_secs(3600),
        ));
        AppState {
            watcher,
            store,
            registry,
        }
    }

    fn neighbor(ip: Ipv4Addr) -> NeighborEntry {
        NeighborEntry {
            ip,
            mac: MacAddr::parse(MAC).unwrap(),
            interface_index: 2,
        }
    }

    async fn get(state: &AppState, peer: SocketAddr, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = dispatch(State(state.clone()), ConnectInfo(peer), request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_known_peer_is_served() {
        let dir = TempDir::new().unwrap();
        droplet_file(&dir);
        let state = state_with(FixedTable { entries: vec![neighbor(PEER_IP)] }, &dir);

        let peer = SocketAddr::from((PEER_IP, 41820));
        let (status, body) = get(&state, peer, "/metadata/v1/id").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "42");

        let (status, body) = get(&state, peer, "/metadata/v1/interfaces/public/0/ipv4/address").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "10.0.0.2");

        let (status, _) = get(&state, peer, "/metadata/v1/interfaces/public/1/mac").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        state.store.close();
    }

    #[tokio::test]
    async fn test_unknown_peer_is_404_even_after_refresh() {
        let dir = TempDir::new().unwrap();
        droplet_file(&dir);
        let state = state_with(FixedTable { entries: vec![] }, &dir);

        let peer = SocketAddr::from((PEER_IP, 41820));
        let (status, body) = get(&state, peer, "/metadata/v1/id").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "not found");
        state.store.close();
    }

    #[tokio::test]
    async fn test_refresh_resolves_late_neighbor() {
        // the watcher starts empty; only the forced re-poll sees the peer
        use std::sync::atomic::{AtomicUsize, Ordering};
        #[derive(Default)]
        struct SecondPollTable {
            polls: AtomicUsize,
        }
        impl NeighborTable for SecondPollTable {
            fn poll(
                &self,
                _cancel: &CancellationToken,
                emit: &mut dyn FnMut(NeighborEntry),
            ) -> Result<()> {
                if self.polls.fetch_add(1, Ordering::SeqCst) > 0 {
                    emit(neighbor(PEER_IP));
                }
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        droplet_file(&dir);
        let store = DirStore::new(16).unwrap();
        store.add_directory(dir.path()).unwrap();
        let registry =
            Arc::new(EndpointRegistry::new().with(Arc::new(DropletEndpointV1::new(store.clone()))));
        let watcher = Arc::new(NeighborWatcher::new(
            Arc::new(SecondPollTable { polls: Default::default() }),
            Duration::from_secs(3600),
        ));
        let state = AppState { watcher, store, registry };

        let peer = SocketAddr::from((PEER_IP, 41820));
        let (status, body) = get(&state, peer, "/metadata/v1/hostname").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "vm1");
        state.store.close();
    }

    #[tokio::test]
    async fn test_non_ipv4_peer_is_404() {
        let dir = TempDir::new().unwrap();
        droplet_file(&dir);
        let state = state_with(FixedTable { entries: vec![neighbor(PEER_IP)] }, &dir);

        let peer: SocketAddr = "[2001:db8::2]:41820".parse().unwrap();
        let (status, _) = get(&state, peer, "/metadata/v1/id").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        state.store.close();
    }

    #[tokio::test]
    async fn test_non_get_is_404() {
        let dir = TempDir::new().unwrap();
        droplet_file(&dir);
        let state = state_with(FixedTable { entries: vec![neighbor(PEER_IP)] }, &dir);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/metadata/v1/id")
            .body(Body::empty())
            .unwrap();
        let peer = SocketAddr::from((PEER_IP, 41820));
        let response = dispatch(State(state.clone()), ConnectInfo(peer), request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        state.store.close();
    }

    #[tokio::test]
    async fn test_peer_without_documents_is_404() {
        let dir = TempDir::new().unwrap();
        // no documents on disk at all
        let state = state_with(FixedTable { entries: vec![neighbor(PEER_IP)] }, &dir);

        let peer = SocketAddr::from((PEER_IP, 41820));
        let (status, _) = get(&state, peer, "/metadata/v1/id").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        state.store.close();
    }
}
