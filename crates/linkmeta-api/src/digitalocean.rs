//! DigitalOcean v1 schema endpoint
//!
//! Projects a droplet document into the flat URL space rooted at
//! `/metadata/v1`. Every resource is a `GET`; listing pages emit one child
//! name per line (directory children carry a trailing slash), scalar
//! leaves emit the raw value with no trailing newline. Directory nodes
//! answer identically with and without the trailing slash. Missing
//! optional blocks, out-of-range indices, and non-numeric indices all
//! answer 404.

use crate::endpoint::{EndpointResponse, SchemaEndpoint};
use axum::http::StatusCode;
use linkmeta_store::droplet::{Droplet, Ipv4Block, Ipv6Block};
use linkmeta_store::{DirStore, DROPLET_V1_SCHEMA_URI};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct DropletEndpointV1 {
    store: Arc<DirStore>,
}

impl DropletEndpointV1 {
    pub fn new(store: Arc<DirStore>) -> Self {
        Self { store }
    }
}

impl SchemaEndpoint for DropletEndpointV1 {
    fn schema_uri(&self) -> &'static str {
        DROPLET_V1_SCHEMA_URI
    }

    fn serve(&self, identity: Option<&str>, path: &str) -> EndpointResponse {
        let Some(mac) = identity else {
            debug!(path, "request reached endpoint without an identity");
            return EndpointResponse::not_found();
        };

        let doc = match self.store.get_document(mac, DROPLET_V1_SCHEMA_URI) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(datalink_addr = mac, path, schema = DROPLET_V1_SCHEMA_URI,
                    error = %e, "document not found");
                return EndpointResponse::not_found();
            }
        };
        let Some(droplet) = doc.payload().as_droplet_v1() else {
            debug!(datalink_addr = mac, path, "document has the wrong payload kind");
            return EndpointResponse::not_found();
        };

        let response = match path.strip_prefix("/metadata/v1") {
            Some(".json") => match serde_json::to_string(droplet) {
                Ok(body) => EndpointResponse::json(body),
                Err(e) => {
                    error!(datalink_addr = mac, error = %e, "failed to serialize JSON");
                    EndpointResponse::internal_error()
                }
            },
            Some(".yaml") | Some(".yml") => match serde_yaml::to_string(droplet) {
                Ok(body) => EndpointResponse::text(body),
                Err(e) => {
                    error!(datalink_addr = mac, error = %e, "failed to serialize YAML");
                    EndpointResponse::internal_error()
                }
            },
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
                match render(droplet, &segments) {
                    Some(body) => EndpointResponse::text(body),
                    None => EndpointResponse::not_found(),
                }
            }
            _ => EndpointResponse::not_found(),
        };

        if response.status == StatusCode::NOT_FOUND {
            debug!(
                datalink_addr = mac,
                path,
                schema = DROPLET_V1_SCHEMA_URI,
                "resource not found"
            );
        } else {
            info!(
                datalink_addr = mac,
                path,
                schema = DROPLET_V1_SCHEMA_URI,
                status = response.status.as_u16(),
                "served metadata request"
            );
        }
        response
    }
}

/// Resolve one path below `/metadata/v1` to its plain-text body.
fn render(droplet: &Droplet, segments: &[&str]) -> Option<String> {
    match segments {
        [] => Some(root_index(droplet)),
        ["id"] => Some(droplet.droplet_id.to_string()),
        ["hostname"] => Some(droplet.hostname.clone()),
        ["user-data"] => Some(droplet.user_data.clone()),
        ["vendor-data"] => Some(droplet.vendor_data.clone()),
        ["region"] => Some(droplet.region.clone()),
        ["public-keys"] => Some(lines(&droplet.public_keys)),
        ["tags"] => Some(lines(&droplet.tags)),
        ["features"] => Some(lines(["dhcp_enabled"])),
        ["features", "dhcp_enabled"] => Some(bool_text(droplet.features.dhcp_enabled)),
        ["interfaces", rest @ ..] => render_interfaces(droplet, rest),
        ["floating_ip", rest @ ..] => render_floating_ip(droplet, rest),
        ["dns"] => Some(lines(["nameservers"])),
        ["dns", "nameservers"] => {
            let dns = droplet.dns.as_ref()?;
            Some(lines(dns.nameservers.iter().map(ToString::to_string)))
        }
        _ => None,
    }
}

fn root_index(droplet: &Droplet) -> String {
    let mut entries = vec![
        "id",
        "hostname",
        "user-data",
        "vendor-data",
        "public-keys",
        "region",
    ];
    if !droplet.interfaces.public.is_empty() || !droplet.interfaces.private.is_empty() {
        entries.push("interfaces/");
    }
    entries.push("dns/");
    if droplet.floating_ip.is_some() {
        entries.push("floating_ip/");
    }
    entries.push("tags/");
    entries.push("features/");
    lines(entries)
}

fn render_interfaces(droplet: &Droplet, rest: &[&str]) -> Option<String> {
    let interfaces = &droplet.interfaces;
    match rest {
        [] => {
            if interfaces.public.is_empty() && interfaces.private.is_empty() {
                return None;
            }
            let mut entries = Vec::with_capacity(2);
            if !interfaces.public.is_empty() {
                entries.push("public/");
            }
            if !interfaces.private.is_empty() {
                entries.push("private/");
            }
            Some(lines(entries))
        }
        [side] => {
            let count = match *side {
                "public" => interfaces.public.len(),
                "private" => interfaces.private.len(),
                _ => return None,
            };
            if count == 0 {
                return None;
            }
            Some(lines((0..count).map(|i| format!("{i}/"))))
        }
        [side, index, rest @ ..] => {
            let iface = interface(droplet, side, index)?;
            render_interface(&iface, rest)
        }
        _ => None,
    }
}

/// One network interface, viewed uniformly across the public and private
/// sides.
struct InterfaceView<'a> {
    mac: String,
    kind: &'static str,
    ipv4: Option<&'a Ipv4Block>,
    ipv6: Option<&'a Ipv6Block>,
    anchor_ipv4: Option<&'a Ipv4Block>,
}

fn interface<'a>(droplet: &'a Droplet, side: &str, index: &str) -> Option<InterfaceView<'a>> {
    let index = parse_index(index)?;
    match side {
        "public" => droplet.interfaces.public.get(index).map(|i| InterfaceView {
            mac: i.mac.to_string(),
            kind: "public",
            ipv4: i.ipv4.as_ref(),
            ipv6: i.ipv6.as_ref(),
            anchor_ipv4: i.anchor_ipv4.as_ref(),
        }),
        "private" => droplet.interfaces.private.get(index).map(|i| InterfaceView {
            mac: i.mac.to_string(),
            kind: "private",
            ipv4: i.ipv4.as_ref(),
            ipv6: i.ipv6.as_ref(),
            anchor_ipv4: None,
        }),
        _ => None,
    }
}

fn render_interface(iface: &InterfaceView<'_>, rest: &[&str]) -> Option<String> {
    match rest {
        [] => {
            let mut entries = vec!["mac", "type"];
            if iface.ipv4.is_some() {
                entries.push("ipv4/");
            }
            if iface.ipv6.is_some() {
                entries.push("ipv6/");
            }
            if iface.anchor_ipv4.is_some() {
                entries.push("anchor_ipv4/");
            }
            Some(lines(entries))
        }
        ["mac"] => Some(iface.mac.clone()),
        ["type"] => Some(iface.kind.to_string()),
        ["ipv4"] => iface.ipv4.map(|_| lines(["address", "netmask", "gateway"])),
        ["ipv4", attr] => ipv4_attr(iface.ipv4?, attr),
        ["ipv6"] => iface.ipv6.map(|_| lines(["address", "cidr", "gateway"])),
        ["ipv6", "address"] => Some(iface.ipv6?.ip_address.to_string()),
        ["ipv6", "cidr"] => Some(iface.ipv6?.cidr.to_string()),
        ["ipv6", "gateway"] => Some(iface.ipv6?.gateway.to_string()),
        ["anchor_ipv4"] => iface
            .anchor_ipv4
            .map(|_| lines(["address", "netmask", "gateway"])),
        ["anchor_ipv4", attr] => ipv4_attr(iface.anchor_ipv4?, attr),
        _ => None,
    }
}

fn ipv4_attr(block: &Ipv4Block, attr: &str) -> Option<String> {
    match attr {
        "address" => Some(block.ip_address.to_string()),
        "netmask" => Some(block.netmask.to_string()),
        "gateway" => Some(block.gateway.to_string()),
        _ => None,
    }
}

fn render_floating_ip(droplet: &Droplet, rest: &[&str]) -> Option<String> {
    let floating_ip = droplet.floating_ip.as_ref()?;
    match rest {
        [] => Some(lines(["ipv4/"])),
        ["ipv4"] => {
            if floating_ip.ipv4.active {
                Some(lines(["active", "ip_address"]))
            } else {
                Some(lines(["active"]))
            }
        }
        ["ipv4", "active"] => Some(bool_text(floating_ip.ipv4.active)),
        ["ipv4", "ip_address"] => {
            if !floating_ip.ipv4.active {
                return None;
            }
            floating_ip.ipv4.ip_address.map(|addr| addr.to_string())
        }
        _ => None,
    }
}

/// A non-negative decimal interface index; leading zeros are permitted.
fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn bool_text(v: bool) -> String {
    if v { "true" } else { "false" }.to_string()
}

/// One entry per line, each newline-terminated.
fn lines<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for item in items {
        out.push_str(item.as_ref());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const MAC: &str = "52:54:00:12:34:56";

    fn fixture() -> Droplet {
        serde_json::from_value(serde_json::json!({
            "droplet_id": 42,
            "hostname": "vm1",
            "user_data": "#cloud-config\n",
            "vendor_data": "vendor",
            "public_keys": ["ssh-ed25519 AAAA... ops", "ssh-rsa BBBB... ci"],
            "region": "nyc3",
            "interfaces": {
                "public": [{
                    "mac": MAC,
                    "ipv4": {
                        "ip_address": "10.0.0.2",
                        "netmask": "255.255.255.0",
                        "gateway": "10.0.0.1"
                    },
                    "ipv6": {
                        "ip_address": "2001:db8::2",
                        "cidr": 64,
                        "gateway": "2001:db8::1"
                    },
                    "anchor_ipv4": {
                        "ip_address": "10.17.0.5",
                        "netmask": "255.255.0.0",
                        "gateway": "10.17.0.1"
                    }
                }],
                "private": [{
                    "mac": "52:54:00:ab:cd:ef",
                    "ipv4": {
                        "ip_address": "192.168.1.2",
                        "netmask": "255.255.255.0",
                        "gateway": "192.168.1.1"
                    }
                }]
            },
            "floating_ip": {"ipv4": {"active": true, "ip_address": "203.0.113.5"}},
            "dns": {"nameservers": ["8.8.8.8", "ns1.example.com:5353"]},
            "tags": ["web", "prod"],
            "features": {"dhcp_enabled": true}
        }))
        .unwrap()
    }

    fn body(droplet: &Droplet, path: &str) -> Option<String> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        render(droplet, &segments)
    }

    #[test]
    fn test_root_index() {
        let d = fixture();
        assert_eq!(
            body(&d, "/").unwrap(),
            "id\nhostname\nuser-data\nvendor-data\npublic-keys\nregion\n\
             interfaces/\ndns/\nfloating_ip/\ntags/\nfeatures/\n"
        );
    }

    #[test]
    fn test_root_index_omits_absent_sections() {
        let mut d = fixture();
        d.floating_ip = None;
        d.interfaces.public.clear();
        d.interfaces.private.clear();
        let index = body(&d, "/").unwrap();
        assert!(!index.contains("floating_ip/"));
        assert!(!index.contains("interfaces/"));
        assert!(index.contains("dns/"));
    }

    #[test]
    fn test_scalars() {
        let d = fixture();
        assert_eq!(body(&d, "/id").unwrap(), "42");
        assert_eq!(body(&d, "/hostname").unwrap(), "vm1");
        assert_eq!(body(&d, "/user-data").unwrap(), "#cloud-config\n");
        assert_eq!(body(&d, "/vendor-data").unwrap(), "vendor");
        assert_eq!(body(&d, "/region").unwrap(), "nyc3");
    }

    #[test]
    fn test_line_lists() {
        let d = fixture();
        assert_eq!(
            body(&d, "/public-keys").unwrap(),
            "ssh-ed25519 AAAA... ops\nssh-rsa BBBB... ci\n"
        );
        assert_eq!(body(&d, "/tags").unwrap(), "web\nprod\n");
        assert_eq!(
            body(&d, "/dns/nameservers").unwrap(),
            "8.8.8.8\nns1.example.com:5353\n"
        );
    }

    #[test]
    fn test_features() {
        let d = fixture();
        assert_eq!(body(&d, "/features/").unwrap(), "dhcp_enabled\n");
        assert_eq!(body(&d, "/features/dhcp_enabled").unwrap(), "true");
    }

    #[test]
    fn test_interface_indexes() {
        let d = fixture();
        assert_eq!(body(&d, "/interfaces/").unwrap(), "public/\nprivate/\n");
        assert_eq!(body(&d, "/interfaces/public/").unwrap(), "0/\n");
        assert_eq!(
            body(&d, "/interfaces/public/0/").unwrap(),
            "mac\ntype\nipv4/\nipv6/\nanchor_ipv4/\n"
        );
        assert_eq!(
            body(&d, "/interfaces/private/0/").unwrap(),
            "mac\ntype\nipv4/\n"
        );
    }

    #[test]
    fn test_interface_attrs() {
        let d = fixture();
        assert_eq!(body(&d, "/interfaces/public/0/mac").unwrap(), MAC);
        assert_eq!(body(&d, "/interfaces/public/0/type").unwrap(), "public");
        assert_eq!(body(&d, "/interfaces/private/0/type").unwrap(), "private");
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv4/").unwrap(),
            "address\nnetmask\ngateway\n"
        );
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv4/address").unwrap(),
            "10.0.0.2"
        );
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv4/netmask").unwrap(),
            "255.255.255.0"
        );
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv4/gateway").unwrap(),
            "10.0.0.1"
        );
    }

    #[test]
    fn test_ipv6_reads_ipv6_block() {
        let d = fixture();
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv6/").unwrap(),
            "address\ncidr\ngateway\n"
        );
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv6/address").unwrap(),
            "2001:db8::2"
        );
        assert_eq!(body(&d, "/interfaces/public/0/ipv6/cidr").unwrap(), "64");
        assert_eq!(
            body(&d, "/interfaces/public/0/ipv6/gateway").unwrap(),
            "2001:db8::1"
        );
    }

    #[test]
    fn test_anchor_ipv4_public_only() {
        let d = fixture();
        assert_eq!(
            body(&d, "/interfaces/public/0/anchor_ipv4/address").unwrap(),
            "10.17.0.5"
        );
        assert!(body(&d, "/interfaces/private/0/anchor_ipv4/").is_none());
        assert!(body(&d, "/interfaces/private/0/anchor_ipv4/address").is_none());
    }

    #[test]
    fn test_index_boundaries() {
        let d = fixture();
        // index == len - 1 resolves, index == len does not
        assert!(body(&d, "/interfaces/public/0/mac").is_some());
        assert!(body(&d, "/interfaces/public/1/mac").is_none());
        assert!(body(&d, "/interfaces/public/1/").is_none());
        // leading zeros name the same index; non-integers are unknown
        assert_eq!(body(&d, "/interfaces/public/000/type").unwrap(), "public");
        assert!(body(&d, "/interfaces/public/x/mac").is_none());
        assert!(body(&d, "/interfaces/public/-1/mac").is_none());
        assert!(body(&d, "/interfaces/public/+1/mac").is_none());
    }

    #[test]
    fn test_missing_optional_blocks_are_404() {
        let d = fixture();
        assert!(body(&d, "/interfaces/private/0/ipv6/").is_none());
        assert!(body(&d, "/interfaces/private/0/ipv6/address").is_none());

        let mut bare = fixture();
        bare.interfaces.public.clear();
        bare.interfaces.private.clear();
        bare.floating_ip = None;
        bare.dns = None;
        assert!(body(&bare, "/interfaces/").is_none());
        assert!(body(&bare, "/interfaces/public/").is_none());
        assert!(body(&bare, "/floating_ip/").is_none());
        assert!(body(&bare, "/floating_ip/ipv4/active").is_none());
        assert!(body(&bare, "/dns/nameservers").is_none());
        // the dns directory itself is a fixed node
        assert_eq!(body(&bare, "/dns/").unwrap(), "nameservers\n");
    }

    #[test]
    fn test_floating_ip() {
        let d = fixture();
        assert_eq!(body(&d, "/floating_ip/").unwrap(), "ipv4/\n");
        assert_eq!(
            body(&d, "/floating_ip/ipv4/").unwrap(),
            "active\nip_address\n"
        );
        assert_eq!(body(&d, "/floating_ip/ipv4/active").unwrap(), "true");
        assert_eq!(
            body(&d, "/floating_ip/ipv4/ip_address").unwrap(),
            "203.0.113.5"
        );
    }

    #[test]
    fn test_inactive_floating_ip_hides_address() {
        let mut d = fixture();
        d.floating_ip.as_mut().unwrap().ipv4.active = false;
        assert_eq!(body(&d, "/floating_ip/ipv4/").unwrap(), "active\n");
        assert_eq!(body(&d, "/floating_ip/ipv4/active").unwrap(), "false");
        assert!(body(&d, "/floating_ip/ipv4/ip_address").is_none());
    }

    #[test]
    fn test_unknown_paths_are_404() {
        let d = fixture();
        assert!(body(&d, "/nope").is_none());
        assert!(body(&d, "/interfaces/loopback/").is_none());
        assert!(body(&d, "/interfaces/public/0/ipv4/broadcast").is_none());
        assert!(body(&d, "/id/extra").is_none());
    }

    // serve-level tests go through a real store so the endpoint resolves
    // identity and document exactly as in production

    fn endpoint_with_fixture() -> (TempDir, Arc<DirStore>, DropletEndpointV1, String) {
        let dir = TempDir::new().unwrap();
        let doc = serde_json::json!({
            "kind": DROPLET_V1_SCHEMA_URI,
            "metadata": fixture(),
        });
        let path = dir.path().join("vm1.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(doc.to_string().as_bytes()).unwrap();

        let store = DirStore::new(16).unwrap();
        store.add_directory(dir.path()).unwrap();
        let canonical = linkmeta_common::MacAddr::parse(MAC).unwrap().canonical();
        let endpoint = DropletEndpointV1::new(store.clone());
        (dir, store, endpoint, canonical)
    }

    #[test]
    fn test_serve_without_identity_is_404() {
        let (_dir, store, endpoint, _mac) = endpoint_with_fixture();
        let response = endpoint.serve(None, "/metadata/v1/id");
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "not found");
        store.close();
    }

    #[test]
    fn test_serve_unknown_identity_is_404() {
        let (_dir, store, endpoint, _mac) = endpoint_with_fixture();
        let response = endpoint.serve(Some("AAAAAAAA"), "/metadata/v1/id");
        assert_eq!(response.status, 404);
        store.close();
    }

    #[test]
    fn test_serve_scalar() {
        let (_dir, store, endpoint, mac) = endpoint_with_fixture();
        let response = endpoint.serve(Some(&mac), "/metadata/v1/id");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "42");
        store.close();
    }

    #[test]
    fn test_serve_dir_node_with_and_without_slash() {
        let (_dir, store, endpoint, mac) = endpoint_with_fixture();
        let with = endpoint.serve(Some(&mac), "/metadata/v1/features/");
        let without = endpoint.serve(Some(&mac), "/metadata/v1/features");
        assert_eq!(with, without);
        assert_eq!(with.body, "dhcp_enabled\n");
        store.close();
    }

    #[test]
    fn test_serve_full_document_round_trips() {
        let (_dir, store, endpoint, mac) = endpoint_with_fixture();
        let response = endpoint.serve(Some(&mac), "/metadata/v1.json");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/json");
        let back: Droplet = serde_json::from_str(&response.body).unwrap();
        assert_eq!(back, fixture());

        let response = endpoint.serve(Some(&mac), "/metadata/v1.yaml");
        assert_eq!(response.status, 200);
        let back: Droplet = serde_yaml::from_str(&response.body).unwrap();
        assert_eq!(back, fixture());
        store.close();
    }

    #[test]
    fn test_serve_unrelated_prefix_is_404() {
        let (_dir, store, endpoint, mac) = endpoint_with_fixture();
        assert_eq!(endpoint.serve(Some(&mac), "/metadata/v2/id").status, 404);
        assert_eq!(endpoint.serve(Some(&mac), "/metadata/v1x").status, 404);
        store.close();
    }
}
