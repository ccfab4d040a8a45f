//! DigitalOcean droplet metadata (schema `digitalocean.com/v1`)
//!
//! The payload shape follows the public Droplet metadata schema, version 1.
//! Missing scalar fields decode to their defaults; unknown fields are
//! ignored. Serialized network interfaces carry a synthetic `type` field
//! (`public`/`private`) matching the wire schema.

use linkmeta_common::{MacAddr, Nameserver, PrefixLen};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::net::{Ipv4Addr, Ipv6Addr};

pub const DROPLET_V1_SCHEMA_URI: &str = "digitalocean.com/v1";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Droplet {
    pub droplet_id: u64,
    pub hostname: String,
    pub user_data: String,
    pub vendor_data: String,
    pub public_keys: Vec<String>,
    pub region: String,
    pub interfaces: Interfaces,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floating_ip: Option<FloatingIp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub features: Features,
}

impl Droplet {
    /// Every hardware address this document claims, private interfaces
    /// first, in declaration order.
    #[must_use]
    pub fn data_link_addrs(&self) -> Vec<MacAddr> {
        let mut addrs =
            Vec::with_capacity(self.interfaces.private.len() + self.interfaces.public.len());
        for iface in &self.interfaces.private {
            addrs.push(iface.mac.clone());
        }
        for iface in &self.interfaces.public {
            addrs.push(iface.mac.clone());
        }
        addrs
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interfaces {
    pub public: Vec<PublicInterface>,
    pub private: Vec<PrivateInterface>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PublicInterface {
    pub mac: MacAddr,
    #[serde(default)]
    pub ipv4: Option<Ipv4Block>,
    #[serde(default)]
    pub ipv6: Option<Ipv6Block>,
    #[serde(default)]
    pub anchor_ipv4: Option<Ipv4Block>,
}

impl Serialize for PublicInterface {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present =
            [self.ipv4.is_some(), self.ipv6.is_some(), self.anchor_ipv4.is_some()]
                .iter()
                .filter(|p| **p)
                .count();
        let mut s = serializer.serialize_struct("PublicInterface", 2 + present)?;
        s.serialize_field("mac", &self.mac)?;
        if let Some(ipv4) = &self.ipv4 {
            s.serialize_field("ipv4", ipv4)?;
        }
        if let Some(ipv6) = &self.ipv6 {
            s.serialize_field("ipv6", ipv6)?;
        }
        if let Some(anchor) = &self.anchor_ipv4 {
            s.serialize_field("anchor_ipv4", anchor)?;
        }
        s.serialize_field("type", "public")?;
        s.end()
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PrivateInterface {
    pub mac: MacAddr,
    #[serde(default)]
    pub ipv4: Option<Ipv4Block>,
    #[serde(default)]
    pub ipv6: Option<Ipv6Block>,
}

impl Serialize for PrivateInterface {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present = [self.ipv4.is_some(), self.ipv6.is_some()]
            .iter()
            .filter(|p| **p)
            .count();
        let mut s = serializer.serialize_struct("PrivateInterface", 2 + present)?;
        s.serialize_field("mac", &self.mac)?;
        if let Some(ipv4) = &self.ipv4 {
            s.serialize_field("ipv4", ipv4)?;
        }
        if let Some(ipv6) = &self.ipv6 {
            s.serialize_field("ipv6", ipv6)?;
        }
        s.serialize_field("type", "private")?;
        s.end()
    }
}

/// An IPv4 assignment: dotted-quad address, netmask, and gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Block {
    pub ip_address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// An IPv6 assignment: address, CIDR prefix length, and gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Block {
    pub ip_address: Ipv6Addr,
    pub cidr: PrefixLen,
    pub gateway: Ipv6Addr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub ipv4: FloatingIpv4,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatingIpv4 {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<Ipv4Addr>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dns {
    pub nameservers: Vec<Nameserver>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub dhcp_enabled: bool,
}
