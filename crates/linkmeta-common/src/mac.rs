//! Hardware (data-link) addresses
//!
//! A `MacAddr` is the 6-, 8-, or 20-octet address of the NIC a peer used to
//! reach this host (EUI-48, EUI-64, IPoIB). It has two string forms: the
//! *canonical* form (standard base64 over the raw octets) used as the key in
//! every in-memory index, and the *human-readable* form (colon-separated hex
//! octets) used in documents and responses.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A "media access control" address
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MacAddr(Vec<u8>);

impl MacAddr {
    /// Create from raw octets (validates the length)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MacParseError> {
        match bytes.len() {
            6 | 8 | 20 => Ok(Self(bytes.to_vec())),
            n => Err(MacParseError::InvalidLength(n)),
        }
    }

    /// Parse from colon- or hyphen-separated hex octets
    pub fn parse(s: &str) -> Result<Self, MacParseError> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut bytes = Vec::with_capacity(6);
        for group in s.split(sep) {
            if group.len() != 2 {
                return Err(MacParseError::InvalidOctet(group.to_string()));
            }
            let octet = u8::from_str_radix(group, 16)
                .map_err(|_| MacParseError::InvalidOctet(group.to_string()))?;
            bytes.push(octet);
        }
        Self::from_bytes(&bytes)
    }

    /// The standard base64 encoding of the raw octets, stable across
    /// formatting choices. This is the key used in all in-memory indexes.
    #[must_use]
    pub fn canonical(&self) -> String {
        BASE64.encode(&self.0)
    }

    /// The raw octets
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{octet:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing a hardware address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    #[error("hardware address must be 6, 8, or 20 octets, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex octet: {0:?}")]
    InvalidOctet(String),
}
