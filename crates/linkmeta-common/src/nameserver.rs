//! Nameserver endpoints
//!
//! Documents write nameservers as strings: a bare IP literal implies port
//! 53, any other value must be a `host:port` pair. When formatting, port 53
//! is omitted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

const DNS_PORT: u16 = 53;

/// A DNS resolver endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nameserver {
    pub host: String,
    pub port: u16,
}

impl Nameserver {
    /// Parse from the document string form.
    pub fn parse(s: &str) -> Result<Self, NameserverParseError> {
        // a bare IP literal implies port 53
        if s.parse::<IpAddr>().is_ok() {
            return Ok(Self {
                host: s.to_string(),
                port: DNS_PORT,
            });
        }

        let (host, port_str) = split_host_port(s)?;
        if host.is_empty() {
            return Err(NameserverParseError::EmptyHost);
        }
        let port = if port_str.is_empty() {
            DNS_PORT
        } else {
            port_str
                .parse::<u16>()
                .map_err(|_| NameserverParseError::InvalidPort(port_str.to_string()))?
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Split `host:port`, honoring `[v6-literal]:port` brackets.
fn split_host_port(s: &str) -> Result<(&str, &str), NameserverParseError> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| NameserverParseError::MissingPort(s.to_string()))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| NameserverParseError::MissingPort(s.to_string()))?;
        return Ok((host, port));
    }
    s.rsplit_once(':')
        .ok_or_else(|| NameserverParseError::MissingPort(s.to_string()))
}

impl fmt::Display for Nameserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DNS_PORT {
            return write!(f, "{}", self.host);
        }
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Nameserver {
    type Err = NameserverParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Nameserver {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Nameserver {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing a nameserver string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameserverParseError {
    #[error("nameserver host cannot be empty")]
    EmptyHost,
    #[error("nameserver {0:?} is neither an IP literal nor host:port")]
    MissingPort(String),
    #[error("invalid nameserver port: {0:?}")]
    InvalidPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_ip_implies_port_53() {
        let ns = Nameserver::parse("8.8.8.8").unwrap();
        assert_eq!(ns.host, "8.8.8.8");
        assert_eq!(ns.port, 53);
    }

    #[test]
    fn test_bare_ipv6_implies_port_53() {
        let ns = Nameserver::parse("2001:4860:4860::8888").unwrap();
        assert_eq!(ns.host, "2001:4860:4860::8888");
        assert_eq!(ns.port, 53);
    }

    #[test]
    fn test_host_port() {
        let ns = Nameserver::parse("ns1.example.com:5353").unwrap();
        assert_eq!(ns.host, "ns1.example.com");
        assert_eq!(ns.port, 5353);
    }

    #[test]
    fn test_empty_port_defaults_to_53() {
        let ns = Nameserver::parse("ns1.example.com:").unwrap();
        assert_eq!(ns.port, 53);
    }

    #[test]
    fn test_bracketed_ipv6_with_port() {
        let ns = Nameserver::parse("[2001:db8::1]:5353").unwrap();
        assert_eq!(ns.host, "2001:db8::1");
        assert_eq!(ns.port, 5353);
    }

    #[test]
    fn test_non_numeric_port_fails() {
        assert!(matches!(
            Nameserver::parse("ns1.example.com:dns"),
            Err(NameserverParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_bare_hostname_fails() {
        assert!(matches!(
            Nameserver::parse("ns1.example.com"),
            Err(NameserverParseError::MissingPort(_))
        ));
    }

    #[test]
    fn test_format_omits_port_53() {
        let ns = Nameserver::parse("8.8.8.8").unwrap();
        assert_eq!(ns.to_string(), "8.8.8.8");
        let ns = Nameserver::parse("ns1.example.com:5353").unwrap();
        assert_eq!(ns.to_string(), "ns1.example.com:5353");
        let ns = Nameserver::parse("[2001:db8::1]:5353").unwrap();
        assert_eq!(ns.to_string(), "[2001:db8::1]:5353");
    }
}
