//! IPv6 prefix lengths
//!
//! Documents carry the CIDR prefix length either as an integer or as its
//! decimal string form; both decode to the same value.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An IPv6 CIDR prefix length in `[0, 128]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrefixLen(u8);

impl PrefixLen {
    pub fn new(len: u8) -> Result<Self, PrefixLenError> {
        if len > 128 {
            return Err(PrefixLenError::OutOfRange(u64::from(len)));
        }
        Ok(Self(len))
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PrefixLen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PrefixLen {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for PrefixLen {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PrefixLenVisitor)
    }
}

struct PrefixLenVisitor;

impl Visitor<'_> for PrefixLenVisitor {
    type Value = PrefixLen;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer in [0, 128] or its decimal string form")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        if v > 128 {
            return Err(E::custom(PrefixLenError::OutOfRange(v)));
        }
        Ok(PrefixLen(v as u8))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map_err(|_| E::custom("prefix length cannot be negative"))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let n: u64 = v
            .parse()
            .map_err(|_| E::custom(PrefixLenError::NotANumber(v.to_string())))?;
        self.visit_u64(n)
    }
}

/// Errors that can occur when creating a prefix length
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrefixLenError {
    #[error("prefix length {0} exceeds 128")]
    OutOfRange(u64),
    #[error("prefix length {0:?} is not a decimal integer")]
    NotANumber(String),
}
