//! The document envelope
//!
//! A document is a file plus its parsed envelope: an opaque schema URI
//! (`kind` on disk) and a schema-specific payload (`metadata` on disk).

use crate::droplet::{Droplet, DROPLET_V1_SCHEMA_URI};
use linkmeta_common::MacAddr;

/// A parsed metadata document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    schema_uri: String,
    payload: Payload,
}

impl Document {
    pub(crate) fn new(schema_uri: impl Into<String>, payload: Payload) -> Self {
        Self {
            schema_uri: schema_uri.into(),
            payload,
        }
    }

    /// The schema URI the document declared (`kind`).
    #[must_use]
    pub fn schema_uri(&self) -> &str {
        &self.schema_uri
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The hardware addresses this document claims to describe.
    #[must_use]
    pub fn data_link_addrs(&self) -> Vec<MacAddr> {
        match &self.payload {
            Payload::DropletV1(droplet) => droplet.data_link_addrs(),
        }
    }
}

/// A schema-specific payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    DropletV1(Droplet),
}

impl Payload {
    /// The schema URI this payload kind corresponds to.
    #[must_use]
    pub fn schema_uri(&self) -> &'static str {
        match self {
            Payload::DropletV1(_) => DROPLET_V1_SCHEMA_URI,
        }
    }

    #[must_use]
    pub fn as_droplet_v1(&self) -> Option<&Droplet> {
        match self {
            Payload::DropletV1(droplet) => Some(droplet),
        }
    }
}
