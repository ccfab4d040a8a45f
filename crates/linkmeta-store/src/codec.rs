//! Document envelope decoding
//!
//! The file extension selects the textual codec: `.json` for JSON,
//! `.yaml`/`.yml` for YAML. Decoding is two-stage: first the envelope
//! skeleton `{ kind, metadata }` with the payload kept raw, then a
//! payload decode dispatched on `kind`. Payload syntax errors propagate
//! with the file path attached.

use crate::document::{Document, Payload};
use crate::droplet::{Droplet, DROPLET_V1_SCHEMA_URI};
use linkmeta_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct RawJsonDocument {
    kind: String,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct RawYamlDocument {
    kind: String,
    metadata: serde_yaml::Value,
}

/// Read and decode the document at `path`.
pub fn read_document(path: &Path) -> Result<Document> {
    let data = std::fs::read(path)?;
    if data.is_empty() {
        return Err(Error::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => decode_json(path, &data),
        Some("yaml") | Some("yml") => decode_yaml(path, &data),
        _ => Err(Error::UnsupportedExtension {
            path: path.to_path_buf(),
        }),
    }
}

fn decode_json(path: &Path, data: &[u8]) -> Result<Document> {
    let raw: RawJsonDocument =
        serde_json::from_slice(data).map_err(|e| Error::parse(path, e))?;
    let payload = match raw.kind.as_str() {
        DROPLET_V1_SCHEMA_URI => {
            let droplet: Droplet =
                serde_json::from_value(raw.metadata).map_err(|e| Error::parse(path, e))?;
            Payload::DropletV1(droplet)
        }
        other => return Err(Error::UnknownSchema(other.to_string())),
    };
    Ok(Document::new(raw.kind, payload))
}

fn decode_yaml(path: &Path, data: &[u8]) -> Result<Document> {
    let raw: RawYamlDocument =
        serde_yaml::from_slice(data).map_err(|e| Error::parse(path, e))?;
    let payload = match raw.kind.as_str() {
        DROPLET_V1_SCHEMA_URI => {
            let droplet: Droplet =
                serde_yaml::from_value(raw.metadata).map_err(|e| Error::parse(path, e))?;
            Payload::DropletV1(droplet)
        }
        other => return Err(Error::UnknownSchema(other.to_string())),
    };
    Ok(Document::new(raw.kind, payload))
}
