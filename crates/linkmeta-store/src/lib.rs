//! Linkmeta Store - filesystem-backed metadata documents
//!
//! Metadata lives on disk as one schema-tagged document per file. This
//! crate parses the document envelope, indexes documents by the hardware
//! addresses they claim, keeps the indexes coherent with filesystem
//! mutations, and fronts parsing with a bounded adaptive-replacement cache.

pub mod cache;
pub mod codec;
pub mod dir;
pub mod document;
pub mod droplet;

pub use cache::ArcCache;
pub use dir::DirStore;
pub use document::{Document, Payload};
pub use droplet::{Droplet, DROPLET_V1_SCHEMA_URI};
