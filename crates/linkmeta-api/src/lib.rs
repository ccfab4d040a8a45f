//! Linkmeta API - the HTTP request pipeline
//!
//! The dispatcher binds each request's source IP to a hardware address
//! through the neighbor watcher, asks the store which schemas that address
//! has, and hands the request to the first registered schema endpoint. An
//! endpoint is a read-only, path-addressed projection of a document into
//! the small plain-text resources clients expect.

pub mod digitalocean;
pub mod dispatcher;
pub mod endpoint;
pub mod registry;

pub use digitalocean::DropletEndpointV1;
pub use dispatcher::{router, AppState};
pub use endpoint::{EndpointResponse, SchemaEndpoint};
pub use registry::EndpointRegistry;
