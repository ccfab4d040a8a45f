//! The endpoint registry
//!
//! Process-wide map from schema URI to endpoint, built once at startup and
//! read-only afterwards.

use crate::endpoint::SchemaEndpoint;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<&'static str, Arc<dyn SchemaEndpoint>>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under its schema URI.
    #[must_use]
    pub fn with(mut self, endpoint: Arc<dyn SchemaEndpoint>) -> Self {
        self.endpoints.insert(endpoint.schema_uri(), endpoint);
        self
    }

    /// The endpoint registered for a schema URI, if any.
    #[must_use]
    pub fn get(&self, schema_uri: &str) -> Option<&Arc<dyn SchemaEndpoint>> {
        self.endpoints.get(schema_uri)
    }
}
