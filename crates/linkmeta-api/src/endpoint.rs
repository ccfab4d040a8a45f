//! Schema endpoints
//!
//! A schema endpoint serves every resource of one document schema. The
//! dispatcher resolves the caller's canonical hardware address and passes
//! it as the request identity; an endpoint invoked without an identity
//! answers 404 for every path. Identity is request-scoped state set by the
//! dispatcher alone, never read from anything a client controls.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// A rendered resource, ready to become an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl EndpointResponse {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            content_type: "text/plain; charset=utf-8",
            body: "not found".to_string(),
        }
    }

    pub fn internal_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            content_type: "text/plain; charset=utf-8",
            body: "internal error".to_string(),
        }
    }
}

impl IntoResponse for EndpointResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// A read-only, path-addressed view over one document schema.
pub trait SchemaEndpoint: Send + Sync {
    /// The schema URI this endpoint serves.
    fn schema_uri(&self) -> &'static str;

    /// Serve one `GET`. `identity` is the canonical hardware address the
    /// dispatcher resolved for the peer, absent when resolution never
    /// happened.
    fn serve(&self, identity: Option<&str>, path: &str) -> EndpointResponse;
}
