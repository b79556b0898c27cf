//! HTTP Module
//!
//! The axum transport in front of the resource tree. There is a single catch-all route:
//! the request path is the resource path, and the tree decides what it means.
//!
//! ## Submodules
//! - **`handlers`**: Request parsing (JSON, raw and multipart bodies) and response writing.
//!
//! CORS is a `tower_http` layer around the whole router.

pub mod handlers;

use axum::http::{HeaderName, Method, header};
use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::resource::tree::ResourceTree;

/// Browsers may call from any origin; the origin is echoed back rather than wildcarded.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            HeaderName::from_static("x-csrf-token"),
            header::AUTHORIZATION,
        ])
}

pub fn router(tree: Arc<ResourceTree>) -> Router {
    Router::new()
        .fallback(handlers::handle_request)
        .layer(Extension(tree))
        .layer(cors())
}

#[cfg(test)]
mod tests;
