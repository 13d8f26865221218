//! kube-mcp backend library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, HeaderName, Method};
use axum::{middleware, routing::get, routing::post, Router};
use kube_mcp_types::MCP_ENDPOINT;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod logging;
pub mod mcp;
pub mod state;
pub mod tools;

use config::TransportMode;
use state::AppState;

/// Create the Axum application router.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app(state: AppState) -> Router {
    let mcp_router = match state.config().mode {
        TransportMode::Stateful => Router::new().route(
            MCP_ENDPOINT,
            post(api::mcp::mcp_post)
                .get(api::mcp::mcp_get)
                .delete(api::mcp::mcp_delete),
        ),
        TransportMode::Stateless => Router::new().route(
            MCP_ENDPOINT,
            post(api::stateless::stateless_post)
                .get(api::stateless::method_not_allowed)
                .delete(api::stateless::method_not_allowed),
        ),
    }
    .route_layer(middleware::from_fn_with_state(
        state.clone(),
        api::guard::host_guard,
    ));

    Router::new()
        .route("/health", get(health))
        .merge(mcp_router)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::AUTHORIZATION,
                    HeaderName::from_static(mcp::SESSION_ID_HEADER),
                ])
                .expose_headers([HeaderName::from_static(mcp::SESSION_ID_HEADER)])
                .allow_origin(Any),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
