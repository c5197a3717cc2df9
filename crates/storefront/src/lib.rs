//! MyShop storefront library.
//!
//! Server-rendered shop front for the MyShop REST API. The binary in
//! `main.rs` only loads configuration and serves [`app`]; everything else
//! lives here so the integration tests can drive the full router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::{
    create_session_layer, csp_nonce_middleware, request_id_middleware,
    security_headers_middleware, staff_redirect_middleware,
};
use crate::state::AppState;

/// Directory holding the fingerprinted CSS and JS.
const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Build the storefront router with its full middleware stack.
///
/// Layers are listed innermost first; see [`middleware`] for the order.
pub fn app<S>(state: AppState, store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(store, state.config());

    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(axum::middleware::from_fn(staff_redirect_middleware))
        .layer(session_layer)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(csp_nonce_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
