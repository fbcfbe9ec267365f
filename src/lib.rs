//! Raven / WLS single-sign-on for axum applications.
//!
//! [`raven`] implements the protocol: building the redirect to the
//! authentication server, parsing and verifying its signed callback.
//! [`gate::RavenGate`] drives the per-request login flow over a
//! [`session::SessionStore`], and [`middleware::raven_auth_middleware`]
//! binds it to axum.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod gate;
pub mod middleware;
pub mod observability;
pub mod raven;
pub mod routes;
pub mod session;

#[cfg(test)]
mod tests;

/// Demo application: `/` behind the gate, `/health` open.
pub fn build_app(
    config: &config::RavenGateConfig,
    gate: Arc<gate::RavenGate>,
    sessions: session::SharedSessionStore,
) -> Router {
    let auth_state = middleware::RavenAuthState::new(
        gate,
        sessions,
        config.session.clone(),
        config.server.clone(),
    );

    let protected = Router::new()
        .route("/", get(routes::home::index))
        .route_layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::raven_auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::liveness))
        .merge(protected)
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
}
