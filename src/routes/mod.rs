//! Routes
//!
//! Composición del router HTTP completo.

pub mod dispatch_routes;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::controllers::{dispatch_controller, map_socket_controller};
use crate::middleware::cors::cors_layer;
use crate::state::AppState;

/// Router de la aplicación con CORS y trazas
pub fn create_app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(dispatch_controller::health))
        .route("/metrics", get(dispatch_controller::prometheus_metrics))
        .route("/ws/map", get(map_socket_controller::map_socket))
        .nest("/api/dispatch", dispatch_routes::create_dispatch_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
