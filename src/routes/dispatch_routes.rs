//! Rutas del despacho
//!
//! Este módulo define las rutas de comandos y consultas del operador.

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::controllers::dispatch_controller;
use crate::state::AppState;

/// Router montado bajo `/api/dispatch`
pub fn create_dispatch_router() -> Router<AppState> {
    Router::new()
        .route("/snapshot", get(dispatch_controller::snapshot))
        .route("/service-requests", post(dispatch_controller::request_service))
        .route("/service-requests/:id/candidates", get(dispatch_controller::candidates))
        .route("/service-requests/:id/radius", get(dispatch_controller::search_radius))
        .route("/service-requests/:id/accept", post(dispatch_controller::accept_request))
        .route("/service-requests/:id/cancel", post(dispatch_controller::cancel_request))
        .route("/routes/display", delete(dispatch_controller::clear_route_display))
        .route("/routes/:id/display", post(dispatch_controller::display_route))
}
