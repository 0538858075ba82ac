//! Controlador del despacho
//!
//! Handlers HTTP delgados sobre `DispatchService`: validan la entrada,
//! delegan y serializan. La lógica vive en `services`.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::Value;
use validator::Validate;

use crate::dto::dispatch_dto::{
    AcceptRequestBody, CandidatesResponse, HealthResponse, RequestServiceBody, RouteDisplayResponse,
};
use crate::metrics;
use crate::models::{BranchId, EngineerId, RequestId, RouteId, ServiceRequest};
use crate::services::request_lifecycle::AcceptOutcome;
use crate::state::AppState;
use crate::store::RosterSnapshot;
use crate::utils::errors::{bad_request_error, AppError, AppResult};

/// Health check con el estado de la conexión al hub
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        environment: state.config.environment.clone(),
        hub_connected: state.dispatch.is_hub_connected().await,
    })
}

/// Exposición Prometheus
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

pub async fn snapshot(State(state): State<AppState>) -> Json<RosterSnapshot> {
    Json(state.dispatch.snapshot().await)
}

/// Crear una solicitud de servicio para una sucursal
pub async fn request_service(
    State(state): State<AppState>,
    Json(body): Json<RequestServiceBody>,
) -> AppResult<(StatusCode, Json<ServiceRequest>)> {
    body.validate().map_err(AppError::Validation)?;
    log::info!("📥 Solicitud de servicio para sucursal {}", body.branch_id);

    let request = state
        .dispatch
        .request_service(&BranchId::new(body.branch_id.trim()))
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn candidates(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<CandidatesResponse>> {
    let (request, candidates) = state.dispatch.candidates_for(&RequestId::new(request_id)).await?;
    Ok(Json(CandidatesResponse {
        request_id: request.request_id,
        radius_km: request.current_radius_km,
        candidates,
    }))
}

/// Polígono GeoJSON del radio de búsqueda actual
pub async fn search_radius(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<Value>> {
    let polygon = state.dispatch.radius_polygon(&RequestId::new(request_id)).await?;
    Ok(Json(polygon))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<AcceptRequestBody>,
) -> AppResult<Json<AcceptOutcome>> {
    body.validate().map_err(AppError::Validation)?;
    log::info!("📥 Aceptación de {} por {}", request_id, body.fe_id);

    let outcome = state
        .dispatch
        .accept_request(&RequestId::new(request_id), &EngineerId::new(body.fe_id.trim()))
        .await?;
    Ok(Json(outcome))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<ServiceRequest>> {
    let request = state.dispatch.cancel_request(&RequestId::new(request_id)).await?;
    Ok(Json(request))
}

pub async fn display_route(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
) -> AppResult<Json<RouteDisplayResponse>> {
    let route_id = route_id
        .trim()
        .parse::<u64>()
        .map(RouteId)
        .map_err(|_| bad_request_error(&format!("invalid route id '{}'", route_id)))?;

    state.dispatch.select_route_for_display(route_id).await?;
    Ok(Json(RouteDisplayResponse {
        selected_route_id: Some(route_id),
    }))
}

pub async fn clear_route_display(State(state): State<AppState>) -> StatusCode {
    state.dispatch.clear_route_display().await;
    StatusCode::NO_CONTENT
}
