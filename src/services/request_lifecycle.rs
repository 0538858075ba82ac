//! Ciclo de vida de las solicitudes de servicio
//!
//! Pending -> Accepted | Cancelled | Expired. Todas las transiciones se hacen
//! bajo el mismo write-lock del store y releen el estado en ese momento, de
//! modo que una aceptación concurrente nunca crea dos rutas.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::route_materializer::RouteMaterializer;
use crate::models::{
    AcceptanceConfirmation, EngineerId, EngineerStatus, RequestId, RequestStatus, Route,
    ServiceRequest,
};
use crate::store::DispatchStore;
use crate::utils::errors::{conflict_error, not_found_error, AppResult};

/// Resultado de `accept`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
    pub request: ServiceRequest,
    pub route: Option<Route>,
    /// `false` cuando la solicitud ya no estaba Pending (aceptación repetida)
    pub newly_accepted: bool,
}

/// Acepta `request_id` con el engineer `fe_id`.
///
/// Si la solicitud ya no está Pending devuelve el estado existente sin tocar
/// nada. La aceptación es optimista: queda `Tentative` hasta que el backend
/// o un broadcast del hub la confirmen.
pub fn accept(
    store: &mut DispatchStore,
    request_id: &RequestId,
    fe_id: &EngineerId,
    now: DateTime<Utc>,
) -> AppResult<AcceptOutcome> {
    let request = store
        .request(request_id)
        .ok_or_else(|| not_found_error("ServiceRequest", request_id.as_str()))?;

    if !request.is_pending() {
        log::info!(
            "🔁 Solicitud {} ya está {}; aceptación ignorada",
            request_id,
            request.status
        );
        return Ok(AcceptOutcome {
            request: request.clone(),
            route: store.route_for_request(request_id).cloned(),
            newly_accepted: false,
        });
    }

    let engineer = store
        .engineer(fe_id)
        .ok_or_else(|| not_found_error("FieldEngineer", fe_id.as_str()))?
        .clone();

    if let Some(route) = store.active_route_for_engineer(fe_id) {
        return Err(conflict_error(
            "FieldEngineer",
            fe_id.as_str(),
            &format!("already assigned to route {}", route.route_id),
        ));
    }
    if engineer.status == EngineerStatus::Inactive {
        return Err(conflict_error("FieldEngineer", fe_id.as_str(), "engineer is inactive"));
    }

    let request = {
        let request = store
            .request_mut(request_id)
            .ok_or_else(|| not_found_error("ServiceRequest", request_id.as_str()))?;
        request.status = RequestStatus::Accepted;
        request.accepted_at = Some(now);
        request.accepted_by_fe_id = Some(engineer.fe_id.clone());
        request.accepted_by_fe_name = Some(engineer.name.clone());
        request.confirmation = Some(AcceptanceConfirmation::Tentative);
        request.clone()
    };

    if let Some(assigned) = store.engineer_mut(fe_id) {
        assigned.status = EngineerStatus::OnAssignment;
    }

    let route = loop {
        let route_id = store.allocate_route_id(now);
        let route = RouteMaterializer::create(&request, &engineer, route_id, now);
        if store.insert_route(route.clone()) {
            break route;
        }
        log::warn!("⚠️ Id de ruta {} ya en uso; se asigna otro", route_id);
    };
    let route_id = route.route_id;

    log::info!(
        "✅ Solicitud {} aceptada por {} ({}); ruta {} creada",
        request_id,
        engineer.name,
        fe_id,
        route_id
    );

    Ok(AcceptOutcome {
        request,
        route: Some(route),
        newly_accepted: true,
    })
}

/// Cancela una solicitud Pending; no-op si ya es terminal
pub fn cancel(store: &mut DispatchStore, request_id: &RequestId) -> AppResult<ServiceRequest> {
    let request = store
        .request_mut(request_id)
        .ok_or_else(|| not_found_error("ServiceRequest", request_id.as_str()))?;

    if close(request, RequestStatus::Cancelled) {
        log::info!("🛑 Solicitud {} cancelada", request_id);
    }
    Ok(request.clone())
}

/// Expira una solicitud Pending por el TTL local; `true` si hubo transición.
/// Queda marcada como local para que el servidor pueda reabrirla.
pub fn expire(request: &mut ServiceRequest) -> bool {
    let expired = close(request, RequestStatus::Expired);
    if expired {
        request.expired_locally = true;
        log::info!("⌛ Solicitud {} expirada sin aceptación", request.request_id);
    }
    expired
}

fn close(request: &mut ServiceRequest, terminal: RequestStatus) -> bool {
    if !request.is_pending() {
        return false;
    }
    request.status = terminal;
    true
}
