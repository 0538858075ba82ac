//! Reconciliación de eventos del hub con el roster local
//!
//! Una sola tabla de despacho sobre `HubEvent`. Cada evento es un upsert por
//! identidad con payload parcial: sólo los campos presentes sobreescriben.
//! Política de staleness:
//! - con versión: se aplica sólo si es estrictamente más nueva (el servidor gana)
//! - sin versión: no se permite volver de un estado terminal a otro estado,
//!   salvo la expiración por TTL local, que el servidor siempre puede revertir
//! - rutas completadas quedan marcadas y no resucitan

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::dto::hub_dto::{HubEvent, HubEventKind};
use crate::metrics::HUB_EVENTS;
use crate::models::{
    Branch, BranchPatch, EngineerId, EngineerPatch, EngineerStatus, FieldEngineer, RadiusAuthority,
    RequestId, RequestPatch, RequestStatus, Route, RouteId, RoutePatch, ServiceRequest,
};
use crate::store::DispatchStore;
use crate::utils::validation::{validate_latitude, validate_longitude};

/// Qué pasó con un evento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Removed,
    /// Más viejo que lo ya conocido; el estado no cambia
    Stale,
    /// Sin efecto sobre las entidades (liveness, errores, duplicados de borrado)
    Ignored,
    /// Payload sin identidad o incompleto
    Dropped,
}

impl MergeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MergeOutcome::Inserted => "inserted",
            MergeOutcome::Updated => "updated",
            MergeOutcome::Removed => "removed",
            MergeOutcome::Stale => "stale",
            MergeOutcome::Ignored => "ignored",
            MergeOutcome::Dropped => "dropped",
        }
    }
}

/// Trabajo asíncrono que el llamador debe disparar fuera del lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// La ruta todavía no tiene métricas de viaje
    Enrich(RouteId),
    /// El engineer se movió; sus rutas pueden necesitar re-enriquecerse
    EngineerMoved(EngineerId),
    /// Cambió el estado de la ruta seleccionada en el mapa
    Repaint(RouteId),
    /// La ruta seleccionada dejó de existir
    ClearDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: MergeOutcome,
    pub follow_ups: Vec<FollowUp>,
}

impl Reconciliation {
    fn of(outcome: MergeOutcome) -> Self {
        Self {
            outcome,
            follow_ups: Vec::new(),
        }
    }

    fn with(outcome: MergeOutcome, follow_ups: Vec<FollowUp>) -> Self {
        Self { outcome, follow_ups }
    }
}

pub struct EventReconciler {
    initial_radius_km: f64,
}

impl EventReconciler {
    pub fn new(initial_radius_km: f64) -> Self {
        Self { initial_radius_km }
    }

    /// Aplica un evento al store. Nunca falla: lo inválido se descarta con warning.
    pub fn apply(&self, store: &mut DispatchStore, event: HubEvent, now: DateTime<Utc>) -> Reconciliation {
        let kind = event.kind();
        let result = match event {
            HubEvent::EngineerUpdated(patch) => self.merge_engineer(store, patch),
            HubEvent::BranchUpserted(patch) => self.merge_branch(store, patch),
            HubEvent::RequestCreated(patch) | HubEvent::RequestUpdated(patch) => {
                self.merge_request(store, patch, now)
            }
            HubEvent::RouteCreated(patch) | HubEvent::RouteUpdated(patch) => {
                self.merge_route(store, patch, now)
            }
            HubEvent::RouteCompleted(route_id) => self.complete_route(store, route_id),
            HubEvent::Connected => {
                log::info!("🔌 Hub conectado");
                store.set_hub_connected(true);
                Reconciliation::of(MergeOutcome::Ignored)
            }
            HubEvent::Disconnected => {
                log::warn!("🔌 Hub desconectado; el roster se conserva");
                store.set_hub_connected(false);
                Reconciliation::of(MergeOutcome::Ignored)
            }
            HubEvent::Error(message) => {
                log::warn!("⚠️ Error reportado por el hub: {}", message);
                Reconciliation::of(MergeOutcome::Ignored)
            }
        };

        HUB_EVENTS
            .with_label_values(&[kind.label(), result.outcome.label()])
            .inc();
        result
    }

    /// Registra en métricas un evento que no pudo decodificarse
    pub fn record_undecodable(&self, kind: &str) {
        HUB_EVENTS.with_label_values(&[kind, MergeOutcome::Dropped.label()]).inc();
    }

    /// Merge del polling REST: mismas reglas que los eventos, sin versión
    pub fn apply_roster(
        &self,
        store: &mut DispatchStore,
        branches: Vec<Value>,
        engineers: Vec<Value>,
        requests: Vec<Value>,
        now: DateTime<Utc>,
    ) -> Vec<FollowUp> {
        let batches = [
            (HubEventKind::BranchUpdate, branches),
            (HubEventKind::FieldEngineerUpdate, engineers),
            (HubEventKind::ServiceRequestUpdate, requests),
        ];

        let mut follow_ups = Vec::new();
        for (kind, items) in batches {
            for item in items {
                match HubEvent::decode_kind(kind, item) {
                    Ok(event) => follow_ups.extend(self.apply(store, event, now).follow_ups),
                    Err(e) => {
                        log::warn!("⚠️ Entidad del roster descartada: {}", e);
                        self.record_undecodable(kind.label());
                    }
                }
            }
        }
        follow_ups
    }

    fn merge_engineer(&self, store: &mut DispatchStore, patch: EngineerPatch) -> Reconciliation {
        let Some(fe_id) = patch.fe_id.clone().filter(|id| !id.is_blank()) else {
            log::warn!("⚠️ fieldEngineerUpdate sin feId descartado");
            return Reconciliation::of(MergeOutcome::Dropped);
        };

        if !position_in_range(patch.latitude, patch.longitude) {
            log::warn!(
                "⚠️ Posición fuera de rango para engineer {} ({:?}, {:?}); descartado",
                fe_id,
                patch.latitude,
                patch.longitude
            );
            return Reconciliation::of(MergeOutcome::Dropped);
        }

        if let Some(engineer) = store.engineer_mut(&fe_id) {
            let moved = engineer.apply_patch(&patch);
            let follow_ups = if moved {
                vec![FollowUp::EngineerMoved(fe_id)]
            } else {
                Vec::new()
            };
            return Reconciliation::with(MergeOutcome::Updated, follow_ups);
        }

        match FieldEngineer::from_patch(fe_id.clone(), &patch) {
            Some(engineer) => {
                log::debug!("👷 Nuevo engineer {} en el roster", fe_id);
                store.upsert_engineer(engineer);
                Reconciliation::of(MergeOutcome::Inserted)
            }
            None => {
                log::warn!("⚠️ Engineer {} desconocido y sin posición; descartado", fe_id);
                Reconciliation::of(MergeOutcome::Dropped)
            }
        }
    }

    fn merge_branch(&self, store: &mut DispatchStore, patch: BranchPatch) -> Reconciliation {
        let Some(branch_id) = patch.branch_id.clone().filter(|id| !id.is_blank()) else {
            log::warn!("⚠️ branchUpdate sin branchId descartado");
            return Reconciliation::of(MergeOutcome::Dropped);
        };

        if !position_in_range(patch.latitude, patch.longitude) {
            log::warn!(
                "⚠️ Posición fuera de rango para sucursal {} ({:?}, {:?}); descartada",
                branch_id,
                patch.latitude,
                patch.longitude
            );
            return Reconciliation::of(MergeOutcome::Dropped);
        }

        if let Some(branch) = store.branch_mut(&branch_id) {
            branch.apply_patch(&patch);
            return Reconciliation::of(MergeOutcome::Updated);
        }

        match Branch::from_patch(branch_id.clone(), &patch) {
            Some(branch) => {
                store.upsert_branch(branch);
                Reconciliation::of(MergeOutcome::Inserted)
            }
            None => {
                log::warn!("⚠️ Sucursal {} sin posición; descartada", branch_id);
                Reconciliation::of(MergeOutcome::Dropped)
            }
        }
    }

    fn merge_request(&self, store: &mut DispatchStore, patch: RequestPatch, now: DateTime<Utc>) -> Reconciliation {
        let Some(request_id) = patch.request_id.clone().filter(|id| !id.is_blank()) else {
            log::warn!("⚠️ Evento de solicitud sin requestId descartado");
            return Reconciliation::of(MergeOutcome::Dropped);
        };

        if !position_in_range(patch.latitude, patch.longitude) {
            log::warn!("⚠️ Posición fuera de rango para solicitud {}; descartada", request_id);
            return Reconciliation::of(MergeOutcome::Dropped);
        }

        let Some(current) = store.request(&request_id) else {
            let fallback = patch
                .branch_id
                .as_ref()
                .and_then(|id| store.branch(id))
                .map(|branch| (branch.name.clone(), branch.coordinate));
            let created = ServiceRequest::from_patch(
                request_id.clone(),
                &patch,
                fallback.as_ref().map(|(name, coordinate)| (name.as_str(), *coordinate)),
                self.initial_radius_km,
                now,
            );
            return match created {
                Some(request) => {
                    log::info!("🆕 Solicitud {} recibida ({})", request_id, request.status);
                    store.upsert_request(request);
                    Reconciliation::of(MergeOutcome::Inserted)
                }
                None => {
                    log::warn!("⚠️ Solicitud {} sin sucursal ni posición; descartada", request_id);
                    Reconciliation::of(MergeOutcome::Dropped)
                }
            };
        };

        if let Some(reason) = request_staleness(current, &patch) {
            log::debug!("⏭️ Actualización de {} ignorada: {}", request_id, reason);
            return Reconciliation::of(MergeOutcome::Stale);
        }

        if let Some(request) = store.request_mut(&request_id) {
            let reopened = request.expired_locally && patch.status == Some(RequestStatus::Pending);
            request.apply_patch(&patch);
            if reopened {
                // El servidor la mantiene abierta pasado el TTL: su ciclo de vida es del servidor
                log::info!("♻️ Solicitud {} reabierta por el servidor tras expirar localmente", request_id);
                request.radius_authority = RadiusAuthority::Server;
            }
        }
        let follow_ups = supersede_local_route(store, &request_id);
        Reconciliation::with(MergeOutcome::Updated, follow_ups)
    }

    fn merge_route(&self, store: &mut DispatchStore, patch: RoutePatch, now: DateTime<Utc>) -> Reconciliation {
        let Some(route_id) = patch.route_id else {
            log::warn!("⚠️ Evento de ruta sin routeId descartado");
            return Reconciliation::of(MergeOutcome::Dropped);
        };

        if store.is_route_completed(route_id) {
            log::debug!("⏭️ Ruta {} ya completada; evento ignorado", route_id);
            return Reconciliation::of(MergeOutcome::Stale);
        }

        if Route::patch_completes(&patch) {
            return self.complete_route(store, Some(route_id));
        }

        let selected = store.selected_route() == Some(route_id);

        if let Some(route) = store.route_mut(route_id) {
            if let (Some(incoming), Some(known)) = (patch.version, route.version) {
                if incoming <= known {
                    log::debug!("⏭️ Ruta {} versión {} <= {}; ignorada", route_id, incoming, known);
                    return Reconciliation::of(MergeOutcome::Stale);
                }
            }
            let before = route.status;
            route.apply_patch(&patch);
            let follow_ups = if selected && before != route.status {
                vec![FollowUp::Repaint(route_id)]
            } else {
                Vec::new()
            };
            return Reconciliation::with(MergeOutcome::Updated, follow_ups);
        }

        let Some(mut route) = Route::from_patch(route_id, &patch, now) else {
            log::warn!("⚠️ Ruta {} sin engineer o sucursal; descartada", route_id);
            return Reconciliation::of(MergeOutcome::Dropped);
        };

        if route.fe_name.is_empty() {
            if let Some(engineer) = store.engineer(&route.fe_id) {
                route.fe_name = engineer.name.clone();
            }
        }
        if route.branch_name.is_empty() {
            if let Some(branch) = store.branch(&route.branch_id) {
                route.branch_name = branch.name.clone();
            }
        }

        let needs_enrichment = route.enrichment.is_calculating();
        if !store.insert_route(route) {
            log::warn!("⚠️ Id de ruta {} ya en uso; evento del hub ignorado", route_id);
            return Reconciliation::of(MergeOutcome::Stale);
        }
        log::info!("🛣️ Ruta {} agregada desde el hub", route_id);

        let follow_ups = if needs_enrichment {
            vec![FollowUp::Enrich(route_id)]
        } else {
            Vec::new()
        };
        Reconciliation::with(MergeOutcome::Inserted, follow_ups)
    }

    fn complete_route(&self, store: &mut DispatchStore, route_id: Option<RouteId>) -> Reconciliation {
        let Some(route_id) = route_id else {
            log::warn!("⚠️ routeCompleted sin routeId descartado");
            return Reconciliation::of(MergeOutcome::Dropped);
        };

        let was_selected = store.selected_route() == Some(route_id);
        let Some(route) = store.complete_route(route_id) else {
            return Reconciliation::of(MergeOutcome::Ignored);
        };

        release_engineer(store, &route.fe_id);
        log::info!("🏁 Ruta {} completada por {}", route_id, route.fe_name);

        let follow_ups = if was_selected {
            vec![FollowUp::ClearDisplay]
        } else {
            Vec::new()
        };
        Reconciliation::with(MergeOutcome::Removed, follow_ups)
    }
}

/// Coordenadas parciales de un payload: cada valor presente debe estar en rango
fn position_in_range(latitude: Option<f64>, longitude: Option<f64>) -> bool {
    latitude.map_or(true, |lat| validate_latitude(lat).is_ok())
        && longitude.map_or(true, |lng| validate_longitude(lng).is_ok())
}

/// Motivo por el que un patch de solicitud es más viejo que el estado local
fn request_staleness(current: &ServiceRequest, patch: &RequestPatch) -> Option<&'static str> {
    match (patch.version, current.version) {
        (Some(incoming), Some(known)) if incoming <= known => Some("older or repeated version"),
        (Some(_), _) => None,
        (None, _) => match patch.status {
            Some(status)
                if current.status.is_terminal()
                    && !current.expired_locally
                    && status != current.status =>
            {
                Some("unversioned change of a terminal status")
            }
            _ => None,
        },
    }
}

/// Si el servidor asignó la solicitud a otro engineer, la ruta tentativa local
/// se retira y su engineer vuelve a quedar libre
fn supersede_local_route(store: &mut DispatchStore, request_id: &RequestId) -> Vec<FollowUp> {
    let Some(server_fe_id) = store
        .request(request_id)
        .and_then(|request| request.accepted_by_fe_id.clone())
    else {
        return Vec::new();
    };

    let Some((route_id, local_fe_id)) = store
        .route_for_request(request_id)
        .filter(|route| route.fe_id != server_fe_id)
        .map(|route| (route.route_id, route.fe_id.clone()))
    else {
        return Vec::new();
    };

    log::warn!(
        "⚠️ Solicitud {} asignada por el servidor a {}; se retira la ruta local {} de {}",
        request_id,
        server_fe_id,
        route_id,
        local_fe_id
    );

    let was_selected = store.selected_route() == Some(route_id);
    store.complete_route(route_id);
    release_engineer(store, &local_fe_id);

    if was_selected {
        vec![FollowUp::ClearDisplay]
    } else {
        Vec::new()
    }
}

/// Un engineer sin rutas activas vuelve a estar disponible
fn release_engineer(store: &mut DispatchStore, fe_id: &EngineerId) {
    if store.active_route_for_engineer(fe_id).is_some() {
        return;
    }
    if let Some(engineer) = store.engineer_mut(fe_id) {
        if engineer.status == EngineerStatus::OnAssignment {
            engineer.status = EngineerStatus::Active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AcceptanceConfirmation, BranchId, Coordinate, RouteStatus};
    use crate::config::RadiusPolicy;
    use crate::services::radius_scheduler::RadiusExpansionScheduler;
    use crate::services::request_lifecycle;
    use serde_json::json;

    fn reconciler() -> EventReconciler {
        EventReconciler::new(5.0)
    }

    fn event(name: &str, payload: Value) -> HubEvent {
        HubEvent::decode(name, payload).unwrap()
    }

    fn seeded_store() -> DispatchStore {
        let mut store = DispatchStore::new();
        let reconciler = reconciler();
        reconciler.apply(
            &mut store,
            event("newBranch", json!({"Id": 7, "BranchName": "Ermita", "Lat": 14.60, "Lng": 120.98})),
            Utc::now(),
        );
        reconciler.apply(
            &mut store,
            event("fieldEngineerUpdate", json!({"feId": "fe-1", "name": "Ana", "latitude": 14.61, "longitude": 120.98, "status": "Active"})),
            Utc::now(),
        );
        store
    }

    #[test]
    fn test_duplicate_new_service_request_keeps_one_entry() {
        let mut store = seeded_store();
        let payload = json!({"requestId": "r-1", "branchId": "7", "status": "Pending"});

        let first = reconciler().apply(&mut store, event("newServiceRequest", payload.clone()), Utc::now());
        let second = reconciler().apply(&mut store, event("newServiceRequest", payload), Utc::now());

        assert_eq!(first.outcome, MergeOutcome::Inserted);
        assert_eq!(second.outcome, MergeOutcome::Updated);
        assert_eq!(store.requests().count(), 1);

        let request = store.request(&RequestId::new("r-1")).unwrap();
        assert_eq!(request.branch_name, "Ermita");
        assert_eq!(request.coordinate, Coordinate::new(14.60, 120.98));
        assert_eq!(request.current_radius_km, 5.0);
    }

    #[test]
    fn test_older_version_after_newer_is_stale() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let now = Utc::now();
        reconciler.apply(&mut store, event("newServiceRequest", json!({"id": "r-1", "branchId": 7, "version": 1})), now);

        let newer = json!({"id": "r-1", "status": "Accepted", "acceptedBy": "fe-9", "version": 3});
        let older = json!({"id": "r-1", "status": "Pending", "radiusKm": 20, "version": 2});

        reconciler.apply(&mut store, event("serviceRequestUpdate", newer.clone()), now);
        let expected = store.request(&RequestId::new("r-1")).unwrap().clone();

        let replay = reconciler.apply(&mut store, event("serviceRequestUpdate", newer), now);
        let late = reconciler.apply(&mut store, event("serviceRequestUpdate", older), now);

        assert_eq!(replay.outcome, MergeOutcome::Stale);
        assert_eq!(late.outcome, MergeOutcome::Stale);
        assert_eq!(store.request(&RequestId::new("r-1")).unwrap(), &expected);
        assert_eq!(expected.status, RequestStatus::Accepted);
        assert_eq!(expected.confirmation, Some(AcceptanceConfirmation::Confirmed));
    }

    #[test]
    fn test_unversioned_update_cannot_reopen_terminal_request() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let now = Utc::now();
        reconciler.apply(&mut store, event("newServiceRequest", json!({"id": "r-1", "branchId": 7})), now);
        reconciler.apply(&mut store, event("serviceRequestUpdate", json!({"id": "r-1", "status": "Cancelled"})), now);

        let result = reconciler.apply(&mut store, event("serviceRequestUpdate", json!({"id": "r-1", "status": "Pending"})), now);

        assert_eq!(result.outcome, MergeOutcome::Stale);
        assert_eq!(store.request(&RequestId::new("r-1")).unwrap().status, RequestStatus::Cancelled);
    }

    #[test]
    fn test_versioned_server_event_wins_over_terminal() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let now = Utc::now();
        reconciler.apply(&mut store, event("newServiceRequest", json!({"id": "r-1", "branchId": 7, "status": "Expired", "version": 4})), now);

        let result = reconciler.apply(&mut store, event("serviceRequestUpdate", json!({"id": "r-1", "status": "Pending", "version": 5})), now);

        assert_eq!(result.outcome, MergeOutcome::Updated);
        assert!(store.request(&RequestId::new("r-1")).unwrap().is_pending());
    }

    #[test]
    fn test_events_without_identity_are_dropped() {
        let mut store = seeded_store();
        let result = reconciler().apply(&mut store, event("fieldEngineerUpdate", json!({"name": "Nobody"})), Utc::now());
        assert_eq!(result.outcome, MergeOutcome::Dropped);

        let result = reconciler().apply(&mut store, event("newServiceRequest", json!({"requestId": "  "})), Utc::now());
        assert_eq!(result.outcome, MergeOutcome::Dropped);
        assert_eq!(store.requests().count(), 0);
    }

    #[test]
    fn test_engineer_partial_update_reports_movement() {
        let mut store = seeded_store();

        let status_only = reconciler().apply(&mut store, event("fieldEngineerUpdate", json!({"FEID": "fe-1", "Status": "inactive"})), Utc::now());
        let moved = reconciler().apply(&mut store, event("fieldEngineerUpdate", json!({"fe_id": "fe-1", "location": {"lat": 14.7, "lng": 121.0}})), Utc::now());

        assert!(status_only.follow_ups.is_empty());
        assert_eq!(moved.follow_ups, vec![FollowUp::EngineerMoved(EngineerId::new("fe-1"))]);
        let engineer = store.engineer(&EngineerId::new("fe-1")).unwrap();
        assert_eq!(engineer.status, EngineerStatus::Inactive);
        assert_eq!(engineer.name, "Ana");
    }

    #[test]
    fn test_route_lifecycle_from_hub() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let now = Utc::now();

        let created = reconciler.apply(&mut store, event("newRoute", json!({"routeId": 500, "feId": "fe-1", "branchId": 7})), now);
        assert_eq!(created.outcome, MergeOutcome::Inserted);
        assert_eq!(created.follow_ups, vec![FollowUp::Enrich(RouteId(500))]);
        assert_eq!(store.route(RouteId(500)).unwrap().branch_name, "Ermita");

        store.select_route(Some(RouteId(500)));
        let delayed = reconciler.apply(&mut store, event("routeUpdate", json!({"routeId": 500, "status": "Delayed"})), now);
        assert_eq!(delayed.follow_ups, vec![FollowUp::Repaint(RouteId(500))]);
        assert_eq!(store.route(RouteId(500)).unwrap().status, RouteStatus::Delayed);

        let completed = reconciler.apply(&mut store, event("routeCompleted", json!(500)), now);
        assert_eq!(completed.outcome, MergeOutcome::Removed);
        assert_eq!(completed.follow_ups, vec![FollowUp::ClearDisplay]);

        let late = reconciler.apply(&mut store, event("routeUpdate", json!({"routeId": 500, "status": "Arriving"})), now);
        assert_eq!(late.outcome, MergeOutcome::Stale);
        assert!(store.route(RouteId(500)).is_none());
    }

    #[test]
    fn test_completion_releases_engineer() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        reconciler.apply(&mut store, event("newServiceRequest", json!({"id": "r-1", "branchId": 7})), Utc::now());
        let outcome = request_lifecycle::accept(&mut store, &RequestId::new("r-1"), &EngineerId::new("fe-1"), Utc::now()).unwrap();
        let route_id = outcome.route.unwrap().route_id;

        reconciler.apply(&mut store, event("routeUpdate", json!({"routeId": route_id.0, "status": "Completed"})), Utc::now());

        assert!(store.route(route_id).is_none());
        assert_eq!(store.engineer(&EngineerId::new("fe-1")).unwrap().status, EngineerStatus::Active);
    }

    #[test]
    fn test_server_assignment_to_other_engineer_supersedes_local_route() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        reconciler.apply(&mut store, event("newServiceRequest", json!({"id": "r-1", "branchId": 7})), Utc::now());
        request_lifecycle::accept(&mut store, &RequestId::new("r-1"), &EngineerId::new("fe-1"), Utc::now()).unwrap();

        let result = reconciler.apply(
            &mut store,
            event("serviceRequestUpdate", json!({"id": "r-1", "status": "Accepted", "acceptedByFeId": "fe-2", "version": 1})),
            Utc::now(),
        );

        assert_eq!(result.outcome, MergeOutcome::Updated);
        assert!(store.route_for_request(&RequestId::new("r-1")).is_none());
        assert_eq!(store.engineer(&EngineerId::new("fe-1")).unwrap().status, EngineerStatus::Active);
    }

    #[test]
    fn test_server_reopens_locally_expired_request() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let scheduler = RadiusExpansionScheduler::new(RadiusPolicy::default());
        let now = Utc::now();
        let created_at = (now - chrono::Duration::minutes(31)).to_rfc3339();
        reconciler.apply(
            &mut store,
            event("newServiceRequest", json!({"id": "r-1", "branchId": 7, "createdAt": created_at})),
            now,
        );

        let report = scheduler.tick(&mut store, now);
        assert_eq!(report.expired, vec![RequestId::new("r-1")]);

        let result = reconciler.apply(
            &mut store,
            event("serviceRequestUpdate", json!({"id": "r-1", "status": "Pending", "currentRadiusKm": 10})),
            now,
        );

        assert_eq!(result.outcome, MergeOutcome::Updated);
        let request = store.request(&RequestId::new("r-1")).unwrap();
        assert!(request.is_pending());
        assert!(!request.expired_locally);
        assert_eq!(request.current_radius_km, 10.0);

        // El TTL local ya no vuelve a expirarla
        let later = scheduler.tick(&mut store, now + chrono::Duration::minutes(5));
        assert!(later.expired.is_empty());
        assert!(store.request(&RequestId::new("r-1")).unwrap().is_pending());
    }

    #[test]
    fn test_roster_poll_reopens_locally_expired_request() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let now = Utc::now();
        reconciler.apply(&mut store, event("newServiceRequest", json!({"id": "r-1", "branchId": 7})), now);
        request_lifecycle::expire(store.request_mut(&RequestId::new("r-1")).unwrap());

        reconciler.apply_roster(
            &mut store,
            Vec::new(),
            Vec::new(),
            vec![json!({"ServiceRequestId": "r-1", "BranchId": "7", "Status": "Pending"})],
            now,
        );

        let request = store.request(&RequestId::new("r-1")).unwrap();
        assert!(request.is_pending());
        assert_eq!(request.radius_authority, RadiusAuthority::Server);
        assert!(request_lifecycle::accept(&mut store, &RequestId::new("r-1"), &EngineerId::new("fe-1"), now)
            .unwrap()
            .newly_accepted);
    }

    #[test]
    fn test_older_route_version_after_newer_is_stale() {
        let mut store = seeded_store();
        let reconciler = reconciler();
        let now = Utc::now();
        reconciler.apply(&mut store, event("newRoute", json!({"routeId": 600, "feId": "fe-1", "branchId": 7, "version": 1})), now);

        let newer = reconciler.apply(&mut store, event("routeUpdate", json!({"routeId": 600, "status": "Delayed", "version": 3})), now);
        let replay = reconciler.apply(&mut store, event("routeUpdate", json!({"routeId": 600, "status": "Delayed", "version": 3})), now);
        let older = reconciler.apply(&mut store, event("routeUpdate", json!({"routeId": 600, "status": "Arriving", "version": 2})), now);

        assert_eq!(newer.outcome, MergeOutcome::Updated);
        assert_eq!(replay.outcome, MergeOutcome::Stale);
        assert_eq!(older.outcome, MergeOutcome::Stale);
        let route = store.route(RouteId(600)).unwrap();
        assert_eq!(route.status, RouteStatus::Delayed);
        assert_eq!(route.version, Some(3));
    }

    #[test]
    fn test_out_of_range_positions_are_dropped() {
        let mut store = seeded_store();
        let reconciler = reconciler();

        let engineer = reconciler.apply(
            &mut store,
            event("fieldEngineerUpdate", json!({"feId": "fe-1", "latitude": 95.0, "longitude": 120.98})),
            Utc::now(),
        );
        let branch = reconciler.apply(
            &mut store,
            event("newBranch", json!({"Id": 8, "BranchName": "Pasay", "Lat": 14.5, "Lng": 200.0})),
            Utc::now(),
        );

        assert_eq!(engineer.outcome, MergeOutcome::Dropped);
        assert_eq!(branch.outcome, MergeOutcome::Dropped);
        assert_eq!(store.engineer(&EngineerId::new("fe-1")).unwrap().coordinate, Coordinate::new(14.61, 120.98));
        assert!(store.branch(&BranchId::new("8")).is_none());
    }

    #[test]
    fn test_disconnect_keeps_roster() {
        let mut store = seeded_store();
        reconciler().apply(&mut store, HubEvent::Connected, Utc::now());
        assert!(store.is_hub_connected());

        reconciler().apply(&mut store, HubEvent::Disconnected, Utc::now());
        assert!(!store.is_hub_connected());
        assert_eq!(store.engineers().count(), 1);
        assert!(store.branch(&BranchId::new("7")).is_some());
    }

    #[test]
    fn test_roster_poll_skips_bad_entities() {
        let mut store = DispatchStore::new();
        reconciler().apply_roster(
            &mut store,
            vec![json!({"branchId": "b-1", "name": "Makati", "latitude": 14.55, "longitude": 121.02})],
            vec![
                json!({"feId": "fe-1", "latitude": 14.56, "longitude": 121.02}),
                json!({"feId": "fe-2", "status": "napping"}),
            ],
            vec![json!({"serviceRequestId": 11, "branchId": "b-1", "status": "Pending"})],
            Utc::now(),
        );

        assert_eq!(store.branches().count(), 1);
        assert_eq!(store.engineers().count(), 1);
        assert_eq!(store.request(&RequestId::new("11")).unwrap().branch_name, "Makati");
    }
}
