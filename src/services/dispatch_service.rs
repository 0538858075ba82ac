//! Servicio de despacho
//!
//! Fachada sobre el roster de la sesión: comandos del operador, polling del
//! backend y bucle de eventos del hub. Todo el I/O (backend, direcciones,
//! mapa) se hace con el lock liberado.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use super::eligibility_matcher::{find_candidates, RankedCandidate};
use super::event_reconciler::{EventReconciler, FollowUp};
use super::geo_distance::{circle_polygon, polygon_to_geojson, DEFAULT_CIRCLE_POINTS};
use super::request_lifecycle::{self, AcceptOutcome};
use super::route_materializer::RouteMaterializer;
use crate::clients::backend_client::DispatchBackend;
use crate::config::EnvironmentConfig;
use crate::dto::backend_dto::{AcceptServiceRequestBody, CreateServiceRequestBody};
use crate::dto::hub_dto::{decode_patch, HubEvent, HubEventKind};
use crate::metrics::{ACCEPTS, ACTIVE_ROUTES};
use crate::models::service_request::REQUEST_KEY_ALIASES;
use crate::models::{
    AcceptanceConfirmation, BranchId, EngineerId, RequestId, RequestPatch, RouteId, ServiceRequest,
};
use crate::store::{DispatchStore, RosterSnapshot};
use crate::utils::errors::{bad_request_error, not_found_error, AppError, AppResult};
use crate::utils::validation::validate_coordinate;

pub struct DispatchService {
    config: EnvironmentConfig,
    store: Arc<RwLock<DispatchStore>>,
    backend: Arc<dyn DispatchBackend>,
    materializer: Arc<RouteMaterializer>,
    reconciler: EventReconciler,
}

impl DispatchService {
    pub fn new(
        config: EnvironmentConfig,
        store: Arc<RwLock<DispatchStore>>,
        backend: Arc<dyn DispatchBackend>,
        materializer: Arc<RouteMaterializer>,
    ) -> Self {
        let reconciler = EventReconciler::new(config.radius.initial_radius_km);
        Self {
            config,
            store,
            backend,
            materializer,
            reconciler,
        }
    }

    pub fn store(&self) -> Arc<RwLock<DispatchStore>> {
        self.store.clone()
    }

    pub async fn snapshot(&self) -> RosterSnapshot {
        self.store.read().await.snapshot()
    }

    pub async fn is_hub_connected(&self) -> bool {
        self.store.read().await.is_hub_connected()
    }

    /// Crea una solicitud Pending para la sucursal en el backend y la registra localmente
    pub async fn request_service(&self, branch_id: &BranchId) -> AppResult<ServiceRequest> {
        let branch = self
            .store
            .read()
            .await
            .branch(branch_id)
            .cloned()
            .ok_or_else(|| not_found_error("Branch", branch_id.as_str()))?;

        validate_coordinate(&branch.coordinate)
            .map_err(|_| bad_request_error(&format!("branch {} has an invalid position", branch_id)))?;

        let body = CreateServiceRequestBody {
            branch_id: branch.branch_id.clone(),
            branch_name: branch.name.clone(),
            latitude: branch.coordinate.lat,
            longitude: branch.coordinate.lng,
            current_radius_km: self.config.radius.initial_radius_km,
        };
        let created = self.backend.create_service_request(&body).await?;

        let patch: RequestPatch = decode_patch(HubEventKind::NewServiceRequest, created, REQUEST_KEY_ALIASES)
            .map_err(|e| AppError::ExternalApi(e.to_string()))?;
        let request_id = patch
            .request_id
            .clone()
            .filter(|id| !id.is_blank())
            .ok_or_else(|| AppError::ExternalApi("backend did not return a request id".to_string()))?;

        let mut store = self.store.write().await;
        // El broadcast del hub pudo llegar antes que la respuesta HTTP
        if let Some(existing) = store.request(&request_id) {
            return Ok(existing.clone());
        }

        // El radio que devuelve el backend es el que acabamos de enviar: no
        // cuenta como radio empujado por el servidor
        let mut request = ServiceRequest::pending(
            request_id.clone(),
            branch.branch_id,
            branch.name,
            branch.coordinate,
            patch.created_at.unwrap_or_else(Utc::now),
            self.config.radius.initial_radius_km,
        );
        request.version = patch.version;
        if let Some(status) = patch.status {
            request.status = status;
        }

        store.upsert_request(request.clone());
        log::info!("🆕 Solicitud {} creada para sucursal {}", request_id, request.branch_name);
        Ok(request)
    }

    /// Engineers elegibles para la solicitud, del más cercano al más lejano
    pub async fn candidates_for(&self, request_id: &RequestId) -> AppResult<(ServiceRequest, Vec<RankedCandidate>)> {
        let store = self.store.read().await;
        let request = store
            .request(request_id)
            .ok_or_else(|| not_found_error("ServiceRequest", request_id.as_str()))?;

        let candidates = if request.is_pending() {
            find_candidates(request, &store.engineer_list())
        } else {
            Vec::new()
        };
        Ok((request.clone(), candidates))
    }

    /// Círculo del radio de búsqueda actual como GeoJSON
    pub async fn radius_polygon(&self, request_id: &RequestId) -> AppResult<Value> {
        let store = self.store.read().await;
        let request = store
            .request(request_id)
            .ok_or_else(|| not_found_error("ServiceRequest", request_id.as_str()))?;

        let polygon = circle_polygon(request.coordinate, request.current_radius_km, DEFAULT_CIRCLE_POINTS);
        Ok(polygon_to_geojson(&polygon))
    }

    /// Acepta la solicitud localmente y la confirma contra el backend.
    ///
    /// Si el backend falla no hay rollback: la aceptación queda `Failed` y el
    /// error vuelve al operador. Repetir el comando reintenta la confirmación.
    pub async fn accept_request(&self, request_id: &RequestId, fe_id: &EngineerId) -> AppResult<AcceptOutcome> {
        let mut outcome = {
            let mut store = self.store.write().await;
            let outcome = request_lifecycle::accept(&mut store, request_id, fe_id, Utc::now());
            ACTIVE_ROUTES.set(store.routes().count() as i64);
            outcome
        }
        .map_err(|e| {
            ACCEPTS.with_label_values(&["rejected"]).inc();
            e
        })?;

        if outcome.newly_accepted {
            if let Some(route) = &outcome.route {
                self.spawn_enrichment(route.route_id);
            }
        } else {
            let retry = outcome.request.confirmation == Some(AcceptanceConfirmation::Failed)
                && outcome.request.accepted_by_fe_id.as_ref() == Some(fe_id);
            if !retry {
                ACCEPTS.with_label_values(&["duplicate"]).inc();
                return Ok(outcome);
            }
            log::info!("🔁 Reintentando confirmación de la solicitud {}", request_id);
        }

        let Some(route_id) = outcome.route.as_ref().map(|route| route.route_id) else {
            return Ok(outcome);
        };
        let body = AcceptServiceRequestBody {
            fe_id: fe_id.clone(),
            fe_name: outcome.request.accepted_by_fe_name.clone().unwrap_or_default(),
            accepted_at: outcome.request.accepted_at.unwrap_or_else(Utc::now),
            route_id,
        };

        let result = self.backend.accept_service_request(request_id, &body).await;
        let confirmation = match &result {
            Ok(()) => AcceptanceConfirmation::Confirmed,
            Err(e) => {
                log::error!("❌ Backend rechazó la aceptación de {}: {}", request_id, e);
                AcceptanceConfirmation::Failed
            }
        };

        {
            let mut store = self.store.write().await;
            if let Some(request) = store.request_mut(request_id) {
                // Un broadcast autoritativo pudo confirmar mientras tanto
                if request.confirmation != Some(AcceptanceConfirmation::Confirmed) {
                    request.confirmation = Some(confirmation);
                }
                outcome.request = request.clone();
            }
        }

        match result {
            Ok(()) => {
                ACCEPTS.with_label_values(&["confirmed"]).inc();
                Ok(outcome)
            }
            Err(e) => {
                ACCEPTS.with_label_values(&["failed"]).inc();
                Err(e)
            }
        }
    }

    pub async fn cancel_request(&self, request_id: &RequestId) -> AppResult<ServiceRequest> {
        let mut store = self.store.write().await;
        request_lifecycle::cancel(&mut store, request_id)
    }

    /// Marca la ruta como seleccionada, la pinta si ya tiene geometría y la re-enriquece
    pub async fn select_route_for_display(&self, route_id: RouteId) -> AppResult<()> {
        {
            let mut store = self.store.write().await;
            if !store.is_route_active(route_id) {
                return Err(not_found_error("Route", &route_id.to_string()));
            }
            store.select_route(Some(route_id));
        }

        self.materializer.push_overlay(&self.store, route_id).await;
        self.spawn_enrichment(route_id);
        Ok(())
    }

    pub async fn clear_route_display(&self) {
        self.store.write().await.select_route(None);
        self.materializer.clear_overlay().await;
    }

    /// Enriquecimiento en su propia tarea; el llamador nunca espera al proveedor
    pub fn spawn_enrichment(&self, route_id: RouteId) {
        let materializer = self.materializer.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            materializer.enrich(&store, route_id).await;
        });
    }

    /// Aplica un evento del hub y dispara el trabajo derivado
    pub async fn handle_event(&self, event: HubEvent) {
        let follow_ups = {
            let mut store = self.store.write().await;
            let reconciliation = self.reconciler.apply(&mut store, event, Utc::now());
            ACTIVE_ROUTES.set(store.routes().count() as i64);
            reconciliation.follow_ups
        };
        self.run_follow_ups(follow_ups).await;
    }

    /// Descarga sucursales, engineers y solicitudes y los mezcla en el roster
    pub async fn refresh_roster(&self) -> AppResult<()> {
        let (branches, engineers, requests) = tokio::try_join!(
            self.backend.fetch_branches(),
            self.backend.fetch_engineers(),
            self.backend.fetch_service_requests(),
        )?;

        log::debug!(
            "🔄 Roster recibido: {} sucursales, {} engineers, {} solicitudes",
            branches.len(),
            engineers.len(),
            requests.len()
        );

        let follow_ups = {
            let mut store = self.store.write().await;
            self.reconciler
                .apply_roster(&mut store, branches, engineers, requests, Utc::now())
        };
        self.run_follow_ups(follow_ups).await;
        Ok(())
    }

    /// Consume los eventos del hub hasta que se cierre el canal
    pub async fn run_event_loop(self: Arc<Self>, mut events: mpsc::Receiver<HubEvent>) {
        log::info!("📨 Bucle de eventos del hub iniciado");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        log::warn!("📭 Canal de eventos del hub cerrado");
    }

    /// Polling periódico del backend; las fallas se registran y se reintenta en el siguiente tick
    pub async fn run_roster_poller(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.refresh_roster().await {
                log::warn!("⚠️ Polling del roster falló: {}", e);
            }
        }
    }

    async fn run_follow_ups(&self, follow_ups: Vec<FollowUp>) {
        for follow_up in follow_ups {
            match follow_up {
                FollowUp::Enrich(route_id) => self.spawn_enrichment(route_id),
                FollowUp::EngineerMoved(fe_id) => {
                    for route_id in self.routes_to_reenrich(&fe_id).await {
                        self.spawn_enrichment(route_id);
                    }
                }
                FollowUp::Repaint(route_id) => {
                    self.materializer.push_overlay(&self.store, route_id).await;
                }
                FollowUp::ClearDisplay => self.materializer.clear_overlay().await,
            }
        }
    }

    async fn routes_to_reenrich(&self, fe_id: &EngineerId) -> Vec<RouteId> {
        let store = self.store.read().await;
        let Some(position) = store.engineer(fe_id).map(|engineer| engineer.coordinate) else {
            return Vec::new();
        };
        store
            .route_ids_for_engineer(fe_id)
            .into_iter()
            .filter(|route_id| {
                store
                    .route(*route_id)
                    .map(|route| self.materializer.needs_reenrichment(route, position))
                    .unwrap_or(false)
            })
            .collect()
    }
}
