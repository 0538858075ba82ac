//! Roster en memoria de la sesión de despacho
//!
//! Agregado explícito con ciclo de vida de sesión: se construye al iniciar,
//! se comparte por `AppState` y se descarta al terminar. Cada mutación es un
//! upsert atómico por identidad; quien lo usa detrás de un lock nunca debe
//! mantenerlo a través de un `.await`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{
    Branch, BranchId, EngineerId, FieldEngineer, RequestId, Route, RouteId, ServiceRequest,
};

#[derive(Debug, Default)]
pub struct DispatchStore {
    branches: HashMap<BranchId, Branch>,
    engineers: HashMap<EngineerId, FieldEngineer>,
    requests: HashMap<RequestId, ServiceRequest>,
    routes: HashMap<RouteId, Route>,
    /// Rutas ya completadas en esta sesión; un evento tardío no las resucita
    completed_routes: HashSet<RouteId>,
    selected_route: Option<RouteId>,
    hub_connected: bool,
    last_route_id: u64,
}

/// Vista serializable del roster completo
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    pub branches: Vec<Branch>,
    pub engineers: Vec<FieldEngineer>,
    pub service_requests: Vec<ServiceRequest>,
    pub routes: Vec<Route>,
    pub selected_route_id: Option<RouteId>,
    pub hub_connected: bool,
}

impl DispatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Sucursales

    pub fn branch(&self, id: &BranchId) -> Option<&Branch> {
        self.branches.get(id)
    }

    pub fn branch_mut(&mut self, id: &BranchId) -> Option<&mut Branch> {
        self.branches.get_mut(id)
    }

    pub fn upsert_branch(&mut self, branch: Branch) {
        self.branches.insert(branch.branch_id.clone(), branch);
    }

    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values()
    }

    // Engineers

    pub fn engineer(&self, id: &EngineerId) -> Option<&FieldEngineer> {
        self.engineers.get(id)
    }

    pub fn engineer_mut(&mut self, id: &EngineerId) -> Option<&mut FieldEngineer> {
        self.engineers.get_mut(id)
    }

    pub fn upsert_engineer(&mut self, engineer: FieldEngineer) {
        self.engineers.insert(engineer.fe_id.clone(), engineer);
    }

    pub fn engineers(&self) -> impl Iterator<Item = &FieldEngineer> {
        self.engineers.values()
    }

    /// Copia del roster de engineers para el matcher
    pub fn engineer_list(&self) -> Vec<FieldEngineer> {
        self.engineers.values().cloned().collect()
    }

    // Solicitudes

    pub fn request(&self, id: &RequestId) -> Option<&ServiceRequest> {
        self.requests.get(id)
    }

    pub fn request_mut(&mut self, id: &RequestId) -> Option<&mut ServiceRequest> {
        self.requests.get_mut(id)
    }

    pub fn upsert_request(&mut self, request: ServiceRequest) {
        self.requests.insert(request.request_id.clone(), request);
    }

    pub fn requests(&self) -> impl Iterator<Item = &ServiceRequest> {
        self.requests.values()
    }

    pub fn requests_mut(&mut self) -> impl Iterator<Item = &mut ServiceRequest> {
        self.requests.values_mut()
    }

    // Rutas

    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(&id)
    }

    pub fn route_mut(&mut self, id: RouteId) -> Option<&mut Route> {
        self.routes.get_mut(&id)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn is_route_active(&self, id: RouteId) -> bool {
        self.routes.contains_key(&id)
    }

    pub fn is_route_completed(&self, id: RouteId) -> bool {
        self.completed_routes.contains(&id)
    }

    /// Inserta una ruta activa; `false` si el id ya está en uso o fue
    /// completado en esta sesión
    pub fn insert_route(&mut self, route: Route) -> bool {
        if self.is_route_id_taken(route.route_id) {
            return false;
        }
        self.last_route_id = self.last_route_id.max(route.route_id.0);
        self.routes.insert(route.route_id, route);
        true
    }

    /// Único camino de borrado de rutas
    pub fn complete_route(&mut self, id: RouteId) -> Option<Route> {
        self.completed_routes.insert(id);
        if self.selected_route == Some(id) {
            self.selected_route = None;
        }
        self.routes.remove(&id)
    }

    pub fn route_for_request(&self, request_id: &RequestId) -> Option<&Route> {
        self.routes
            .values()
            .find(|route| route.request_id.as_ref() == Some(request_id))
    }

    pub fn active_route_for_engineer(&self, fe_id: &EngineerId) -> Option<&Route> {
        self.routes.values().find(|route| &route.fe_id == fe_id)
    }

    pub fn route_ids_for_engineer(&self, fe_id: &EngineerId) -> Vec<RouteId> {
        self.routes
            .values()
            .filter(|route| &route.fe_id == fe_id)
            .map(|route| route.route_id)
            .collect()
    }

    /// Nuevo id de ruta: milisegundos del reloj, forzado a ser estrictamente
    /// creciente para que dos aceptaciones en el mismo milisegundo no colisionen
    pub fn allocate_route_id(&mut self, now: DateTime<Utc>) -> RouteId {
        let clock = now.timestamp_millis().max(0) as u64;
        let mut next = clock.max(self.last_route_id + 1);
        // Los ids del servidor comparten el mismo espacio de timestamps
        while self.is_route_id_taken(RouteId(next)) {
            next += 1;
        }
        self.last_route_id = next;
        RouteId(next)
    }

    fn is_route_id_taken(&self, id: RouteId) -> bool {
        self.routes.contains_key(&id) || self.completed_routes.contains(&id)
    }

    // Selección para el mapa

    pub fn selected_route(&self) -> Option<RouteId> {
        self.selected_route
    }

    pub fn select_route(&mut self, id: Option<RouteId>) {
        self.selected_route = id;
    }

    // Liveness del hub

    pub fn is_hub_connected(&self) -> bool {
        self.hub_connected
    }

    pub fn set_hub_connected(&mut self, connected: bool) {
        self.hub_connected = connected;
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        let mut branches: Vec<Branch> = self.branches.values().cloned().collect();
        branches.sort_by(|a, b| a.branch_id.cmp(&b.branch_id));

        let mut engineers: Vec<FieldEngineer> = self.engineers.values().cloned().collect();
        engineers.sort_by(|a, b| a.fe_id.cmp(&b.fe_id));

        let mut service_requests: Vec<ServiceRequest> = self.requests.values().cloned().collect();
        service_requests.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });

        let mut routes: Vec<Route> = self.routes.values().cloned().collect();
        routes.sort_by_key(|route| route.route_id);

        RosterSnapshot {
            branches,
            engineers,
            service_requests,
            routes,
            selected_route_id: self.selected_route,
            hub_connected: self.hub_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BranchId, Coordinate, EngineerId, RouteEnrichment, RouteStatus};
    use chrono::TimeZone;

    fn route(id: u64) -> Route {
        Route {
            route_id: RouteId(id),
            request_id: None,
            fe_id: EngineerId::new("fe-1"),
            fe_name: "Ana".to_string(),
            branch_id: BranchId::new("b-1"),
            branch_name: "Makati".to_string(),
            start_time: Utc::now(),
            status: RouteStatus::InProgress,
            enrichment: RouteEnrichment::calculating(),
            geometry: None,
            last_enriched_origin: Some(Coordinate::new(0.0, 0.0)),
            version: None,
        }
    }

    #[test]
    fn test_route_ids_are_strictly_increasing_within_same_millisecond() {
        let mut store = DispatchStore::new();
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let first = store.allocate_route_id(now);
        let second = store.allocate_route_id(now);

        assert_eq!(first, RouteId(1_700_000_000_000));
        assert!(second > first);
    }

    #[test]
    fn test_route_id_skips_tombstoned_and_server_ids() {
        let mut store = DispatchStore::new();
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        // routeCompleted temprano para un id que nunca estuvo en el store
        store.complete_route(RouteId(1_700_000_000_000));
        assert!(store.insert_route(route(1_700_000_000_001)));
        store.last_route_id = 0;

        let allocated = store.allocate_route_id(now);

        assert_eq!(allocated, RouteId(1_700_000_000_002));
        assert!(!store.insert_route(route(1_700_000_000_001)));
        assert!(store.insert_route(route(allocated.0)));
    }

    #[test]
    fn test_completed_route_is_not_resurrected() {
        let mut store = DispatchStore::new();
        assert!(store.insert_route(route(10)));
        store.select_route(Some(RouteId(10)));

        assert!(store.complete_route(RouteId(10)).is_some());
        assert!(!store.insert_route(route(10)));
        assert!(!store.is_route_active(RouteId(10)));
        assert_eq!(store.selected_route(), None);
    }

    #[test]
    fn test_disconnect_keeps_entities() {
        let mut store = DispatchStore::new();
        store.insert_route(route(1));
        store.set_hub_connected(true);
        store.set_hub_connected(false);
        assert_eq!(store.snapshot().routes.len(), 1);
    }
}
