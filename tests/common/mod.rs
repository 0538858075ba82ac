//! Colaboradores falsos en proceso para los tests de integración

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use field_dispatch::clients::backend_client::DispatchBackend;
use field_dispatch::clients::directions_client::{DirectionsError, DirectionsLeg, DirectionsProvider, TravelMode};
use field_dispatch::clients::map_display::BroadcastMapDisplay;
use field_dispatch::config::EnvironmentConfig;
use field_dispatch::dto::backend_dto::{AcceptServiceRequestBody, CreateServiceRequestBody};
use field_dispatch::models::{Coordinate, RequestId, RouteId, CALCULATING};
use field_dispatch::state::AppState;
use field_dispatch::store::DispatchStore;
use field_dispatch::utils::errors::{AppError, AppResult};
use tokio::sync::RwLock;

/// Kilómetros por grado de latitud sobre la esfera de 6371 km
pub const KM_PER_DEGREE_LAT: f64 = 111.194_926_644_558_73;

pub const BRANCH_LAT: f64 = 14.60;
pub const BRANCH_LNG: f64 = 120.98;

pub fn north_of_branch(km: f64) -> Coordinate {
    Coordinate::new(BRANCH_LAT + km / KM_PER_DEGREE_LAT, BRANCH_LNG)
}

/// Backend en memoria: roster fijo, registra los comandos recibidos
pub struct FakeBackend {
    pub branches: Vec<Value>,
    pub engineers: Vec<Value>,
    pub requests: Vec<Value>,
    pub fail_accept: AtomicBool,
    pub accepted: Mutex<Vec<(RequestId, AcceptServiceRequestBody)>>,
    pub created: Mutex<Vec<CreateServiceRequestBody>>,
    next_request: AtomicUsize,
}

impl FakeBackend {
    /// Sucursal B1 en (14.60, 120.98), E1 a 3 km y E2 a 8 km
    pub fn scenario() -> Self {
        let e1 = north_of_branch(3.0);
        let e2 = north_of_branch(8.0);
        Self {
            branches: vec![json!({
                "BranchId": "B1",
                "BranchName": "Ermita",
                "Address": "Taft Ave",
                "Latitude": BRANCH_LAT,
                "Longitude": BRANCH_LNG
            })],
            engineers: vec![
                json!({"fe_id": "E1", "name": "Ana Reyes", "lat": e1.lat, "lng": e1.lng, "status": "Active"}),
                json!({"feId": "E2", "name": "Ben Cruz", "latitude": e2.lat, "longitude": e2.lng, "status": "active"}),
            ],
            requests: Vec::new(),
            fail_accept: AtomicBool::new(false),
            accepted: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            next_request: AtomicUsize::new(1),
        }
    }

    pub fn accept_calls(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }
}

#[async_trait]
impl DispatchBackend for FakeBackend {
    async fn fetch_branches(&self) -> AppResult<Vec<Value>> {
        Ok(self.branches.clone())
    }

    async fn fetch_engineers(&self) -> AppResult<Vec<Value>> {
        Ok(self.engineers.clone())
    }

    async fn fetch_service_requests(&self) -> AppResult<Vec<Value>> {
        Ok(self.requests.clone())
    }

    async fn create_service_request(&self, body: &CreateServiceRequestBody) -> AppResult<Value> {
        self.created.lock().unwrap().push(body.clone());
        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "Id": format!("R{}", id),
            "BranchId": body.branch_id,
            "Status": "Pending",
            "CurrentRadiusKm": body.current_radius_km,
            "CreatedAt": Utc::now().to_rfc3339()
        }))
    }

    async fn accept_service_request(&self, request_id: &RequestId, body: &AcceptServiceRequestBody) -> AppResult<()> {
        self.accepted.lock().unwrap().push((request_id.clone(), body.clone()));
        if self.fail_accept.load(Ordering::SeqCst) {
            return Err(AppError::ExternalApi("backend unavailable".to_string()));
        }
        Ok(())
    }
}

/// Proveedor de direcciones con respuesta fija
pub struct FixedDirections {
    pub leg: DirectionsLeg,
}

impl FixedDirections {
    pub fn new(distance_m: f64, duration_s: f64) -> Self {
        Self {
            leg: DirectionsLeg {
                distance_m,
                duration_s,
                geometry: json!({
                    "type": "LineString",
                    "coordinates": [[BRANCH_LNG, BRANCH_LAT + 0.027], [BRANCH_LNG, BRANCH_LAT]]
                }),
            },
        }
    }
}

#[async_trait]
impl DirectionsProvider for FixedDirections {
    async fn route(&self, _: Coordinate, _: Coordinate, _: TravelMode) -> Result<DirectionsLeg, DirectionsError> {
        Ok(self.leg.clone())
    }
}

/// Proveedor que siempre falla
pub struct FailingDirections;

#[async_trait]
impl DirectionsProvider for FailingDirections {
    async fn route(&self, _: Coordinate, _: Coordinate, _: TravelMode) -> Result<DirectionsLeg, DirectionsError> {
        Err(DirectionsError::Provider {
            code: "NoRoute".to_string(),
            message: None,
        })
    }
}

pub fn test_state(backend: Arc<FakeBackend>, directions: Arc<dyn DirectionsProvider>) -> AppState {
    let mut config = EnvironmentConfig::default();
    config.directions_timeout = Duration::from_secs(2);
    AppState::new(config, backend, directions, Arc::new(BroadcastMapDisplay::default()))
}

/// Espera a que la tarea de enriquecimiento aplique resultados
pub async fn wait_for_enrichment(store: &Arc<RwLock<DispatchStore>>, route_id: RouteId) -> bool {
    for _ in 0..100 {
        {
            let store = store.read().await;
            if let Some(route) = store.route(route_id) {
                if route.enrichment.distance_text != CALCULATING {
                    return true;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
