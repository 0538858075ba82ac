//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum. El roster de la sesión vive dentro de
//! `DispatchService`; aquí sólo hay handles baratos de clonar.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clients::backend_client::DispatchBackend;
use crate::clients::directions_client::DirectionsProvider;
use crate::clients::map_display::BroadcastMapDisplay;
use crate::config::environment::EnvironmentConfig;
use crate::services::dispatch_service::DispatchService;
use crate::services::route_materializer::RouteMaterializer;
use crate::store::DispatchStore;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub dispatch: Arc<DispatchService>,
    pub map_display: Arc<BroadcastMapDisplay>,
}

impl AppState {
    /// Arma la sesión de despacho con los colaboradores dados
    pub fn new(
        config: EnvironmentConfig,
        backend: Arc<dyn DispatchBackend>,
        directions: Arc<dyn DirectionsProvider>,
        map_display: Arc<BroadcastMapDisplay>,
    ) -> Self {
        let store = Arc::new(RwLock::new(DispatchStore::new()));
        let materializer = Arc::new(RouteMaterializer::new(
            directions,
            map_display.clone(),
            config.fare.clone(),
            config.directions_timeout,
            config.reposition_threshold_m,
        ));
        let dispatch = Arc::new(DispatchService::new(
            config.clone(),
            store,
            backend,
            materializer,
        ));

        Self {
            config,
            dispatch,
            map_display,
        }
    }
}
