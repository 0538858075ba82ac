//! Materialización y enriquecimiento de rutas
//!
//! `create` arma la ruta en el momento de la aceptación con valores centinela.
//! `enrich` consulta al proveedor de direcciones fuera del lock y aplica el
//! resultado sólo si la ruta sigue activa; una falla deja los valores previos.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::geo_distance::distance_m;
use crate::clients::directions_client::{DirectionsError, DirectionsLeg, DirectionsProvider, TravelMode};
use crate::clients::map_display::{MapDisplay, RouteOverlay};
use crate::config::FarePolicy;
use crate::metrics::ENRICHMENTS;
use crate::models::{
    Coordinate, FieldEngineer, Route, RouteEnrichment, RouteId, RouteStatus, ServiceRequest,
};
use crate::store::DispatchStore;

/// Media circunferencia terrestre: ningún tramo por carretera la supera
const MAX_LEG_DISTANCE_M: f64 = 20_037_508.0;
/// Una semana de viaje
const MAX_LEG_DURATION_S: f64 = 7.0 * 24.0 * 3600.0;

/// Resultado de un intento de enriquecimiento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Applied,
    /// El proveedor falló; los valores previos se conservan
    Failed,
    /// La ruta se completó mientras el proveedor respondía
    Discarded,
    /// Faltan la ruta, el engineer o la sucursal en el roster
    Skipped,
}

impl EnrichmentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Applied => "applied",
            EnrichmentOutcome::Failed => "failed",
            EnrichmentOutcome::Discarded => "discarded",
            EnrichmentOutcome::Skipped => "skipped",
        }
    }
}

pub struct RouteMaterializer {
    directions: Arc<dyn DirectionsProvider>,
    map_display: Arc<dyn MapDisplay>,
    fare: FarePolicy,
    timeout: Duration,
    reposition_threshold_m: f64,
}

impl RouteMaterializer {
    pub fn new(
        directions: Arc<dyn DirectionsProvider>,
        map_display: Arc<dyn MapDisplay>,
        fare: FarePolicy,
        timeout: Duration,
        reposition_threshold_m: f64,
    ) -> Self {
        Self {
            directions,
            map_display,
            fare,
            timeout,
            reposition_threshold_m,
        }
    }

    /// Ruta recién aceptada, con todos los campos de viaje en "Calculating..."
    pub fn create(
        request: &ServiceRequest,
        engineer: &FieldEngineer,
        route_id: RouteId,
        now: DateTime<Utc>,
    ) -> Route {
        Route {
            route_id,
            request_id: Some(request.request_id.clone()),
            fe_id: engineer.fe_id.clone(),
            fe_name: engineer.name.clone(),
            branch_id: request.branch_id.clone(),
            branch_name: request.branch_name.clone(),
            start_time: now,
            status: RouteStatus::InProgress,
            enrichment: RouteEnrichment::calculating(),
            geometry: None,
            last_enriched_origin: None,
            version: None,
        }
    }

    /// Distancia a 0.1 km, duración en minutos enteros, tarifa redondeada y ETA.
    /// Un tramo con valores no finitos, negativos o fuera de escala es un error.
    pub fn compute_enrichment(
        fare: &FarePolicy,
        leg: &DirectionsLeg,
        now: DateTime<Utc>,
    ) -> Result<RouteEnrichment, DirectionsError> {
        if !(leg.distance_m.is_finite() && (0.0..=MAX_LEG_DISTANCE_M).contains(&leg.distance_m)) {
            return Err(DirectionsError::InvalidLeg(format!("distance {} m", leg.distance_m)));
        }
        if !(leg.duration_s.is_finite() && (0.0..=MAX_LEG_DURATION_S).contains(&leg.duration_s)) {
            return Err(DirectionsError::InvalidLeg(format!("duration {} s", leg.duration_s)));
        }

        let distance_tenths = (leg.distance_m / 100.0).round() as i64;
        let distance = Decimal::new(distance_tenths, 1);
        let duration_minutes = (leg.duration_s / 60.0).round() as i64;

        let fare_amount = distance
            .checked_mul(fare.rate_per_km)
            .and_then(|variable| variable.checked_add(fare.base_fare))
            .ok_or_else(|| DirectionsError::InvalidLeg(format!("fare overflow for {} km", distance)))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let estimated_arrival = TimeDelta::try_minutes(duration_minutes)
            .and_then(|travel| now.checked_add_signed(travel))
            .ok_or_else(|| DirectionsError::InvalidLeg(format!("arrival overflow for {} min", duration_minutes)))?;

        Ok(RouteEnrichment {
            distance_text: format!("{:.1} km", distance_tenths as f64 / 10.0),
            duration_text: format!("{} min", duration_minutes),
            fare_text: format!("{}{}", fare.currency_symbol, fare_amount),
            estimated_arrival_text: estimated_arrival.format("%H:%M").to_string(),
            distance_km: Some(distance_tenths as f64 / 10.0),
            duration_minutes: Some(duration_minutes),
            fare: Some(fare_amount),
            estimated_arrival: Some(estimated_arrival),
            enriched_at: Some(now),
        })
    }

    /// `true` si el engineer se alejó lo suficiente del último origen usado
    pub fn needs_reenrichment(&self, route: &Route, engineer_position: Coordinate) -> bool {
        match route.last_enriched_origin {
            None => true,
            Some(origin) => distance_m(origin, engineer_position) > self.reposition_threshold_m,
        }
    }

    /// Enriquece la ruta con el proveedor de direcciones.
    ///
    /// Nunca devuelve error: las fallas quedan en el log y en la métrica.
    pub async fn enrich(&self, store: &RwLock<DispatchStore>, route_id: RouteId) -> EnrichmentOutcome {
        let endpoints = {
            let store = store.read().await;
            resolve_endpoints(&store, route_id)
        };
        let Some((origin, destination)) = endpoints else {
            log::debug!("⏭️ Ruta {} sin datos suficientes para enriquecer", route_id);
            return self.finish(EnrichmentOutcome::Skipped);
        };

        let result = match tokio::time::timeout(
            self.timeout,
            self.directions.route(origin, destination, TravelMode::Driving),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DirectionsError::Timeout(self.timeout)),
        };

        let (leg, enrichment) = match result
            .and_then(|leg| Self::compute_enrichment(&self.fare, &leg, Utc::now()).map(|enrichment| (leg, enrichment)))
        {
            Ok(computed) => computed,
            Err(e) => {
                log::warn!("⚠️ Enriquecimiento de la ruta {} falló: {}", route_id, e);
                return self.finish(EnrichmentOutcome::Failed);
            }
        };

        let overlay = {
            let mut store = store.write().await;
            let selected = store.selected_route() == Some(route_id);
            let Some(route) = store.route_mut(route_id) else {
                log::debug!("🗑️ Respuesta de direcciones descartada: ruta {} ya no está activa", route_id);
                return self.finish(EnrichmentOutcome::Discarded);
            };

            route.enrichment = enrichment;
            route.geometry = Some(leg.geometry);
            route.last_enriched_origin = Some(origin);

            log::info!(
                "🧭 Ruta {} enriquecida: {} / {} / {}",
                route_id,
                route.enrichment.distance_text,
                route.enrichment.duration_text,
                route.enrichment.fare_text
            );

            if selected {
                RouteOverlay::for_route(route)
            } else {
                None
            }
        };

        if let Some(overlay) = overlay {
            self.map_display.show_route(overlay).await;
        }
        self.finish(EnrichmentOutcome::Applied)
    }

    /// Empuja al mapa la geometría actual de la ruta, si ya la tiene
    pub async fn push_overlay(&self, store: &RwLock<DispatchStore>, route_id: RouteId) -> bool {
        let overlay = {
            let store = store.read().await;
            store.route(route_id).and_then(RouteOverlay::for_route)
        };
        match overlay {
            Some(overlay) => {
                self.map_display.show_route(overlay).await;
                true
            }
            None => false,
        }
    }

    pub async fn clear_overlay(&self) {
        self.map_display.clear_route().await;
    }

    fn finish(&self, outcome: EnrichmentOutcome) -> EnrichmentOutcome {
        ENRICHMENTS.with_label_values(&[outcome.label()]).inc();
        outcome
    }
}

/// Origen = engineer asignado, destino = sucursal (o la copia en la solicitud)
fn resolve_endpoints(store: &DispatchStore, route_id: RouteId) -> Option<(Coordinate, Coordinate)> {
    let route = store.route(route_id)?;
    let origin = store.engineer(&route.fe_id)?.coordinate;
    let destination = store
        .branch(&route.branch_id)
        .map(|branch| branch.coordinate)
        .or_else(|| {
            route
                .request_id
                .as_ref()
                .and_then(|id| store.request(id))
                .map(|request| request.coordinate)
        })?;
    Some((origin, destination))
}
