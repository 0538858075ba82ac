//! Cliente del proveedor de direcciones
//!
//! El motor no calcula caminos: delega en un servicio turn-by-turn externo y
//! sólo consume distancia, duración y geometría de la primera ruta.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::dto::directions_dto::DirectionsResponse;
use crate::models::Coordinate;

/// Perfil de viaje
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelMode {
    Driving,
    DrivingTraffic,
    Walking,
}

impl TravelMode {
    pub fn profile(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::DrivingTraffic => "driving-traffic",
            TravelMode::Walking => "walking",
        }
    }
}

/// Tramo resuelto por el proveedor
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsLeg {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum DirectionsError {
    #[error("directions provider not configured")]
    NotConfigured,

    #[error("directions request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directions provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("directions provider returned code '{code}'")]
    Provider { code: String, message: Option<String> },

    #[error("directions provider returned no routes")]
    NoRoute,

    #[error("directions response could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("directions request timed out after {0:?}")]
    Timeout(Duration),

    #[error("directions provider returned an unusable leg: {0}")]
    InvalidLeg(String),
}

#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<DirectionsLeg, DirectionsError>;
}

/// Implementación HTTP contra la API de direcciones de Mapbox
pub struct MapboxDirectionsClient {
    base_url: String,
    mapbox_token: Option<String>,
    client: Client,
}

impl MapboxDirectionsClient {
    pub fn new(base_url: String, mapbox_token: Option<String>, timeout: Duration) -> Result<Self, DirectionsError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            mapbox_token,
            client,
        })
    }

    fn directions_url(&self, origin: Coordinate, destination: Coordinate, mode: TravelMode, token: &str) -> String {
        format!(
            "{}/directions/v5/mapbox/{}/{};{}?geometries=geojson&overview=full&access_token={}",
            self.base_url,
            mode.profile(),
            origin.to_lng_lat(),
            destination.to_lng_lat(),
            urlencoding::encode(token)
        )
    }
}

#[async_trait]
impl DirectionsProvider for MapboxDirectionsClient {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<DirectionsLeg, DirectionsError> {
        let token = self.mapbox_token.as_deref().ok_or(DirectionsError::NotConfigured)?;
        let url = self.directions_url(origin, destination, mode, token);

        log::debug!(
            "🗺️ Solicitando direcciones {} -> {} ({})",
            origin.to_lng_lat(),
            destination.to_lng_lat(),
            mode.profile()
        );

        let response = self.client
            .get(&url)
            .header("User-Agent", "FieldDispatch/1.0")
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(DirectionsError::Status {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let directions: DirectionsResponse = serde_json::from_str(&response_text)?;
        if !directions.is_ok() {
            return Err(DirectionsError::Provider {
                code: directions.code,
                message: directions.message,
            });
        }

        let first = directions.routes.into_iter().next().ok_or(DirectionsError::NoRoute)?;
        Ok(DirectionsLeg {
            distance_m: first.distance,
            duration_s: first.duration,
            geometry: first.geometry,
        })
    }
}
