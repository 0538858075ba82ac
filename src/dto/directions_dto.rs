//! DTOs para la API de direcciones (estilo Mapbox Directions v5)
//!
//! `GET /directions/v5/mapbox/{profile}/{lng},{lat};{lng},{lat}?geometries=geojson`.
//! Sólo se usa `routes[0]`.

use serde::Deserialize;

/// Response del proveedor de direcciones
#[derive(Debug, Deserialize)]
pub struct DirectionsResponse {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
}

/// Una ruta alternativa; distancia en metros, duración en segundos
#[derive(Debug, Deserialize)]
pub struct DirectionsRoute {
    pub distance: f64,
    pub duration: f64,
    #[serde(default)]
    pub geometry: serde_json::Value,
}

impl DirectionsResponse {
    pub fn is_ok(&self) -> bool {
        self.code.eq_ignore_ascii_case("ok")
    }
}
