//! Modelo de Route (ruta en curso)
//!
//! Asignación en progreso de un engineer a una solicitud aceptada. Se crea
//! una sola vez por solicitud aceptada y se enriquece de forma asíncrona con
//! distancia, duración, tarifa y ETA. Sólo un evento RouteCompleted la saca
//! del conjunto activo.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::field_engineer::canonical_token;
use super::geo::Coordinate;
use super::ids::{BranchId, EngineerId, RequestId, RouteId};
use crate::utils::validation::{lenient_datetime, lenient_text};

/// Valor centinela mientras el proveedor de direcciones no respondió
pub const CALCULATING: &str = "Calculating...";

/// Estado de la ruta en curso
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    InProgress,
    Delayed,
    Arriving,
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RouteStatus::InProgress => "InProgress",
            RouteStatus::Delayed => "Delayed",
            RouteStatus::Arriving => "Arriving",
        };
        f.write_str(label)
    }
}

/// Estado tal como lo puede anunciar el servidor: un progreso o la finalización
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RouteStatusSignal {
    Progress(RouteStatus),
    Completed,
}

impl FromStr for RouteStatusSignal {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match canonical_token(value).as_str() {
            "inprogress" | "ongoing" | "active" | "enroute" => {
                Ok(RouteStatusSignal::Progress(RouteStatus::InProgress))
            }
            "delayed" | "late" => Ok(RouteStatusSignal::Progress(RouteStatus::Delayed)),
            "arriving" | "nearby" => Ok(RouteStatusSignal::Progress(RouteStatus::Arriving)),
            "completed" | "complete" | "done" | "finished" => Ok(RouteStatusSignal::Completed),
            _ => Err(format!("unknown route status '{}'", value)),
        }
    }
}

impl TryFrom<String> for RouteStatusSignal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Métricas de viaje calculadas a partir del proveedor de direcciones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEnrichment {
    pub distance_text: String,
    pub duration_text: String,
    pub fare_text: String,
    pub estimated_arrival_text: String,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<i64>,
    pub fare: Option<Decimal>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl RouteEnrichment {
    pub fn calculating() -> Self {
        Self {
            distance_text: CALCULATING.to_string(),
            duration_text: CALCULATING.to_string(),
            fare_text: CALCULATING.to_string(),
            estimated_arrival_text: CALCULATING.to_string(),
            distance_km: None,
            duration_minutes: None,
            fare: None,
            estimated_arrival: None,
            enriched_at: None,
        }
    }

    pub fn is_calculating(&self) -> bool {
        self.enriched_at.is_none() && self.distance_text == CALCULATING
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub route_id: RouteId,
    pub request_id: Option<RequestId>,
    pub fe_id: EngineerId,
    pub fe_name: String,
    pub branch_id: BranchId,
    pub branch_name: String,
    pub start_time: DateTime<Utc>,
    pub status: RouteStatus,
    #[serde(flatten)]
    pub enrichment: RouteEnrichment,
    /// Geometría GeoJSON de la última respuesta del proveedor
    pub geometry: Option<serde_json::Value>,
    /// Origen usado en el último enriquecimiento exitoso
    pub last_enriched_origin: Option<Coordinate>,
    pub version: Option<u64>,
}

/// Campos parciales de una ruta (eventos `newRoute` / `routeUpdate`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutePatch {
    #[serde(rename = "routeid")]
    pub route_id: Option<RouteId>,
    #[serde(rename = "requestid")]
    pub request_id: Option<RequestId>,
    #[serde(rename = "feid")]
    pub fe_id: Option<EngineerId>,
    #[serde(rename = "fename")]
    pub fe_name: Option<String>,
    #[serde(rename = "branchid")]
    pub branch_id: Option<BranchId>,
    #[serde(rename = "branchname")]
    pub branch_name: Option<String>,
    #[serde(rename = "starttime", default, deserialize_with = "lenient_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    pub status: Option<RouteStatusSignal>,
    #[serde(rename = "distancetext", default, deserialize_with = "lenient_text")]
    pub distance_text: Option<String>,
    #[serde(rename = "durationtext", default, deserialize_with = "lenient_text")]
    pub duration_text: Option<String>,
    #[serde(rename = "faretext", default, deserialize_with = "lenient_text")]
    pub fare_text: Option<String>,
    #[serde(rename = "estimatedarrivaltext", default, deserialize_with = "lenient_text")]
    pub estimated_arrival_text: Option<String>,
    pub version: Option<u64>,
}

pub const ROUTE_KEY_ALIASES: &[(&str, &str)] = &[
    ("id", "routeid"),
    ("servicerequestid", "requestid"),
    ("engineerid", "feid"),
    ("engineername", "fename"),
    ("distance", "distancetext"),
    ("duration", "durationtext"),
    ("fare", "faretext"),
    ("eta", "estimatedarrivaltext"),
    ("estimatedarrival", "estimatedarrivaltext"),
    ("sequence", "version"),
    ("seq", "version"),
];

impl Route {
    /// `true` si el patch anuncia la finalización de la ruta
    pub fn patch_completes(patch: &RoutePatch) -> bool {
        patch.status == Some(RouteStatusSignal::Completed)
    }

    /// Ruta recibida del servidor: requiere engineer y sucursal
    pub fn from_patch(route_id: RouteId, patch: &RoutePatch, now: DateTime<Utc>) -> Option<Self> {
        let mut route = Self {
            route_id,
            request_id: None,
            fe_id: patch.fe_id.clone()?,
            fe_name: String::new(),
            branch_id: patch.branch_id.clone()?,
            branch_name: String::new(),
            start_time: patch.start_time.unwrap_or(now),
            status: RouteStatus::InProgress,
            enrichment: RouteEnrichment::calculating(),
            geometry: None,
            last_enriched_origin: None,
            version: None,
        };
        route.apply_patch(patch);
        Some(route)
    }

    pub fn apply_patch(&mut self, patch: &RoutePatch) {
        if let Some(request_id) = &patch.request_id {
            self.request_id = Some(request_id.clone());
        }
        if let Some(fe_id) = &patch.fe_id {
            self.fe_id = fe_id.clone();
        }
        if let Some(fe_name) = &patch.fe_name {
            self.fe_name = fe_name.clone();
        }
        if let Some(branch_id) = &patch.branch_id {
            self.branch_id = branch_id.clone();
        }
        if let Some(branch_name) = &patch.branch_name {
            self.branch_name = branch_name.clone();
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = start_time;
        }
        if let Some(RouteStatusSignal::Progress(status)) = patch.status {
            self.status = status;
        }
        if let Some(text) = &patch.distance_text {
            self.enrichment.distance_text = text.clone();
        }
        if let Some(text) = &patch.duration_text {
            self.enrichment.duration_text = text.clone();
        }
        if let Some(text) = &patch.fare_text {
            self.enrichment.fare_text = text.clone();
        }
        if let Some(text) = &patch.estimated_arrival_text {
            self.enrichment.estimated_arrival_text = text.clone();
        }
        if let Some(version) = patch.version {
            self.version = Some(version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_is_a_signal_not_a_status() {
        let signal: RouteStatusSignal = "Completed".parse().unwrap();
        assert_eq!(signal, RouteStatusSignal::Completed);
        let signal: RouteStatusSignal = "delayed".parse().unwrap();
        assert_eq!(signal, RouteStatusSignal::Progress(RouteStatus::Delayed));
    }

    #[test]
    fn test_route_patch_accepts_numeric_texts() {
        let patch: RoutePatch = serde_json::from_value(serde_json::json!({
            "routeid": 17,
            "feid": "fe-1",
            "branchid": 3,
            "distancetext": 4.5,
            "status": "Arriving"
        }))
        .unwrap();

        let route = Route::from_patch(RouteId(17), &patch, Utc::now()).unwrap();

        assert_eq!(route.branch_id, BranchId::new("3"));
        assert_eq!(route.enrichment.distance_text, "4.5");
        assert_eq!(route.enrichment.duration_text, CALCULATING);
        assert_eq!(route.status, RouteStatus::Arriving);
    }
}
